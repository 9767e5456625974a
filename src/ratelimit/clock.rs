//! Timestamps and clock sources.
//!
//! All limiter arithmetic is done on millisecond timestamps since the Unix
//! epoch. Every operation saturates, so a clock that steps backwards simply
//! looks like "no time has passed" instead of underflowing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Add a number of milliseconds, saturating at `u64::MAX`.
    pub fn saturating_add_millis(self, millis: u64) -> Self {
        Timestamp(self.0.saturating_add(millis))
    }

    /// Add a duration, saturating at `u64::MAX`.
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.saturating_add_millis(millis)
    }

    /// Milliseconds elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn millis_since(self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Whole seconds since the epoch, rounded up.
    pub fn as_epoch_secs_ceil(&self) -> u64 {
        self.0.div_ceil(1000)
    }

    /// RFC 3339 rendering in UTC, second precision.
    pub fn to_rfc3339(&self) -> String {
        let millis = i64::try_from(self.0).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Pre-epoch wall clocks clamp to the epoch.
        let millis = Utc::now().timestamp_millis();
        Timestamp(u64::try_from(millis).unwrap_or(0))
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can hand one clone to a limiter and
/// keep another to drive it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let _ = self
            .millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_add(millis))
            });
    }

    /// Jump to an arbitrary time, including backwards.
    pub fn set(&self, now: Timestamp) {
        self.millis.store(now.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_since_saturates() {
        let earlier = Timestamp::from_millis(5_000);
        let later = Timestamp::from_millis(7_500);

        assert_eq!(later.millis_since(earlier), 2_500);
        assert_eq!(earlier.millis_since(later), 0);
    }

    #[test]
    fn test_saturating_add() {
        let ts = Timestamp::from_millis(u64::MAX - 1);
        assert_eq!(ts.saturating_add_millis(10).as_millis(), u64::MAX);
        assert_eq!(
            Timestamp::from_millis(1_000)
                .saturating_add(Duration::from_secs(2))
                .as_millis(),
            3_000
        );
    }

    #[test]
    fn test_epoch_secs_rounds_up() {
        assert_eq!(Timestamp::from_millis(60_000).as_epoch_secs_ceil(), 60);
        assert_eq!(Timestamp::from_millis(60_001).as_epoch_secs_ceil(), 61);
        assert_eq!(Timestamp::EPOCH.as_epoch_secs_ceil(), 0);
    }

    #[test]
    fn test_rfc3339_rendering() {
        assert_eq!(Timestamp::from_millis(60_000).to_rfc3339(), "1970-01-01T00:01:00Z");
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock::new().now() > Timestamp::from_millis(1_577_836_800_000));
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(Timestamp::from_millis(100));
        let handle = clock.clone();

        handle.advance(Duration::from_millis(50));
        assert_eq!(clock.now(), Timestamp::from_millis(150));

        handle.set(Timestamp::from_millis(10));
        assert_eq!(clock.now(), Timestamp::from_millis(10));
    }
}
