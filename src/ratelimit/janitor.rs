//! Background eviction of stale limit entries.
//!
//! Without a sweep the store grows by one entry per identifier ever seen.
//! The janitor drops entries whose window began longer ago than the
//! retention horizon, but never an entry that is still blocked: evicting it
//! would hand the identifier a clean slate before its block runs out.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::clock::{Clock, Timestamp};
use super::store::WindowStore;

/// Default sweep interval.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Default retention horizon.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Sweeps a store for evictable entries.
#[derive(Debug)]
pub struct Janitor<S: WindowStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retention_ms: u64,
}

impl<S: WindowStore> Janitor<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            store,
            clock,
            retention_ms: u64::try_from(retention.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    /// Evict every stale, unblocked entry as of `now`. Returns how many were removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let retention_ms = self.retention_ms;
        let evicted = self
            .store
            .retain(|_, entry| !entry.is_evictable(now, retention_ms));

        debug!(evicted, remaining = self.store.len(), "Janitor sweep complete");
        evicted
    }

    /// Sweep at the janitor's current clock reading.
    pub fn sweep_now(&self) -> usize {
        self.sweep(self.clock.now())
    }
}

impl<S: WindowStore + 'static> Janitor<S> {
    /// Run sweeps every `period` on a tokio task until the handle is shut down.
    ///
    /// The first sweep happens one period after spawning.
    pub fn spawn(self, period: Duration) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        info!(
            interval_secs = period.as_secs(),
            retention_secs = self.retention().as_secs(),
            "Starting janitor"
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_now();
                    }
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also means stop.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Janitor stopped");
        });

        JanitorHandle { shutdown_tx, task }
    }
}

/// Handle to a running janitor task.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JanitorHandle {
    /// Stop the janitor and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
