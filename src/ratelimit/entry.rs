//! Per-(identifier, policy) limit entries and the fixed-window algorithm.
//!
//! An entry counts actions inside a fixed window that starts at the first
//! action after the previous window went stale. Going over the policy's
//! quota either refuses actions until the window rolls or, when the policy
//! has a block duration, places the identifier under a block that window
//! rollover cannot lift.

use serde::Serialize;

use super::clock::Timestamp;
use super::policy::Policy;
use super::verdict::Verdict;

/// Where an entry sits in its lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// No actions counted in a live window
    Fresh,
    /// Within quota
    Counting,
    /// Over quota, waiting for the window to roll
    Exceeded,
    /// Under an active block
    Blocked,
}

/// Mutable counter state for one (identifier, policy) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitEntry {
    count: u64,
    window_start: Timestamp,
    blocked_until: Option<Timestamp>,
}

/// What a single check did to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CheckOutcome {
    pub verdict: Verdict,
    pub window_rolled: bool,
    pub block_applied: bool,
}

impl LimitEntry {
    /// A fresh entry whose first window starts at `now`.
    pub fn new(now: Timestamp) -> Self {
        Self {
            count: 0,
            window_start: now,
            blocked_until: None,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }

    pub fn blocked_until(&self) -> Option<Timestamp> {
        self.blocked_until
    }

    /// Whether a block is in force at `now`.
    pub fn is_blocked(&self, now: Timestamp) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// A window is stale once a full window length has elapsed since it
    /// began. A clock that reads earlier than `window_start` never makes a
    /// window stale.
    pub fn is_window_stale(&self, policy: &Policy, now: Timestamp) -> bool {
        now >= self.window_start && now.millis_since(self.window_start) >= policy.window_ms
    }

    /// When the current window ends.
    pub fn window_end(&self, policy: &Policy) -> Timestamp {
        self.window_start.saturating_add_millis(policy.window_ms)
    }

    pub fn state(&self, policy: &Policy, now: Timestamp) -> EntryState {
        if self.is_blocked(now) {
            return EntryState::Blocked;
        }
        if self.blocked_until.is_some() || self.is_window_stale(policy, now) || self.count == 0 {
            return EntryState::Fresh;
        }
        if self.count <= policy.max_actions {
            EntryState::Counting
        } else {
            EntryState::Exceeded
        }
    }

    /// Whether the janitor may drop this entry: its window began more than
    /// `retention_ms` ago and no block is in force.
    pub fn is_evictable(&self, now: Timestamp, retention_ms: u64) -> bool {
        now.millis_since(self.window_start) > retention_ms && !self.is_blocked(now)
    }

    fn roll(&mut self, now: Timestamp) {
        self.window_start = now;
        self.count = 0;
        self.blocked_until = None;
    }

    /// Count one action against `policy` and decide whether it may proceed.
    pub(crate) fn apply(&mut self, policy: &Policy, now: Timestamp) -> CheckOutcome {
        if let Some(until) = self.blocked_until {
            if now < until {
                return CheckOutcome {
                    verdict: Verdict::Denied {
                        reset_at: until,
                        blocked_until: Some(until),
                    },
                    window_rolled: false,
                    block_applied: false,
                };
            }
        }

        // An expired block always hands the identifier a clean window, even
        // when the block was shorter than the window it was imposed in.
        let window_rolled = self.blocked_until.is_some() || self.is_window_stale(policy, now);
        if window_rolled {
            self.roll(now);
        }

        self.count = self.count.saturating_add(1);
        let reset_at = self.window_end(policy);

        if self.count > policy.max_actions {
            let block_applied = match policy.block_duration_ms {
                Some(block_ms) => {
                    self.blocked_until = Some(now.saturating_add_millis(block_ms));
                    true
                }
                None => false,
            };

            return CheckOutcome {
                verdict: Verdict::Denied {
                    reset_at,
                    blocked_until: self.blocked_until,
                },
                window_rolled,
                block_applied,
            };
        }

        CheckOutcome {
            verdict: Verdict::Allowed {
                remaining: policy.max_actions - self.count,
                reset_at,
            },
            window_rolled,
            block_applied: false,
        }
    }
}
