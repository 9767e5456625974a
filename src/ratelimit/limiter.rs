//! Core rate limiter implementation.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::clock::{Clock, SystemClock, Timestamp};
use super::entry::{EntryState, LimitEntry};
use super::janitor::Janitor;
use super::key::EntryKey;
use super::policy::{Policy, PolicyTable};
use super::store::{MemoryStore, WindowStore};
use super::verdict::Verdict;
use crate::error::Result;

/// The rate limiter: resolves a policy, counts the action against the
/// (identifier, policy) entry and returns a [`Verdict`].
///
/// This struct is thread-safe and can be shared across tasks and threads.
/// The store is injected rather than global, so independently configured
/// limiters can live side by side in one process.
#[derive(Debug)]
pub struct RateLimiter<S: WindowStore = MemoryStore> {
    policies: PolicyTable,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    stats: Counters,
}

#[derive(Debug, Default)]
struct Counters {
    allowed: AtomicU64,
    denied: AtomicU64,
    blocks_applied: AtomicU64,
}

/// Cumulative decision counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub allowed: u64,
    pub denied: u64,
    pub blocks_applied: u64,
    /// Entries currently held by the store
    pub entries: usize,
}

/// Read-only view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySnapshot {
    pub identifier: String,
    pub policy: String,
    pub count: u64,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<Timestamp>,
    pub state: EntryState,
}

impl RateLimiter<MemoryStore> {
    /// Create a rate limiter with an in-memory store and the system clock.
    pub fn new(policies: PolicyTable) -> Self {
        Self::with_store(policies, Arc::new(MemoryStore::new()))
    }
}

impl<S: WindowStore> RateLimiter<S> {
    /// Create a rate limiter over an existing store.
    pub fn with_store(policies: PolicyTable, store: Arc<S>) -> Self {
        Self {
            policies,
            store,
            clock: Arc::new(SystemClock::new()),
            stats: Counters::default(),
        }
    }

    /// Replace the clock used by [`check_now`](Self::check_now) and the janitor.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Count one action by `identifier` under `policy_name` at `now`.
    ///
    /// Unknown policy names are governed by the default policy but keep
    /// their own counters. This never fails: every call yields a verdict.
    pub fn check(&self, identifier: &str, policy_name: &str, now: Timestamp) -> Verdict {
        let policy = self.policies.resolve(policy_name);
        let key = EntryKey::new(identifier, policy_name);

        trace!(key = %key, now = %now, "Checking rate limit");

        let outcome = self.store.update(&key, now, |entry| entry.apply(&policy, now));

        if outcome.window_rolled {
            debug!(key = %key, "Rate limit window rolled");
        }

        if outcome.verdict.is_allowed() {
            self.stats.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.denied.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, blocked_until = ?outcome.verdict.blocked_until(), "Rate limit exceeded");
        }

        if outcome.block_applied {
            self.stats.blocks_applied.fetch_add(1, Ordering::Relaxed);
            warn!(
                key = %key,
                blocked_until = %outcome.verdict.retry_at(),
                block_duration_ms = ?policy.block_duration_ms,
                "Identifier blocked"
            );
        }

        outcome.verdict
    }

    /// [`check`](Self::check) at the limiter's current clock reading.
    pub fn check_now(&self, identifier: &str, policy_name: &str) -> Verdict {
        self.check(identifier, policy_name, self.clock.now())
    }

    /// Drop the entry for this pair, lifting any block. Returns whether an
    /// entry existed; resetting a missing entry is a no-op.
    pub fn reset(&self, identifier: &str, policy_name: &str) -> bool {
        let key = EntryKey::new(identifier, policy_name);
        let removed = self.store.remove(&key);
        debug!(key = %key, removed, "Rate limit entry reset");
        removed
    }

    /// Add or overwrite a policy. Existing entries are judged against the
    /// new definition from their next check onwards.
    pub fn register_policy(&self, policy: Policy) -> Result<()> {
        self.policies.register(policy)?;
        Ok(())
    }

    /// Resolve a policy name the same way [`check`](Self::check) does.
    pub fn resolve_policy(&self, policy_name: &str) -> Arc<Policy> {
        self.policies.resolve(policy_name)
    }

    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Inspect the entry for this pair without counting an action.
    pub fn inspect(&self, identifier: &str, policy_name: &str, now: Timestamp) -> Option<EntrySnapshot> {
        let key = EntryKey::new(identifier, policy_name);
        let entry: LimitEntry = self.store.get(&key)?;
        let policy = self.policies.resolve(policy_name);

        Some(EntrySnapshot {
            count: entry.count(),
            window_start: entry.window_start(),
            window_end: entry.window_end(&policy),
            blocked_until: entry.blocked_until(),
            state: entry.state(&policy, now),
            identifier: key.identifier,
            policy: key.policy,
        })
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            allowed: self.stats.allowed.load(Ordering::Relaxed),
            denied: self.stats.denied.load(Ordering::Relaxed),
            blocks_applied: self.stats.blocks_applied.load(Ordering::Relaxed),
            entries: self.store.len(),
        }
    }

    /// A janitor sweeping this limiter's store with the given retention.
    pub fn janitor(&self, retention: Duration) -> Janitor<S> {
        Janitor::new(Arc::clone(&self.store), Arc::clone(&self.clock), retention)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the number of live entries.
    pub fn entry_count(&self) -> usize {
        self.store.len()
    }

    /// Drop every entry.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl Default for RateLimiter<MemoryStore> {
    fn default() -> Self {
        Self::new(PolicyTable::default())
    }
}
