//! Storage for limit entries.
//!
//! The limiter's correctness under concurrency rests on one guarantee from
//! the store: [`WindowStore::update`] runs its closure while holding an
//! exclusive lock on that key, so the read-modify-write of a check can never
//! interleave with another check, a reset or a sweep on the same key.
//!
//! `MemoryStore` is process-local. Running several service instances gives
//! each its own counters and multiplies the effective limit by the instance
//! count; a shared backend would be a second implementation of this trait.

use dashmap::DashMap;
use std::fmt::Debug;

use super::clock::Timestamp;
use super::entry::LimitEntry;
use super::key::EntryKey;

/// Keyed store of limit entries.
pub trait WindowStore: Send + Sync + Debug {
    /// Run `f` on the entry for `key`, creating a fresh entry starting at
    /// `now` if none exists. The key stays locked for the duration of `f`.
    fn update<F, R>(&self, key: &EntryKey, now: Timestamp, f: F) -> R
    where
        F: FnOnce(&mut LimitEntry) -> R;

    /// Copy of the entry for `key`, if present.
    fn get(&self, key: &EntryKey) -> Option<LimitEntry>;

    /// Remove the entry for `key`. Returns whether one existed.
    fn remove(&self, key: &EntryKey) -> bool;

    /// Keep only the entries for which `keep` returns true. Returns the
    /// number of entries removed.
    fn retain<F>(&self, keep: F) -> usize
    where
        F: FnMut(&EntryKey, &LimitEntry) -> bool;

    /// Number of entries currently stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    fn clear(&self);
}

/// In-memory store backed by a sharded concurrent map.
///
/// Each shard has its own lock, so checks on unrelated keys rarely contend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<EntryKey, LimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
        }
    }
}

impl WindowStore for MemoryStore {
    fn update<F, R>(&self, key: &EntryKey, now: Timestamp, f: F) -> R
    where
        F: FnOnce(&mut LimitEntry) -> R,
    {
        // Fast path avoids cloning the key for entries that already exist.
        if let Some(mut entry) = self.entries.get_mut(key) {
            return f(entry.value_mut());
        }

        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| LimitEntry::new(now));
        f(entry.value_mut())
    }

    fn get(&self, key: &EntryKey) -> Option<LimitEntry> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    fn remove(&self, key: &EntryKey) -> bool {
        self.entries.remove(key).is_some()
    }

    fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&EntryKey, &LimitEntry) -> bool,
    {
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            let kept = keep(key, entry);
            if !kept {
                removed += 1;
            }
            kept
        });
        removed
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&self) {
        self.entries.clear();
    }
}
