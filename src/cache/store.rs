//! Key → snapshot map with per-entry expiry and optional capacity bound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use super::{CacheKey, Snapshot};

/// Reasons a snapshot was not stored. None of these fail the request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("snapshot body of {size} bytes exceeds the {limit}-byte entry limit")]
    EntryTooLarge { size: usize, limit: usize },

    #[error("store capacity is zero")]
    ZeroCapacity,
}

#[derive(Debug)]
struct StoreEntry {
    snapshot: Arc<Snapshot>,
    expires_at: Instant,
    // Write order, used for least-recently-set eviction.
    seq: u64,
}

impl StoreEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory TTL store.
///
/// Backed by a sharded [`DashMap`], so reads and writes for unrelated keys do
/// not contend on a single lock. Expired entries are treated as absent by
/// [`get`](Self::get) and removed lazily; [`purge_expired`](Self::purge_expired)
/// and the optional sweeper only reclaim memory.
#[derive(Debug, Default)]
pub struct TtlStore {
    entries: DashMap<CacheKey, StoreEntry>,
    capacity: Option<usize>,
    max_entry_bytes: Option<usize>,
    writes: AtomicU64,
    // Held across eviction and insert on bounded stores so concurrent writers
    // of new keys cannot overshoot the capacity.
    admission: Mutex<()>,
}

impl TtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the store to `capacity` entries, evicting the least recently
    /// set entry when a new key would exceed it.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Rejects snapshots whose body is larger than `limit` bytes.
    #[must_use]
    pub fn with_max_entry_bytes(mut self, limit: usize) -> Self {
        self.max_entry_bytes = Some(limit);
        self
    }

    /// Returns the live snapshot for `key`, dropping it if it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Snapshot>> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if entry.is_live(now) {
                return Some(Arc::clone(&entry.snapshot));
            }
        }
        // Only remove the entry we saw expire, not a fresh one written since.
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        trace!(key = %key, "expired entry evicted on read");
        None
    }

    /// Stores `snapshot` under `key` until `snapshot.created_at() + ttl`,
    /// replacing any previous entry for the key.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EntryTooLarge`]: the body exceeds the configured entry limit.
    /// - [`StoreError::ZeroCapacity`]: the store was bounded to zero entries.
    pub fn set(&self, key: CacheKey, snapshot: Arc<Snapshot>, ttl: Duration) -> Result<(), StoreError> {
        if let Some(limit) = self.max_entry_bytes {
            let size = snapshot.body().len();
            if size > limit {
                return Err(StoreError::EntryTooLarge { size, limit });
            }
        }

        let expires_at = snapshot.created_at() + ttl;
        let entry = StoreEntry {
            snapshot,
            expires_at,
            seq: self.writes.fetch_add(1, Ordering::Relaxed),
        };

        let Some(capacity) = self.capacity else {
            self.entries.insert(key, entry);
            return Ok(());
        };
        if capacity == 0 {
            return Err(StoreError::ZeroCapacity);
        }

        // Removals elsewhere only shrink the map, so the bound holds while
        // the admission lock is taken.
        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.entries.contains_key(&key) {
            self.make_room(capacity);
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Removes the entry for `key`. Returns `true` if one was present.
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawns a task that calls [`purge_expired`](Self::purge_expired) every
    /// `every`. The task holds only a weak reference and ends once the store
    /// is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `every` is zero, as [`tokio::time::interval`] does.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        assert!(!every.is_zero(), "sweep interval must be non-zero");
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("store dropped, sweeper exiting");
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = store.len(), "swept expired entries");
                }
            }
        })
    }

    fn make_room(&self, capacity: usize) {
        if self.entries.len() < capacity {
            return;
        }
        self.purge_expired();
        while self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().seq)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    debug!(key = %key, "evicted least recently set entry");
                }
                None => break,
            }
        }
    }
}
