//! Counters describing how requests moved through the cache.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct CacheStats {
    pub(crate) hits: AtomicU64,
    pub(crate) misses: AtomicU64,
    pub(crate) coalesced: AtomicU64,
    pub(crate) bypassed: AtomicU64,
    pub(crate) stored: AtomicU64,
    pub(crate) store_failures: AtomicU64,
    pub(crate) reexecuted: AtomicU64,
}

impl CacheStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            reexecuted: self.reexecuted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests served from the store.
    pub hits: u64,
    /// Requests that found no live entry (leaders and followers).
    pub misses: u64,
    /// Misses that waited on another request's computation.
    pub coalesced: u64,
    /// Requests that skipped the cache (skip predicate or key failure).
    pub bypassed: u64,
    /// Snapshots committed to the store.
    pub stored: u64,
    /// Cacheable snapshots the store refused.
    pub store_failures: u64,
    /// Followers that ran the handler themselves after an uncacheable or
    /// failed leader.
    pub reexecuted: u64,
}

impl StatsSnapshot {
    /// Fraction of cache-eligible requests answered without running the
    /// handler, including followers that replayed a leader's result.
    pub fn hit_ratio(&self) -> f64 {
        let eligible = self.hits + self.misses;
        if eligible == 0 {
            return 0.0;
        }
        let shared = self.hits + self.coalesced.saturating_sub(self.reexecuted);
        shared as f64 / eligible as f64
    }
}
