//! The caching middleware: store lookup, coalescing, capture and replay.

use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::coalescer::{Coalescer, Role, Settlement};
use super::config::CacheConfig;
use super::stats::{CacheStats, StatsSnapshot};
use super::store::TtlStore;
use super::{CacheKey, Recorder, Snapshot};
use crate::context::Context;
use crate::middleware::{Middleware, Next};
use crate::{Response, StatusCode};

/// Why the downstream handler is being invoked, inserted into the request's
/// [`Extensions`](crate::context::Extensions) by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    /// The skip predicate matched or no key could be derived.
    Bypass,
    /// This request leads a cache miss; its response may be shared.
    Leader,
    /// The leader this request waited on could not share its response.
    Reexecute,
}

struct Inner {
    config: CacheConfig,
    store: Arc<TtlStore>,
    coalescer: Arc<Coalescer>,
    stats: CacheStats,
}

/// Response cache with in-flight request coalescing.
///
/// For each request:
///
/// 1. If the skip predicate matches, or the key function fails, the handler
///    runs directly.
/// 2. A live stored snapshot is replayed without running the handler.
/// 3. Otherwise the first request for the key runs the handler while later
///    ones wait. A `200 OK` result is stored for the configured TTL and
///    replayed to every waiter. Any other status, or a handler that panics
///    or is cancelled, is never shared: each waiter runs the handler itself.
///
/// Cloning is cheap and every clone shares the same store.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use rttp_cache::{Request, Response, StatusCode};
/// use rttp_cache::cache::{CacheConfig, CacheMiddleware};
/// use rttp_cache::middleware::Pipeline;
///
/// # async fn example() {
/// let pipeline = Pipeline::new(|_ctx| async {
///     Response::new(StatusCode::Ok).body("expensive")
/// })
/// .layer(CacheMiddleware::new(CacheConfig::new().ttl(Duration::from_secs(5))));
///
/// let response = pipeline.dispatch(Request::get("/report")).await;
/// assert_eq!(response.status(), StatusCode::Ok);
/// # }
/// ```
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<Inner>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        let mut store = TtlStore::new();
        if let Some(capacity) = config.capacity {
            store = store.with_capacity(capacity);
        }
        if let Some(limit) = config.max_entry_bytes {
            store = store.with_max_entry_bytes(limit);
        }
        Self {
            inner: Arc::new(Inner {
                config,
                store: Arc::new(store),
                coalescer: Arc::new(Coalescer::new()),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Serves one request, running `next` at most as the rules above allow.
    pub async fn serve(&self, ctx: Context, next: Next) -> Response {
        let inner = &self.inner;

        if inner.config.should_skip(ctx.request()) {
            CacheStats::bump(&inner.stats.bypassed);
            debug!(path = %ctx.request().path(), "skip predicate matched, bypassing cache");
            return run_downstream(ctx, next, CacheDisposition::Bypass).await;
        }

        let key = match (inner.config.key_fn)(ctx.request()) {
            Ok(key) => key,
            Err(err) => {
                CacheStats::bump(&inner.stats.bypassed);
                warn!(path = %ctx.request().path(), error = %err, "bypassing cache");
                return run_downstream(ctx, next, CacheDisposition::Bypass).await;
            }
        };

        if let Some(snapshot) = inner.store.get(&key) {
            CacheStats::bump(&inner.stats.hits);
            debug!(key = %key, "cache hit");
            return snapshot.to_response();
        }
        CacheStats::bump(&inner.stats.misses);
        self.serve_miss(key, ctx, next).await
    }

    // Runs after a store miss. Another leader may have committed between
    // that lookup and `begin`, so a new leader looks again before running
    // the handler.
    async fn serve_miss(&self, key: CacheKey, ctx: Context, next: Next) -> Response {
        let inner = &self.inner;
        match inner.coalescer.begin(&key) {
            Role::Leader(leader) => {
                if let Some(snapshot) = inner.store.get(&key) {
                    debug!(key = %key, "entry committed since lookup, replaying");
                    let response = snapshot.to_response();
                    leader.settle(Settlement::Cached(snapshot));
                    return response;
                }
                debug!(key = %key, "cache miss, running handler");
                let (response, snapshot) = record(ctx, next, CacheDisposition::Leader).await;
                let settlement = self.commit(&key, snapshot);
                leader.settle(settlement);
                response
            }
            Role::Follower(follower) => {
                CacheStats::bump(&inner.stats.coalesced);
                debug!(key = %key, "waiting on in-flight request");
                match follower.wait().await {
                    Settlement::Cached(snapshot) => snapshot.to_response(),
                    settlement => {
                        CacheStats::bump(&inner.stats.reexecuted);
                        debug!(key = %key, ?settlement, "leader result not shared, running handler");
                        let (response, snapshot) =
                            record(ctx, next, CacheDisposition::Reexecute).await;
                        self.commit(&key, snapshot);
                        response
                    }
                }
            }
        }
    }

    /// Drops the stored snapshot for `key`. Returns `true` if one was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.inner.store.delete(key)
    }

    pub fn clear(&self) {
        self.inner.store.clear();
    }

    /// Number of stored snapshots, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// The in-flight registry, for inspecting which keys are being computed.
    pub fn coalescer(&self) -> &Coalescer {
        &self.inner.coalescer
    }

    /// Starts the background sweep if a non-zero sweep interval is
    /// configured. A zero interval is logged and ignored; expired entries are
    /// then only reclaimed on read.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_sweeper(&self) -> Option<JoinHandle<()>> {
        let every = self.inner.config.sweep_interval?;
        if every.is_zero() {
            warn!("sweep interval is zero, background sweep disabled");
            return None;
        }
        Some(self.inner.store.spawn_sweeper(every))
    }

    // Stores a 200 snapshot and decides what followers receive. A store
    // rejection is logged; the snapshot is still shared with followers.
    fn commit(&self, key: &CacheKey, snapshot: Snapshot) -> Settlement {
        if !snapshot.is_cacheable() {
            let status = snapshot.status();
            debug!(
                key = %key,
                status = status.as_u16(),
                reason = status.canonical_reason(),
                "response not cacheable"
            );
            return Settlement::Uncacheable;
        }

        let snapshot = Arc::new(snapshot);
        let ttl = self.inner.config.ttl;
        match self.inner.store.set(key.clone(), Arc::clone(&snapshot), ttl) {
            Ok(()) => {
                CacheStats::bump(&self.inner.stats.stored);
                debug!(key = %key, ?ttl, "response stored");
            }
            Err(err) => {
                CacheStats::bump(&self.inner.stats.store_failures);
                warn!(key = %key, error = %err, "response not stored");
            }
        }
        Settlement::Cached(snapshot)
    }
}

async fn run_downstream(mut ctx: Context, next: Next, disposition: CacheDisposition) -> Response {
    ctx.extensions_mut().insert(disposition);
    next.run(ctx).await
}

// Runs the handler and tees its response into a fresh sink and a snapshot.
async fn record(ctx: Context, next: Next, disposition: CacheDisposition) -> (Response, Snapshot) {
    let produced = run_downstream(ctx, next, disposition).await;
    let sink = Response::new(StatusCode::Ok).keep_alive(produced.is_keep_alive());
    let mut recorder = Recorder::new(sink);
    produced.send_to(&mut recorder);
    recorder.into_parts()
}

/// [`Middleware`] adapter around a [`ResponseCache`].
#[derive(Clone)]
pub struct CacheMiddleware {
    cache: ResponseCache,
}

impl CacheMiddleware {
    pub fn new(config: CacheConfig) -> Self {
        Self::from_cache(ResponseCache::new(config))
    }

    /// Wraps an existing cache, so the caller keeps a handle for
    /// invalidation and stats.
    pub fn from_cache(cache: ResponseCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = self.cache.clone();
        Box::pin(async move { cache.serve(ctx, next).await })
    }
}
