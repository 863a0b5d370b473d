//! Response caching with TTL expiry and request coalescing.
//!
//! [`CacheMiddleware`] sits in a [`Pipeline`](crate::middleware::Pipeline) in
//! front of an expensive handler. It derives a [`CacheKey`] for each request,
//! replays a live [`Snapshot`] from the [`TtlStore`] when there is one, and
//! otherwise lets a single request per key run the handler while concurrent
//! requests for the same key wait on its result.
//!
//! The pieces are usable on their own:
//!
//! - [`Recorder`] tees a response into its real sink and a [`Snapshot`].
//! - [`replay`] writes a snapshot back through any [`ResponseSink`](crate::ResponseSink).
//! - [`Coalescer`] elects a [`Leader`] per key and fans its [`Settlement`]
//!   out to [`Follower`]s.
//!
//! Only `200 OK` responses are stored or shared between requests.

mod coalescer;
mod config;
mod engine;
mod key;
mod recorder;
mod replay;
mod snapshot;
mod stats;
mod store;

pub use coalescer::{Coalescer, Follower, Leader, Role, Settlement};
pub use config::{CacheConfig, CacheOptions, SkipFn};
pub use engine::{CacheDisposition, CacheMiddleware, ResponseCache};
pub use key::{CacheKey, KeyError, KeyFn, default_key_fn, vary_on_headers};
pub use recorder::Recorder;
pub use replay::replay;
pub use snapshot::Snapshot;
pub use stats::StatsSnapshot;
pub use store::{StoreError, TtlStore};
