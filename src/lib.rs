//! # rttp-cache
//!
//! An in-process HTTP response cache with TTL expiry and request coalescing,
//! built as middleware over a small HTTP/1.1 request/response model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use rttp_cache::{Pipeline, Request, Response, StatusCode};
//! use rttp_cache::cache::{CacheConfig, CacheMiddleware};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = Pipeline::new(|_ctx| async {
//!         Response::new(StatusCode::Ok).body("Hello, World!")
//!     })
//!     .layer(CacheMiddleware::new(CacheConfig::new().ttl(Duration::from_secs(30))));
//!
//!     // The second request is answered from the cache.
//!     for _ in 0..2 {
//!         let response = pipeline.dispatch(Request::get("/hello")).await;
//!         println!("{}", String::from_utf8_lossy(response.body_ref()));
//!     }
//! }
//! ```

pub mod cache;
pub mod context;
pub mod http;
pub mod middleware;

pub use cache::{CacheConfig, CacheKey, CacheMiddleware, ResponseCache};
pub use context::Context;
pub use http::{Headers, Method, Request, Response, ResponseSink, StatusCode};
pub use middleware::{Middleware, Next, Pipeline};
