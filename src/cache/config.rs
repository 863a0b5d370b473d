//! Cache configuration: builder methods plus a serde-loadable data subset.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::key::{KeyFn, default_key_fn};
use crate::Request;

/// Predicate deciding that a request bypasses the cache entirely.
pub type SkipFn = Arc<dyn Fn(&Request) -> bool + Send + Sync + 'static>;

const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Settings for a [`ResponseCache`](super::ResponseCache).
///
/// The defaults are:
///
/// | Setting            | Default value                                |
/// |--------------------|----------------------------------------------|
/// | TTL                | 60 seconds                                   |
/// | Key function       | [`CacheKey::from_request`](super::CacheKey::from_request) |
/// | Skip predicate     | never skip                                   |
/// | Capacity           | unbounded                                    |
/// | Max entry size     | unbounded                                    |
/// | Sweep interval     | none (expired entries are dropped on read)   |
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use rttp_cache::cache::CacheConfig;
///
/// let config = CacheConfig::new()
///     .ttl(Duration::from_millis(50))
///     .capacity(1_000)
///     .skip(|req| req.headers().contains("authorization"));
/// assert_eq!(config.ttl_duration(), Duration::from_millis(50));
/// ```
#[derive(Clone)]
pub struct CacheConfig {
    pub(crate) ttl: Duration,
    pub(crate) key_fn: KeyFn,
    pub(crate) skip: Option<SkipFn>,
    pub(crate) capacity: Option<usize>,
    pub(crate) max_entry_bytes: Option<usize>,
    pub(crate) sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            key_fn: default_key_fn(),
            skip: None,
            capacity: None,
            max_entry_bytes: None,
            sweep_interval: None,
        }
    }

    /// Builds a config from deserialized [`CacheOptions`], leaving the key
    /// function and skip predicate at their defaults.
    pub fn from_options(options: &CacheOptions) -> Self {
        let mut config = Self::new().ttl(Duration::from_millis(options.ttl_ms));
        config.capacity = options.capacity;
        config.max_entry_bytes = options.max_entry_bytes;
        config.sweep_interval = options.sweep_interval_ms.map(Duration::from_millis);
        config
    }

    /// Sets how long a stored snapshot is served.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replaces the key derivation function.
    #[must_use]
    pub fn key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    /// Sets the bypass predicate. Requests for which it returns `true` go
    /// straight to the handler with no caching or coalescing.
    #[must_use]
    pub fn skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }

    /// Bounds the number of stored entries.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Refuses to store snapshots whose body exceeds `limit` bytes. Such
    /// responses are still served normally.
    #[must_use]
    pub fn max_entry_bytes(mut self, limit: usize) -> Self {
        self.max_entry_bytes = Some(limit);
        self
    }

    /// Enables a periodic sweep of expired entries when the cache's sweeper
    /// is started.
    #[must_use]
    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_interval = Some(every);
        self
    }

    pub fn ttl_duration(&self) -> Duration {
        self.ttl
    }

    pub(crate) fn should_skip(&self, request: &Request) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(request))
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("ttl", &self.ttl)
            .field("skip", &self.skip.is_some())
            .field("capacity", &self.capacity)
            .field("max_entry_bytes", &self.max_entry_bytes)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

/// The data-only part of [`CacheConfig`], for loading from configuration files.
///
/// # Examples
///
/// ```rust
/// use rttp_cache::cache::{CacheConfig, CacheOptions};
///
/// let options = CacheOptions::from_json(r#"{ "ttl_ms": 250, "capacity": 64 }"#).unwrap();
/// let config = CacheConfig::from_options(&options);
/// assert_eq!(config.ttl_duration().as_millis(), 250);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheOptions {
    pub ttl_ms: u64,
    pub capacity: Option<usize>,
    pub max_entry_bytes: Option<usize>,
    pub sweep_interval_ms: Option<u64>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL.as_millis() as u64,
            capacity: None,
            max_entry_bytes: None,
            sweep_interval_ms: None,
        }
    }
}

impl CacheOptions {
    /// Parses options from a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] for malformed JSON, wrongly typed
    /// values, or unknown fields.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_duration(), Duration::from_secs(60));
        assert!(!config.should_skip(&Request::get("/")));
        assert_eq!(config.capacity, None);
        assert_eq!((config.key_fn)(&Request::get("/r1")).unwrap().as_str(), "GET /r1");
    }

    #[test]
    fn skip_predicate_sees_request() {
        let config = CacheConfig::new().skip(|req| req.path().starts_with("/admin"));
        assert!(config.should_skip(&Request::get("/admin/users")));
        assert!(!config.should_skip(&Request::get("/users")));
    }

    #[test]
    fn options_fill_defaults() {
        let options = CacheOptions::from_json("{}").unwrap();
        assert_eq!(options, CacheOptions::default());

        let options = CacheOptions::from_json(
            r#"{ "ttl_ms": 50, "capacity": 10, "max_entry_bytes": 4096, "sweep_interval_ms": 1000 }"#,
        )
        .unwrap();
        let config = CacheConfig::from_options(&options);
        assert_eq!(config.ttl_duration(), Duration::from_millis(50));
        assert_eq!(config.capacity, Some(10));
        assert_eq!(config.max_entry_bytes, Some(4096));
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(1)));
    }

    #[test]
    fn options_reject_unknown_fields() {
        assert!(CacheOptions::from_json(r#"{ "ttl": 50 }"#).is_err());
        assert!(CacheOptions::from_json(r#"{ "ttl_ms": "fast" }"#).is_err());
    }

    #[test]
    fn debug_hides_closures() {
        let rendered = format!("{:?}", CacheConfig::new().skip(|_| true));
        assert!(rendered.contains("skip: true"));
    }
}
