//! Cache key derivation from request attributes.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::Request;

/// Identifier grouping requests that may share one cached response.
///
/// Keys are compared by exact string value; two requests share a response
/// exactly when their key functions return equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Default derivation: `"{METHOD} {path}"`, with `?{query}` appended when
    /// the request carries a query string.
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_cache::{Request, cache::CacheKey};
    ///
    /// assert_eq!(CacheKey::from_request(&Request::get("/r1")).as_str(), "GET /r1");
    /// assert_eq!(
    ///     CacheKey::from_request(&Request::get("/r1?page=2")).as_str(),
    ///     "GET /r1?page=2"
    /// );
    /// ```
    pub fn from_request(request: &Request) -> Self {
        match request.query_string() {
            Some(query) => Self(format!(
                "{} {}?{}",
                request.method(),
                request.path(),
                query
            )),
            None => Self(format!("{} {}", request.method(), request.path())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A key function could not produce a key. The request bypasses the cache.
#[derive(Debug, Error)]
#[error("cache key derivation failed: {reason}")]
pub struct KeyError {
    reason: String,
}

impl KeyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Shared key derivation function.
pub type KeyFn = Arc<dyn Fn(&Request) -> Result<CacheKey, KeyError> + Send + Sync + 'static>;

/// The key function used when none is configured.
pub fn default_key_fn() -> KeyFn {
    Arc::new(|request: &Request| Ok(CacheKey::from_request(request)))
}

/// Builds a key function that extends the default key with the values of the
/// named request headers, so requests differing only in those headers are
/// cached separately.
///
/// A missing header contributes an empty value.
///
/// # Examples
///
/// ```
/// use rttp_cache::{Request, cache::vary_on_headers};
///
/// let key_fn = vary_on_headers(["Accept-Language"]);
/// let en = key_fn(&Request::get("/").with_header("accept-language", "en")).unwrap();
/// let de = key_fn(&Request::get("/").with_header("accept-language", "de")).unwrap();
/// assert_ne!(en, de);
/// ```
pub fn vary_on_headers<I, S>(names: I) -> KeyFn
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = names
        .into_iter()
        .map(|name| name.into().to_ascii_lowercase())
        .collect();

    Arc::new(move |request: &Request| {
        let mut key = CacheKey::from_request(request).0;
        for name in &names {
            let values: Vec<&str> = request.headers().get_all(name).collect();
            key.push('|');
            key.push_str(name);
            key.push('=');
            key.push_str(&values.join(","));
        }
        Ok(CacheKey(key))
    })
}
