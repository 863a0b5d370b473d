//! HTTP/1.1 request descriptor.
//!
//! The cache only ever reads a [`Request`]: method, path, query and headers
//! feed key derivation and skip predicates, and the descriptor is handed on to
//! the downstream handler untouched. Parsing off the wire is the dispatcher's
//! job; it builds the descriptor with [`Request::new`].

use bytes::Bytes;

use super::{Headers, Method};

/// A request as seen by middleware and handlers.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Method, Request};
///
/// let request = Request::new(Method::Post, "/hello?name=world")
///     .with_header("Host", "localhost")
///     .with_body("payload");
///
/// assert_eq!(request.method().as_str(), "POST");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("name=world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// assert_eq!(request.body().as_ref(), b"payload");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
}

impl Request {
    /// Builds a request from a method and a request target (`/path?query`).
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_cache::http::{Method, Request};
    ///
    /// let request = Request::new(Method::Get, "/r1?page=2")
    ///     .with_header("Accept", "application/json");
    /// assert_eq!(request.path(), "/r1");
    /// assert_eq!(request.query_string(), Some("page=2"));
    /// ```
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            headers: Headers::new(),
            query,
            body: Bytes::new(),
        }
    }

    /// Shorthand for a `GET` request to `target`.
    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target)
    }

    /// Appends a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (target.to_owned(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_splits_target() {
        let req = Request::get("/r1?a=1&b=two+words").with_header("X-Tenant", "acme");
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/r1");
        assert_eq!(req.query_string(), Some("a=1&b=two+words"));
        assert_eq!(req.headers().get("x-tenant"), Some("acme"));
        assert!(req.body().is_empty());
    }

    #[test]
    fn target_without_query() {
        let req = Request::new(Method::Delete, "/items/7").with_body(vec![1u8, 2, 3]);
        assert_eq!(req.path(), "/items/7");
        assert_eq!(req.query_string(), None);
        assert_eq!(req.body().as_ref(), &[1u8, 2, 3]);
    }
}
