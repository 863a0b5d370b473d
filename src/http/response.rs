//! HTTP/1.1 response builder and the [`ResponseSink`] writer interface.
//!
//! Handlers build a [`Response`] with the fluent API. Anything that needs to
//! observe or redirect a finished response (the cache recorder, a replayer,
//! the transport) does so through [`ResponseSink`], which `Response` itself
//! implements.

use serde::Serialize;

use super::{Headers, StatusCode};

/// Destination for a response: status, headers, then body, then `finalize`.
///
/// Writers that wrap another sink (for example the cache's recorder) implement
/// this trait too, so they can stand in wherever the real sink is expected.
pub trait ResponseSink {
    /// Sets the status code.
    fn set_status(&mut self, status: StatusCode);

    /// Replaces every value of `name` with `value`.
    fn set_header(&mut self, name: &str, value: &str);

    /// Adds another value for `name`, keeping existing ones.
    fn append_header(&mut self, name: &str, value: &str);

    /// Appends raw bytes to the body.
    fn write_body(&mut self, chunk: &[u8]);

    /// Marks the response complete. No writes follow.
    fn finalize(&mut self);
}

/// An HTTP/1.1 response as built by a handler. Writing it to a connection is
/// the dispatcher's job, through [`ResponseSink`].
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.status(), StatusCode::Ok);
/// assert_eq!(response.headers().get("content-type"), Some("application/json"));
/// assert_eq!(response.body_ref(), br#"{"status":"ok"}"#);
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place. Intended for middleware pipelines that receive
    /// a `Response` from downstream and need to decorate it without consuming it.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    /// Sets the response body from raw bytes. The bytes are kept as-is.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the body to the compact JSON encoding of `value`.
    ///
    /// Adds `Content-Type: application/json` unless a content type was already
    /// set on this response.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if `value` cannot be serialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_cache::http::{Response, StatusCode};
    /// use serde_json::json;
    ///
    /// let response = Response::new(StatusCode::Ok)
    ///     .json(&json!({ "hello": "world" }))
    ///     .unwrap();
    /// assert_eq!(response.headers().get("content-type"), Some("application/json"));
    /// assert_eq!(response.body_ref(), br#"{"hello":"world"}"#);
    /// ```
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = serde_json::to_vec(value)?;
        if !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "application/json");
        }
        Ok(self)
    }

    /// Marks whether the dispatcher should keep the connection open afterwards.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers set so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body bytes.
    pub fn body_ref(&self) -> &[u8] {
        &self.body
    }

    /// Returns `true` if the connection should stay open after this response.
    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Writes this response through `sink`: status, every header in insertion
    /// order, the body, then `finalize`.
    pub fn send_to<S: ResponseSink + ?Sized>(self, sink: &mut S) {
        sink.set_status(self.status);
        for (name, value) in self.headers.iter() {
            sink.append_header(name, value);
        }
        if !self.body.is_empty() {
            sink.write_body(&self.body);
        }
        sink.finalize();
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

impl ResponseSink for Response {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
    }

    fn append_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name, value);
    }

    fn write_body(&mut self, chunk: &[u8]) {
        self.body.extend_from_slice(chunk);
    }

    // A Response is complete as soon as it holds its parts.
    fn finalize(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_sets_content_type_when_missing() {
        let r = Response::new(StatusCode::Ok)
            .json(&json!({ "hello": "world" }))
            .unwrap();
        assert_eq!(r.headers().get("Content-Type"), Some("application/json"));
        assert_eq!(r.body_ref(), br#"{"hello":"world"}"#);
    }

    #[test]
    fn json_keeps_explicit_content_type() {
        let r = Response::new(StatusCode::Ok)
            .header("Content-Type", "text/test")
            .json(&json!({ "a": "b" }))
            .unwrap();
        let types: Vec<_> = r.headers().get_all("content-type").collect();
        assert_eq!(types, vec!["text/test"]);
        assert_eq!(r.body_ref(), br#"{"a":"b"}"#);
    }

    #[test]
    fn send_to_copies_every_part() {
        let source = Response::new(StatusCode::NotFound)
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2")
            .body_bytes(vec![0u8, 159, 146, 150]);

        let mut target = Response::default();
        source.send_to(&mut target);

        assert_eq!(target.status(), StatusCode::NotFound);
        let cookies: Vec<_> = target.headers().get_all("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
        assert_eq!(target.body_ref(), &[0u8, 159, 146, 150]);
    }

    #[test]
    fn sink_set_header_replaces() {
        let mut r = Response::new(StatusCode::Ok).header("Cache-Control", "no-store");
        r.set_header("cache-control", "max-age=60");
        let values: Vec<_> = r.headers().get_all("Cache-Control").collect();
        assert_eq!(values, vec!["max-age=60"]);
    }
}
