//! Immutable captured response.

use bytes::Bytes;
use tokio::time::Instant;

use super::replay::replay;
use crate::http::{Headers, Response, StatusCode};

/// Everything a handler wrote: status, headers and body bytes.
///
/// Produced by a [`Recorder`](super::Recorder), held by the store behind an
/// `Arc`, and only ever read afterwards. The body is kept as opaque bytes, so
/// binary payloads replay exactly.
#[derive(Debug, Clone)]
pub struct Snapshot {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    created_at: Instant,
}

impl Snapshot {
    pub fn new(status: StatusCode, headers: Headers, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            created_at: Instant::now(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Only `200 OK` responses are stored; everything else is recomputed on
    /// every request.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::Ok
    }

    /// Replays this snapshot into a fresh [`Response`].
    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.status);
        replay(self, &mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_200_is_cacheable() {
        assert!(Snapshot::new(StatusCode::Ok, Headers::new(), "x").is_cacheable());
        assert!(!Snapshot::new(StatusCode::Created, Headers::new(), "x").is_cacheable());
        assert!(!Snapshot::new(StatusCode::InternalServerError, Headers::new(), "x").is_cacheable());
    }

    #[test]
    fn to_response_carries_every_part() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/test");
        headers.insert("Set-Cookie", "a=1");
        headers.insert("Set-Cookie", "b=2");
        let snapshot = Snapshot::new(StatusCode::Ok, headers, Bytes::from_static(b"the content"));

        let response = snapshot.to_response();
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.headers(), snapshot.headers());
        assert_eq!(response.body_ref(), b"the content");
    }
}
