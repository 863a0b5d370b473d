//! Tee writer that captures a response while forwarding it to the real sink.

use bytes::BytesMut;

use super::Snapshot;
use crate::http::{Headers, ResponseSink, StatusCode};

/// Wraps a [`ResponseSink`] and records every write made through it.
///
/// Each call reaches the wrapped sink first and the capture buffer second, so
/// the real response is never held back by recording. When the handler is
/// done, [`into_parts`](Self::into_parts) hands back the sink together with a
/// [`Snapshot`] of exactly what was written.
///
/// # Examples
///
/// ```
/// use rttp_cache::cache::Recorder;
/// use rttp_cache::http::{Response, StatusCode};
///
/// let produced = Response::new(StatusCode::Ok)
///     .header("Content-Type", "text/test")
///     .body("the content");
///
/// let mut recorder = Recorder::new(Response::default());
/// produced.send_to(&mut recorder);
/// let (served, snapshot) = recorder.into_parts();
///
/// assert_eq!(served.body_ref(), b"the content");
/// assert_eq!(snapshot.body().as_ref(), b"the content");
/// assert_eq!(snapshot.headers().get("content-type"), Some("text/test"));
/// ```
#[derive(Debug)]
pub struct Recorder<S> {
    sink: S,
    status: StatusCode,
    headers: Headers,
    body: BytesMut,
}

impl<S: ResponseSink> Recorder<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            status: StatusCode::Ok,
            headers: Headers::new(),
            body: BytesMut::new(),
        }
    }

    /// Splits the recorder into the wrapped sink and the captured snapshot.
    pub fn into_parts(self) -> (S, Snapshot) {
        let snapshot = Snapshot::new(self.status, self.headers, self.body.freeze());
        (self.sink, snapshot)
    }
}

impl<S: ResponseSink> ResponseSink for Recorder<S> {
    fn set_status(&mut self, status: StatusCode) {
        self.sink.set_status(status);
        self.status = status;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.sink.set_header(name, value);
        self.headers.set(name, value);
    }

    fn append_header(&mut self, name: &str, value: &str) {
        self.sink.append_header(name, value);
        self.headers.insert(name, value);
    }

    fn write_body(&mut self, chunk: &[u8]) {
        self.sink.write_body(chunk);
        self.body.extend_from_slice(chunk);
    }

    fn finalize(&mut self) {
        self.sink.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;
    use serde_json::json;

    #[derive(Default)]
    struct Journal(Vec<String>);

    impl ResponseSink for Journal {
        fn set_status(&mut self, status: StatusCode) {
            self.0.push(format!("status {}", status.as_u16()));
        }
        fn set_header(&mut self, name: &str, value: &str) {
            self.0.push(format!("set {name}: {value}"));
        }
        fn append_header(&mut self, name: &str, value: &str) {
            self.0.push(format!("append {name}: {value}"));
        }
        fn write_body(&mut self, chunk: &[u8]) {
            self.0.push(format!("body {}", chunk.len()));
        }
        fn finalize(&mut self) {
            self.0.push("finalize".to_owned());
        }
    }

    #[test]
    fn forwards_every_call_to_the_sink() {
        let mut recorder = Recorder::new(Journal::default());
        recorder.set_status(StatusCode::Accepted);
        recorder.set_header("Content-Type", "text/plain");
        recorder.append_header("Vary", "Accept");
        recorder.write_body(b"abc");
        recorder.write_body(b"de");
        recorder.finalize();

        let (journal, snapshot) = recorder.into_parts();
        assert_eq!(
            journal.0,
            vec![
                "status 202",
                "set Content-Type: text/plain",
                "append Vary: Accept",
                "body 3",
                "body 2",
                "finalize",
            ]
        );
        assert_eq!(snapshot.status(), StatusCode::Accepted);
        assert_eq!(snapshot.body().as_ref(), b"abcde");
    }

    #[test]
    fn captures_json_with_default_content_type() {
        let produced = Response::new(StatusCode::Ok)
            .json(&json!({ "hello": "world" }))
            .unwrap();

        let mut recorder = Recorder::new(Response::default());
        produced.send_to(&mut recorder);
        let (_, snapshot) = recorder.into_parts();

        assert_eq!(snapshot.headers().get("Content-Type"), Some("application/json"));
        assert_eq!(snapshot.body().as_ref(), br#"{"hello":"world"}"#);
    }

    #[test]
    fn captures_binary_bytes_exactly() {
        let payload: Vec<u8> = (0..=255u8).rev().collect();
        let produced = Response::new(StatusCode::Ok)
            .header("Content-Type", "application/octet-stream")
            .body_bytes(payload.clone());

        let mut recorder = Recorder::new(Response::default());
        produced.send_to(&mut recorder);
        let (served, snapshot) = recorder.into_parts();

        assert_eq!(served.body_ref(), payload.as_slice());
        assert_eq!(snapshot.body().as_ref(), payload.as_slice());
    }

    #[test]
    fn set_header_replaces_in_capture() {
        let mut recorder = Recorder::new(Response::default());
        recorder.append_header("Cache-Control", "no-store");
        recorder.set_header("cache-control", "max-age=5");
        let (served, snapshot) = recorder.into_parts();

        let captured: Vec<_> = snapshot.headers().get_all("Cache-Control").collect();
        assert_eq!(captured, vec!["max-age=5"]);
        assert_eq!(served.headers(), snapshot.headers());
    }
}
