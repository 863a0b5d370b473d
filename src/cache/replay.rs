//! Writing a captured [`Snapshot`] back out through a response sink.

use super::Snapshot;
use crate::http::ResponseSink;

/// Writes `snapshot` to `sink`: status, every header in captured order and
/// casing, the body bytes, then `finalize`.
///
/// Touches nothing but `sink`, so replaying the same snapshot any number of
/// times produces the same output.
pub fn replay<S: ResponseSink + ?Sized>(snapshot: &Snapshot, sink: &mut S) {
    sink.set_status(snapshot.status());
    for (name, value) in snapshot.headers().iter() {
        sink.append_header(name, value);
    }
    if !snapshot.body().is_empty() {
        sink.write_body(snapshot.body());
    }
    sink.finalize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Headers, Response, StatusCode};

    #[test]
    fn replay_is_repeatable() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "image/png");
        headers.insert("X-Part", "1");
        headers.insert("X-Part", "2");
        let body = vec![0x89u8, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0xff, 0x00];
        let snapshot = Snapshot::new(StatusCode::Ok, headers, body.clone());

        let mut first = Response::new(StatusCode::InternalServerError);
        let mut second = Response::default();
        replay(&snapshot, &mut first);
        replay(&snapshot, &mut second);

        for response in [&first, &second] {
            assert_eq!(response.status(), StatusCode::Ok);
            assert_eq!(response.headers(), snapshot.headers());
            assert_eq!(response.body_ref(), body.as_slice());
        }
    }

    #[test]
    fn replay_keeps_header_casing() {
        let mut headers = Headers::new();
        headers.insert("X-MiXeD-CaSe", "v");
        let snapshot = Snapshot::new(StatusCode::Ok, headers, "");

        let response = snapshot.to_response();
        let names: Vec<_> = response.headers().iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["X-MiXeD-CaSe"]);
        assert!(response.body_ref().is_empty());
    }
}
