pub mod health;
pub mod objects;
pub mod sessions;
pub mod signed;

use std::ops::Range;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// `Content-Range` value for an end-exclusive range of an object of `size` bytes.
fn content_range(range: &Range<u64>, size: u64) -> String {
    if range.is_empty() {
        format!("bytes */{}", size)
    } else {
        format!("bytes {}-{}/{}", range.start, range.end - 1, size)
    }
}

/// Object body response: 206 with `Content-Range` when a range was served, 200 otherwise.
fn object_body(data: Bytes, range: Option<(Range<u64>, u64)>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    match range {
        Some((range, size)) => {
            if let Ok(value) = HeaderValue::from_str(&content_range(&range, size)) {
                headers.insert(header::CONTENT_RANGE, value);
            }
            (StatusCode::PARTIAL_CONTENT, headers, data).into_response()
        }
        None => (StatusCode::OK, headers, data).into_response(),
    }
}
