//! Status lines and headers for range responses.

use axum::http::header::{CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum_extra::headers::{AcceptRanges, ContentLength, HeaderMapExt};

use crate::producer::RangeProducer;

pub(crate) const OCTET_STREAM: &str = "application/octet-stream";

/// Status and headers for a range response, without a body.
#[derive(Debug, Clone)]
pub struct RangeHeaders {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// `416 Range Not Satisfiable` for a resource of `length` bytes.
pub fn format_not_satisfiable(length: u64) -> RangeHeaders {
    let mut headers = HeaderMap::new();
    headers.typed_insert(AcceptRanges::bytes());
    headers.insert(CONTENT_RANGE, content_range(0, length.saturating_sub(1), length));
    headers.typed_insert(ContentLength(0));
    RangeHeaders { status: StatusCode::RANGE_NOT_SATISFIABLE, headers }
}

/// `206 Partial Content` for `producer`.
///
/// A single part carries `Content-Range` and the caller's content type.
/// A multipart body is typed `multipart/byteranges`; each part names its
/// own range and type in its preamble.
pub fn format_partial(producer: &RangeProducer) -> RangeHeaders {
    let mut headers = HeaderMap::new();
    headers.typed_insert(AcceptRanges::bytes());

    if producer.is_multipart() {
        let value = format!("multipart/byteranges; boundary={}", producer.boundary());
        headers.insert(CONTENT_TYPE, header_value(value, OCTET_STREAM));
    } else {
        if let Some(range) = producer.ranges().next() {
            headers.insert(CONTENT_RANGE, content_range(range.start, range.end, producer.resource_length()));
        }
        headers.insert(CONTENT_TYPE, content_type(producer.content_type()));
    }

    headers.typed_insert(ContentLength(producer.total_length()));
    RangeHeaders { status: StatusCode::PARTIAL_CONTENT, headers }
}

/// `200 OK` for a producer built with [`RangeProducer::full`].
pub fn format_full(producer: &RangeProducer) -> RangeHeaders {
    let mut headers = HeaderMap::new();
    headers.typed_insert(AcceptRanges::bytes());
    headers.insert(CONTENT_TYPE, content_type(producer.content_type()));
    headers.typed_insert(ContentLength(producer.total_length()));
    RangeHeaders { status: StatusCode::OK, headers }
}

fn content_range(start: u64, end: u64, length: u64) -> HeaderValue {
    header_value(format!("bytes {}-{}/{}", start, end, length), "bytes */0")
}

fn content_type(value: &str) -> HeaderValue {
    header_value(value.to_string(), OCTET_STREAM)
}

fn header_value(value: String, fallback: &'static str) -> HeaderValue {
    HeaderValue::try_from(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, fallback, "unusable header value");
        HeaderValue::from_static(fallback)
    })
}
