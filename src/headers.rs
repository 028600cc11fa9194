//! The outbound header set committed ahead of a response body.

use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

/// Carries the numeric status out-of-band; the transport has no status line.
pub const CODE: HeaderName = HeaderName::from_static("code");

pub const ACCEPT_RANGES: HeaderName = header::ACCEPT_RANGES;
pub const CONTENT_TYPE: HeaderName = header::CONTENT_TYPE;
pub const CONTENT_RANGE: HeaderName = header::CONTENT_RANGE;
pub const CONTENT_LENGTH: HeaderName = header::CONTENT_LENGTH;
pub const CONTENT_ENCODING: HeaderName = header::CONTENT_ENCODING;
pub const CONTENT_DISPOSITION: HeaderName = header::CONTENT_DISPOSITION;
pub const LAST_MODIFIED: HeaderName = header::LAST_MODIFIED;
pub const ETAG: HeaderName = header::ETAG;
pub const CACHE_CONTROL: HeaderName = header::CACHE_CONTROL;
pub const X_CONTENT_TYPE_OPTIONS: HeaderName = header::X_CONTENT_TYPE_OPTIONS;
pub const TRANSFER_ENCODING: HeaderName = header::TRANSFER_ENCODING;

/// Every header a response may carry, in emission order.
pub const VOCABULARY: [HeaderName; 11] = [
    ACCEPT_RANGES,
    CONTENT_TYPE,
    CONTENT_RANGE,
    CONTENT_LENGTH,
    CONTENT_ENCODING,
    CONTENT_DISPOSITION,
    LAST_MODIFIED,
    ETAG,
    CACHE_CONTROL,
    X_CONTENT_TYPE_OPTIONS,
    TRANSFER_ENCODING,
];

/// Headers plus out-of-band status for one response.
///
/// Built up while a request is evaluated and handed to
/// [`ChunkSink::send_header`](crate::ChunkSink::send_header) exactly once.
/// Names outside [`VOCABULARY`] are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHeaders {
    status: Option<StatusCode>,
    headers: HeaderMap,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn get(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
    }

    pub fn contains(&self, name: &HeaderName) -> bool {
        self.headers.contains_key(name)
    }

    /// Replaces `name`. The value is taken byte for byte, so UTF-8 file
    /// names and obs-text ETags survive; control characters are dropped.
    pub fn set(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_bytes(value.as_bytes()) {
            Ok(value) => self.set_value(name, value),
            Err(_) => tracing::warn!(header = %name, "dropping header value with control characters"),
        }
    }

    pub fn set_value(&mut self, name: HeaderName, value: HeaderValue) {
        if VOCABULARY.contains(&name) {
            self.headers.insert(name, value);
        }
    }

    pub fn remove(&mut self, name: &HeaderName) {
        self.headers.remove(name);
    }

    /// Flattens into a header map, with the status under [`CODE`].
    pub fn into_header_map(self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len() + 1);
        for name in VOCABULARY {
            if let Some(value) = self.headers.get(&name) {
                map.insert(name, value.clone());
            }
        }
        if let Some(status) = self.status {
            map.insert(CODE, HeaderValue::from(status.as_u16()));
        }
        map
    }
}

impl IntoResponse for ResponseHeaders {
    fn into_response(self) -> Response {
        let status = self.status.unwrap_or(StatusCode::OK);
        (status, self.headers).into_response()
    }
}
