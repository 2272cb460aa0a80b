//! Mock response model

use crate::Result;
use bytes::{Bytes, BytesMut};
use http::{header, HeaderName, HeaderValue, StatusCode};
use http_body::Body as _;
use http_body_util::Full;
use std::collections::HashMap;
use std::pin::pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

/// Body type alias
pub type Body = Full<Bytes>;

/// Outbound HTTP response type
pub type HttpResponse = http::Response<Body>;

/// Response state mutated by mock scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Option<Bytes>,
}

impl Response {
    /// Create a response with the given status and no body
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Set a header
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Get a header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a content type has been set
    pub fn has_content_type(&self) -> bool {
        self.header(header::CONTENT_TYPE.as_str()).is_some()
    }

    /// Body decoded as UTF-8
    pub fn body_string(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| std::str::from_utf8(b).ok())
            .map(|s| s.to_string())
    }

    /// Set body from string
    pub fn set_body_string(&mut self, body: impl Into<String>) {
        self.body = Some(Bytes::from(body.into()));
    }

    /// Set body from JSON, marking the content type
    pub fn set_body_json(&mut self, value: &serde_json::Value) -> Result<()> {
        self.body = Some(Bytes::from(serde_json::to_vec(value)?));
        self.set_header(header::CONTENT_TYPE.as_str(), "application/json");
        Ok(())
    }

    /// Convert into an HTTP response
    pub fn into_http(self) -> Result<HttpResponse> {
        let status = self.status;
        self.into_http_with_status(status)
    }

    /// Convert into an HTTP response, overriding the status code
    pub fn into_http_with_status(self, status: u16) -> Result<HttpResponse> {
        let status = StatusCode::from_u16(status)
            .map_err(|e| crate::Error::InvalidResponse(format!("Invalid status code: {e}")))?;

        let mut response = http::Response::builder().status(status);
        for (key, value) in &self.headers {
            let name = HeaderName::from_str(key).map_err(|e| {
                crate::Error::InvalidResponse(format!("Invalid header name '{key}': {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                crate::Error::InvalidResponse(format!("Invalid header value for '{key}': {e}"))
            })?;
            response = response.header(name, value);
        }

        Ok(response.body(Full::new(self.body.unwrap_or_default()))?)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

/// Read a complete body
///
/// [`Body`] is fully buffered, so this never waits: every frame is ready on
/// the first poll.
pub fn body_bytes(body: Body) -> Bytes {
    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    let waker = Waker::from(Arc::new(NoopWaker));
    let mut cx = Context::from_waker(&waker);
    let mut body = pin!(body);
    let mut buf = BytesMut::new();

    while let Poll::Ready(Some(frame)) = body.as_mut().poll_frame(&mut cx) {
        let frame = match frame {
            Ok(frame) => frame,
            Err(never) => match never {},
        };
        if let Ok(data) = frame.into_data() {
            buf.extend_from_slice(&data);
        }
    }
    buf.freeze()
}

/// Convenience functions for common responses
pub mod responses {
    use super::*;

    /// HTML response (an absent body yields an empty document)
    pub fn html(status: u16, html: Option<String>) -> Response {
        let mut response = Response::new(status);
        response.set_header(header::CONTENT_TYPE.as_str(), "text/html; charset=utf-8");
        response.body = html.map(Bytes::from);
        response
    }

    /// Plain text response
    pub fn text(status: u16, body: impl Into<String>) -> Response {
        let mut response = Response::new(status);
        response.set_header(header::CONTENT_TYPE.as_str(), "text/plain; charset=utf-8");
        response.set_body_string(body);
        response
    }

    /// 500 Internal Server Error
    pub fn internal_error(message: impl Into<String>) -> Response {
        text(500, message)
    }
}
