//! Inbound request model

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{trace, warn};

/// Request as seen by mock scripts and templates
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method (upper case)
    pub method: String,

    /// Request path without the leading `/`
    pub path: String,

    /// Query and form parameters (name -> values)
    pub params: HashMap<String, Vec<String>>,

    /// Headers with lower-cased names
    pub headers: HashMap<String, String>,

    /// Path segments captured during resource resolution, leaf first
    pub path_params: Vec<String>,

    /// First captured path segment
    pub path_param: Option<String>,

    /// Raw request body
    pub body: Option<Bytes>,

    /// Parsed JSON body (after [`Request::process_body`])
    pub body_value: Option<serde_json::Value>,

    /// When this request arrived
    pub start_time: Instant,
}

impl Request {
    /// Create a request for the given method and path
    pub fn new(method: impl Into<String>, path: impl AsRef<str>) -> Self {
        let (path, query) = split_query(path.as_ref());
        let mut request = Self {
            method: method.into().to_uppercase(),
            path: normalize_path(path),
            params: HashMap::new(),
            headers: HashMap::new(),
            path_params: Vec::new(),
            path_param: None,
            body: None,
            body_value: None,
            start_time: Instant::now(),
        };
        if let Some(query) = query {
            request.merge_form(query.as_bytes());
        }
        request
    }

    /// Create from an HTTP request
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        let mut request = Self::new(parts.method.as_str(), parts.uri.path());

        if let Some(query) = parts.uri.query() {
            request.merge_form(query.as_bytes());
        }

        request.headers = parts
            .headers
            .iter()
            .map(|(k, v)| (k.as_str().to_lowercase(), v.to_str().unwrap_or("").to_string()))
            .collect();

        if !body.is_empty() {
            request.body = Some(body);
        }
        request
    }

    /// Set a header (name is lower-cased)
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_lowercase(), value.into());
        self
    }

    /// Set the raw body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|s| s.as_str())
    }

    /// Content type header, if present
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get the first value of a parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(|s| s.as_str())
    }

    /// Replace all values of a parameter with a single value
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), vec![value.into()]);
    }

    /// Remove every parameter
    pub fn clear_params(&mut self) {
        self.params.clear();
    }

    /// Body decoded as UTF-8
    pub fn body_string(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| std::str::from_utf8(b).ok())
            .map(|s| s.to_string())
    }

    /// Parse and normalize the body
    ///
    /// JSON bodies are parsed into [`Request::body_value`], url-encoded form
    /// bodies are merged into the parameters, anything else stays raw.
    pub fn process_body(&mut self) {
        let Some(body) = self.body.clone() else {
            return;
        };
        let content_type = self.content_type().unwrap_or("").to_lowercase();

        if content_type.contains("json") {
            match serde_json::from_slice(&body) {
                Ok(value) => self.body_value = Some(value),
                Err(e) => warn!(path = %self.path, error = %e, "Request body is not valid JSON"),
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            self.merge_form(&body);
        } else {
            trace!(path = %self.path, len = body.len(), "Keeping raw request body");
        }
    }

    fn merge_form(&mut self, input: &[u8]) {
        for (k, v) in form_urlencoded::parse(input) {
            self.params
                .entry(k.into_owned())
                .or_default()
                .push(v.into_owned());
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{}", self.method, self.path)
    }
}

fn split_query(path: &str) -> (&str, Option<&str>) {
    match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    }
}

fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_strips_leading_slash_and_parses_query() {
        let request = Request::new("get", "/users/42?expand=true&tag=a&tag=b");
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "users/42");
        assert_eq!(request.param("expand"), Some("true"));
        assert_eq!(request.params["tag"], vec!["a", "b"]);
        assert_eq!(request.to_string(), "GET /users/42");
    }

    #[test]
    fn test_from_http() {
        let http_req = http::Request::builder()
            .method("POST")
            .uri("/cats?name=Billie")
            .header("Content-Type", "application/json")
            .body(Bytes::from_static(b"{\"id\": 1}"))
            .unwrap();

        let mut request = Request::from_http(http_req);
        assert_eq!(request.path, "cats");
        assert_eq!(request.param("name"), Some("Billie"));
        assert_eq!(request.content_type(), Some("application/json"));

        request.process_body();
        assert_eq!(request.body_value, Some(serde_json::json!({ "id": 1 })));
    }

    #[test]
    fn test_form_body_merged_into_params() {
        let mut request = Request::new("POST", "/login")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("user=john&pass=secret");
        request.process_body();

        assert_eq!(request.param("user"), Some("john"));
        assert_eq!(request.param("pass"), Some("secret"));
        assert!(request.body_value.is_none());
    }

    #[test]
    fn test_invalid_json_body_is_kept_raw() {
        let mut request = Request::new("POST", "/cats")
            .with_header("content-type", "application/json")
            .with_body("{not json");
        request.process_body();

        assert!(request.body_value.is_none());
        assert_eq!(request.body_string().as_deref(), Some("{not json"));
    }

    #[test]
    fn test_param_replacement() {
        let mut request = Request::new("GET", "/page?k=1&k=2");
        request.set_param("k", "v");
        assert_eq!(request.params["k"], vec!["v"]);

        request.clear_params();
        assert!(request.params.is_empty());
        assert_eq!(request.param("k"), None);
    }
}
