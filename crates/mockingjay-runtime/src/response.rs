//! Outbound response assembly

use crate::config::ServerConfig;
use crate::context::ContextHandle;
use crate::error::Result;
use mockingjay_core::{responses, HttpResponse, Response, Session};
use http::header::{HeaderValue, SET_COOKIE};
use tracing::warn;

/// Builds the outbound HTTP response for a cycle
///
/// The builder applies the session cookie: a freshly created session is
/// announced with `Set-Cookie`, a closed one is expired.
#[derive(Debug)]
pub struct ResponseBuilder<'a> {
    config: &'a ServerConfig,
    response: Response,
    session: Option<&'a Session>,
    new_session: bool,
    closed: bool,
}

impl<'a> ResponseBuilder<'a> {
    /// Start from the response state a cycle accumulated
    pub fn new(config: &'a ServerConfig, response: Response) -> Self {
        Self {
            config,
            response,
            session: None,
            new_session: false,
            closed: false,
        }
    }

    /// Apply session cookie handling for `session`
    pub fn session(mut self, session: Option<&'a Session>, context: &ContextHandle) -> Self {
        self.session = session;
        self.new_session = context.is_new_session();
        self.closed = context.is_closed();
        self
    }

    /// Replace the body with rendered HTML
    pub fn html(mut self, html: Option<String>) -> Self {
        let mut rendered = responses::html(self.response.status, html);
        for (name, value) in self.response.headers.drain() {
            rendered.headers.entry(name).or_insert(value);
        }
        self.response = rendered;
        self
    }

    /// Build with the accumulated status
    pub fn build(self) -> Result<HttpResponse> {
        let status = self.response.status;
        self.build_with_status(status)
    }

    /// Build with an explicit status
    pub fn build_with_status(self, status: u16) -> Result<HttpResponse> {
        let cookie = self.cookie();
        let mut response = self.response.into_http_with_status(status)?;

        if let Some(cookie) = cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => warn!(error = %e, "Invalid session cookie, not sent"),
            }
        }

        Ok(response)
    }

    fn cookie(&self) -> Option<String> {
        let session = self.session?;
        let name = &self.config.settings().session.cookie_name;
        if self.closed {
            Some(format!("{name}=; Path=/; Max-Age=0"))
        } else if self.new_session {
            Some(format!("{name}={}; Path=/; HttpOnly", session.id))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::InMemoryResourceResolver;
    use mockingjay_config::Config;
    use mockingjay_core::Request;
    use mockingjay_scripting::RequestHandle;
    use std::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig::builder(Config::default())
            .resolver(InMemoryResourceResolver::new())
            .build()
            .unwrap()
    }

    fn context() -> ContextHandle {
        ContextHandle::new(RequestHandle::new(Request::new("GET", "/")), false)
    }

    #[test]
    fn test_build_keeps_status_and_headers() {
        let config = config();
        let mut response = Response::new(201);
        response.set_header("X-Mock", "cats");

        let http = ResponseBuilder::new(&config, response).build().unwrap();
        assert_eq!(http.status(), 201);
        assert_eq!(http.headers()["x-mock"], "cats");
        assert!(http.headers().get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_build_with_status_overrides() {
        let config = config();
        let http = ResponseBuilder::new(&config, Response::new(201))
            .build_with_status(500)
            .unwrap();
        assert_eq!(http.status(), 500);
    }

    #[test]
    fn test_html() {
        let config = config();
        let http = ResponseBuilder::new(&config, Response::default())
            .html(Some("<p>hi</p>".to_string()))
            .build()
            .unwrap();
        assert_eq!(http.status(), 200);
        assert_eq!(http.headers()["content-type"], "text/html; charset=utf-8");
    }

    #[test]
    fn test_new_session_cookie() {
        let config = config();
        let session = Session::with_id("abc", Duration::from_secs(60));
        let context = context();
        context.set_new_session(true);

        let http = ResponseBuilder::new(&config, Response::default())
            .session(Some(&session), &context)
            .build()
            .unwrap();
        assert_eq!(
            http.headers()[SET_COOKIE],
            "MOCKINGJAY_SESSION=abc; Path=/; HttpOnly"
        );
    }

    #[test]
    fn test_closed_session_cookie_expired() {
        let config = config();
        let session = Session::with_id("abc", Duration::from_secs(60));
        let context = context();
        context.close();

        let http = ResponseBuilder::new(&config, Response::default())
            .session(Some(&session), &context)
            .build()
            .unwrap();
        assert_eq!(
            http.headers()[SET_COOKIE],
            "MOCKINGJAY_SESSION=; Path=/; Max-Age=0"
        );
    }

    #[test]
    fn test_existing_session_no_cookie() {
        let config = config();
        let session = Session::with_id("abc", Duration::from_secs(60));

        let http = ResponseBuilder::new(&config, Response::default())
            .session(Some(&session), &context())
            .build()
            .unwrap();
        assert!(http.headers().get(SET_COOKIE).is_none());
    }
}
