//! Per-worker entry point turning HTTP requests into cycles

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::cycle::RequestCycle;
use bytes::Bytes;
use mockingjay_core::{HttpResponse, Request, Session};
use mockingjay_scripting::ScriptBridge;
use std::sync::Arc;
use tracing::{debug, error};

/// Owns a worker's shared bridge and runs one cycle per request
///
/// A dispatcher is not shared between threads: each worker creates its own
/// from the common [`ServerConfig`], and `&mut self` keeps the bridge to one
/// cycle at a time.
#[derive(Debug)]
pub struct Dispatcher {
    config: Arc<ServerConfig>,
    bridge: ScriptBridge,
    handled: u64,
}

impl Dispatcher {
    /// Create a dispatcher for a worker
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let bridge = config.bridges().global();
        Self {
            config,
            bridge,
            handled: 0,
        }
    }

    /// Server configuration
    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Number of requests handled so far
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Handle an HTTP request
    pub fn dispatch(&mut self, req: http::Request<Bytes>) -> HttpResponse {
        self.handle(Request::from_http(req))
    }

    /// Handle a request: attach the session and run a cycle
    pub fn handle(&mut self, request: Request) -> HttpResponse {
        let session = self.lookup_session(&request);
        let context = ServerContext::new(self.config.clone(), request)
            .with_optional_session(session)
            .with_variables(self.config.variables());
        self.handle_context(context)
    }

    /// Run a cycle for a prepared context
    pub fn handle_context(&mut self, context: ServerContext) -> HttpResponse {
        self.handled += 1;
        RequestCycle::new(&mut self.bridge, context).handle()
    }

    fn lookup_session(&self, request: &Request) -> Option<(Session, bool)> {
        let settings = &self.config.settings().session;
        let store = self.config.sessions();

        if let Some(id) = cookie(request, &settings.cookie_name) {
            match store.get(id) {
                Ok(Some(session)) => return Some((session, false)),
                Ok(None) => debug!(id, "Unknown or expired session"),
                Err(e) => error!(id, error = %e, "Failed to load session"),
            }
        }

        if !settings.auto_create {
            return None;
        }
        match store.create() {
            Ok(session) => Some((session, true)),
            Err(e) => {
                error!(error = %e, "Failed to create session");
                None
            }
        }
    }
}

/// Value of a cookie from the `Cookie` header
fn cookie<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.header("cookie")?.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}
