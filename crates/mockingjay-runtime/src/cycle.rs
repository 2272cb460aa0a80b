//! The request cycle: bind, resolve, execute or render, respond, clean up

use crate::config::ServerConfig;
use crate::context::{session_value, ContextHandle, CustomHandler, ServerContext};
use crate::error::{Error, Result};
use crate::registry::ActiveCycle;
use crate::response::ResponseBuilder;
use crate::CyclePhase;
use mockingjay_core::{Body, HttpResponse, Request, Response, Session, StatusCode};
use mockingjay_scripting::{RequestHandle, ResponseHandle, ScriptBridge, ScriptValue};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Binding holding the session data map
pub const SESSION: &str = "session";
/// Binding holding the request
pub const REQUEST: &str = "request";
/// Binding holding the response
pub const RESPONSE: &str = "response";
/// Binding holding the context flags
pub const CONTEXT: &str = "context";

const RESERVED: [&str; 4] = [SESSION, REQUEST, RESPONSE, CONTEXT];

/// Outcome of mapping a request path to a script resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Resource to execute
    pub resource: String,
    /// Trailing segments consumed while falling back, nearest first
    pub path_params: Vec<String>,
    /// Whether `resource` is a registered script
    pub matched: bool,
}

/// Map a request path to a script resource
///
/// The exact `<path><extension>` wins. Otherwise trailing segments are
/// peeled off one at a time until an ancestor names a registered script;
/// the peeled segments become path parameters, last segment first. When no
/// ancestor matches the last candidate tried is returned unmatched.
///
/// ```
/// use mockingjay_runtime::resolve_resource;
///
/// let r = resolve_resource("api/cats/1/toys", ".rhai", |c| c == "api/cats.rhai");
/// assert_eq!(r.resource, "api/cats.rhai");
/// assert_eq!(r.path_params, vec!["toys", "1"]);
/// ```
pub fn resolve_resource<F>(path: &str, extension: &str, is_script: F) -> Resolution
where
    F: Fn(&str) -> bool,
{
    let path = path.trim_start_matches('/');
    let mut candidate = format!("{path}{extension}");
    let mut path_params = Vec::new();
    let mut remaining = path;

    loop {
        if is_script(&candidate) {
            return Resolution {
                resource: candidate,
                path_params,
                matched: true,
            };
        }
        let Some(pos) = remaining.rfind('/') else {
            return Resolution {
                resource: candidate,
                path_params,
                matched: false,
            };
        };
        path_params.push(remaining[pos + 1..].to_string());
        remaining = &remaining[..pos];
        candidate = format!("{remaining}{extension}");
    }
}

/// Bridge used by a cycle: the worker's shared one, or one it owns
enum BridgeSlot<'b> {
    Shared(&'b mut ScriptBridge),
    Owned(ScriptBridge),
}

impl Deref for BridgeSlot<'_> {
    type Target = ScriptBridge;

    fn deref(&self) -> &ScriptBridge {
        match self {
            BridgeSlot::Shared(bridge) => bridge,
            BridgeSlot::Owned(bridge) => bridge,
        }
    }
}

impl DerefMut for BridgeSlot<'_> {
    fn deref_mut(&mut self) -> &mut ScriptBridge {
        match self {
            BridgeSlot::Shared(bridge) => bridge,
            BridgeSlot::Owned(bridge) => bridge,
        }
    }
}

impl Drop for BridgeSlot<'_> {
    fn drop(&mut self) {
        // the next cycle on this worker must start from empty bindings
        if let BridgeSlot::Shared(bridge) = self {
            bridge.reset();
        }
    }
}

/// One request/response cycle
///
/// A cycle is created with its bindings already in place, handles exactly
/// one request and cleans up after itself: the session is saved or deleted,
/// the thread's active-cycle slot is released and a shared bridge is reset.
/// Cleanup also runs if the cycle is dropped without being handled.
pub struct RequestCycle<'b> {
    bridge: BridgeSlot<'b>,
    config: Arc<ServerConfig>,
    request: RequestHandle,
    response: ResponseHandle,
    session: Option<Session>,
    custom_handler: Option<CustomHandler>,
    context: ContextHandle,
    phase: CyclePhase,
    nested: bool,
}

impl<'b> RequestCycle<'b> {
    /// Create a top-level cycle on a worker's shared bridge
    pub fn new(bridge: &'b mut ScriptBridge, context: ServerContext) -> Self {
        Self::init(BridgeSlot::Shared(bridge), context, false)
    }

    /// Create a cycle with a bridge of its own
    pub fn isolated(context: ServerContext) -> RequestCycle<'static> {
        let bridge = context.config().bridges().isolated();
        RequestCycle::init(BridgeSlot::Owned(bridge), context, false)
    }

    fn init(mut bridge: BridgeSlot<'b>, context: ServerContext, nested: bool) -> Self {
        let parts = context.into_parts();

        // reserved names are bound last so free variables cannot shadow them
        if let Some(session) = &parts.session {
            bridge.bind(SESSION, session_value(session));
        }
        bridge.bind_all(parts.variables);

        parts.request.write().process_body();
        let response = ResponseHandle::new(Response::default());
        bridge.bind_constant(REQUEST, parts.request.clone());
        bridge.bind_constant(RESPONSE, response.clone());
        bridge.bind_constant(CONTEXT, parts.handle.clone());

        trace!(
            request = %parts.request.read(),
            nested,
            bindings = bridge.len(),
            "Cycle initialized"
        );

        Self {
            bridge,
            config: parts.config,
            request: parts.request,
            response,
            session: parts.session,
            custom_handler: parts.custom_handler,
            context: parts.handle,
            phase: CyclePhase::Initialized,
            nested,
        }
    }

    /// Derive a nested cycle for another request
    ///
    /// The copy shares only the session and the configuration. It runs on a
    /// fresh isolated bridge, so none of this cycle's bindings are visible to
    /// it and nothing it binds leaks back.
    pub fn copy(
        &self,
        request: Request,
        variables: BTreeMap<String, ScriptValue>,
    ) -> RequestCycle<'static> {
        let mut context = ServerContext::new(self.config.clone(), request).with_variables(variables);
        if let Some(session) = &self.session {
            context = context.with_session(session.clone(), false);
        }
        let bridge = self.config.bridges().isolated();
        RequestCycle::init(BridgeSlot::Owned(bridge), context, true)
    }

    /// Current phase
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Whether this cycle was derived with [`RequestCycle::copy`]
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// Request handle
    pub fn request(&self) -> &RequestHandle {
        &self.request
    }

    /// Response handle
    pub fn response(&self) -> &ResponseHandle {
        &self.response
    }

    /// Context flags
    pub fn context(&self) -> &ContextHandle {
        &self.context
    }

    /// Session as loaded (script changes are applied on close)
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Script bridge
    pub fn bridge(&self) -> &ScriptBridge {
        &self.bridge
    }

    /// Bind an extra value before handling
    ///
    /// `session`, `request`, `response` and `context` belong to the cycle
    /// and cannot be rebound.
    pub fn bind(&mut self, name: &str, value: impl Into<ScriptValue>) -> Result<()> {
        if RESERVED.contains(&name) {
            return Err(Error::ReservedName(name.to_string()));
        }
        self.bridge.bind(name, value);
        Ok(())
    }

    /// Handle the request and close the cycle
    ///
    /// Never fails: any error is logged and answered with a 500.
    pub fn handle(mut self) -> HttpResponse {
        let (method, path) = {
            let request = self.request.read();
            (request.method.clone(), request.path.clone())
        };
        let _active = self
            .config
            .cycles()
            .enter(ActiveCycle::new(&method, &path, self.nested));

        let response = match self.execute() {
            Ok(response) => response,
            Err(e) => {
                error!(method = %method, path = %path, error = %e, "Request failed");
                self.phase = CyclePhase::Failed;
                self.response.set_status(500);
                self.builder().build_with_status(500).unwrap_or_else(|e| {
                    error!(error = %e, "Failed to build error response");
                    internal_error()
                })
            }
        };

        self.close();

        let elapsed_ms = self.request.read().start_time.elapsed().as_millis() as u64;
        info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            elapsed_ms,
            "Request handled"
        );
        response
    }

    fn execute(&mut self) -> Result<HttpResponse> {
        if let Some(handler) = self.custom_handler.clone() {
            debug!("Custom handler, skipping resolution");
            let response = handler();
            *self.response.write() = response;
            self.phase = CyclePhase::Building;
            return self.builder().build();
        }

        if self.context.is_api() {
            self.execute_script()?;
            self.phase = CyclePhase::Building;
            self.builder().build()
        } else {
            let html = self.render_template()?;
            self.phase = CyclePhase::Building;
            self.builder().html(html).build()
        }
    }

    fn execute_script(&mut self) -> Result<()> {
        self.phase = CyclePhase::Resolving;
        let path = self.request.read().path.clone();
        let config = self.config.clone();
        let resolution = resolve_resource(&path, &config.script_extension(), |candidate| {
            config.is_script(candidate)
        });

        if !resolution.matched {
            warn!(
                path = %path,
                resource = %resolution.resource,
                "No script matches path, trying last candidate"
            );
        } else if !resolution.path_params.is_empty() {
            debug!(
                path = %path,
                resource = %resolution.resource,
                path_params = ?resolution.path_params,
                "Resolved by ancestor"
            );
        }

        {
            let mut request = self.request.write();
            request.path_param = resolution.path_params.first().cloned();
            request.path_params = resolution.path_params;
        }

        let resource = config.resolver().resolve(&resolution.resource)?;

        self.phase = CyclePhase::Executing;
        let lock_needed =
            self.context.is_lock_needed() || config.is_non_reentrant(&resolution.resource);
        let result = if lock_needed {
            let lock = config.locks().lock_for(&resolution.resource);
            let _guard = lock.lock();
            trace!(resource = %resolution.resource, "Executing under lock");
            self.bridge.eval_reader(&resolution.resource, resource)
        } else {
            self.bridge.eval_reader(&resolution.resource, resource)
        };

        let value = result?;
        trace!(resource = %resolution.resource, result = %value, "Script executed");
        Ok(())
    }

    fn render_template(&mut self) -> Result<Option<String>> {
        self.phase = CyclePhase::Rendering;
        let path = self.request.read().path.clone();
        let templates = self.config.templates();

        let err = match templates.process(&path, &self.context) {
            Ok(html) => return Ok(Some(html)),
            Err(e) if self.context.is_switched() => e,
            Err(e) => return Err(e),
        };

        self.phase = CyclePhase::Switched;
        let Some(target) = self.context.switch_target() else {
            debug!(path = %path, error = %err, "Template aborted, responding without body");
            return Ok(None);
        };

        debug!(from = %path, to = %target.template, error = %err, "Switching template");
        {
            let mut request = self.request.write();
            request.clear_params();
            for (name, value) in target.params {
                request.params.insert(name, param_values(value));
            }
        }

        // only the first switch is recovered; a failure here propagates
        templates.process(&target.template, &self.context).map(Some)
    }

    fn builder(&self) -> ResponseBuilder<'_> {
        ResponseBuilder::new(&self.config, self.response.snapshot())
            .session(self.session.as_ref(), &self.context)
    }

    /// Reconcile the session and release the cycle
    ///
    /// A closed context deletes the session. Otherwise the script's view of
    /// `session` is merged over the loaded data and saved; keys the script
    /// removed stay in the store. Store failures are logged, never raised.
    /// Calling this more than once has no further effect.
    pub fn close(&mut self) {
        if self.phase == CyclePhase::Closed {
            return;
        }

        if let Some(session) = self.session.as_mut() {
            let store = self.config.sessions();
            if self.context.is_closed() {
                match store.delete(&session.id) {
                    Ok(()) => debug!(id = %session.id, "Session deleted"),
                    Err(e) => error!(id = %session.id, error = %e, "Failed to delete session"),
                }
            } else {
                match self.bridge.get(SESSION) {
                    ScriptValue::Map(entries) => {
                        session.merge(entries.into_iter().map(|(k, v)| (k, v.to_json())));
                        match store.save(session) {
                            Ok(()) => trace!(id = %session.id, "Session saved"),
                            Err(e) => error!(id = %session.id, error = %e, "Failed to save session"),
                        }
                    }
                    other => error!(
                        id = %session.id,
                        type_name = other.type_name(),
                        "Session binding is not a map, not saved"
                    ),
                }
            }
        }

        self.phase = CyclePhase::Closed;
    }
}

impl Drop for RequestCycle<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for RequestCycle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCycle")
            .field("request", &self.request.read().to_string())
            .field("phase", &self.phase)
            .field("nested", &self.nested)
            .field("session", &self.session.as_ref().map(|s| &s.id))
            .field("context", &self.context)
            .finish()
    }
}

fn param_values(value: ScriptValue) -> Vec<String> {
    match value {
        ScriptValue::Array(items) => items.iter().map(|v| v.to_string()).collect(),
        other => vec![other.to_string()],
    }
}

fn internal_error() -> HttpResponse {
    let mut response = HttpResponse::new(Body::default());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registered<'a>(scripts: &'a [&'a str]) -> impl Fn(&str) -> bool + 'a {
        move |candidate| scripts.iter().any(|s| *s == candidate)
    }

    #[test]
    fn test_exact_match() {
        let r = resolve_resource("api/cats", ".rhai", registered(&["api/cats.rhai"]));
        assert_eq!(r.resource, "api/cats.rhai");
        assert!(r.path_params.is_empty());
        assert!(r.matched);
    }

    #[test]
    fn test_one_level_fallback() {
        let r = resolve_resource("api/cats/1", ".rhai", registered(&["api/cats.rhai"]));
        assert_eq!(r.resource, "api/cats.rhai");
        assert_eq!(r.path_params, vec!["1"]);
    }

    #[test]
    fn test_two_level_fallback() {
        let r = resolve_resource("a/b/c", ".rhai", registered(&["a.rhai"]));
        assert_eq!(r.resource, "a.rhai");
        assert_eq!(r.path_params, vec!["c", "b"]);
        assert!(r.matched);
    }

    #[test]
    fn test_nearest_ancestor_wins() {
        let r = resolve_resource(
            "api/cats/1/toys",
            ".rhai",
            registered(&["api.rhai", "api/cats/1.rhai"]),
        );
        assert_eq!(r.resource, "api/cats/1.rhai");
        assert_eq!(r.path_params, vec!["toys"]);
    }

    #[test]
    fn test_no_match_falls_back_to_last_candidate() {
        let r = resolve_resource("api/dogs/1", ".rhai", registered(&["api/cats.rhai"]));
        assert!(!r.matched);
        assert_eq!(r.resource, "api.rhai");
        assert_eq!(r.path_params, vec!["1", "dogs"]);

        let single = resolve_resource("dogs", ".rhai", registered(&[]));
        assert!(!single.matched);
        assert_eq!(single.resource, "dogs.rhai");
        assert!(single.path_params.is_empty());
    }

    #[test]
    fn test_leading_slash_ignored() {
        let r = resolve_resource("/api/cats", ".rhai", registered(&["api/cats.rhai"]));
        assert_eq!(r.resource, "api/cats.rhai");
    }

    #[test]
    fn test_param_values() {
        assert_eq!(param_values(ScriptValue::from("v")), vec!["v"]);
        assert_eq!(param_values(ScriptValue::from(3_i64)), vec!["3"]);
        assert_eq!(
            param_values(ScriptValue::from(vec!["a", "b"])),
            vec!["a", "b"]
        );
    }
}
