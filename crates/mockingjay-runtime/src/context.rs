//! Per-cycle server context and the `context` object scripts see

use crate::config::ServerConfig;
use mockingjay_core::{Request, Response, Session};
use mockingjay_scripting::rhai::{Engine, Map};
use mockingjay_scripting::{RequestHandle, ScriptValue};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Handler that answers a request without resolving any resource
pub type CustomHandler = Arc<dyn Fn() -> Response + Send + Sync>;

/// Template to render in place of a failed one
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchTarget {
    /// Template path
    pub template: String,
    /// Replacement request parameters
    pub params: BTreeMap<String, ScriptValue>,
}

#[derive(Debug, Default)]
struct ContextFlags {
    api: bool,
    lock_needed: bool,
    new_session: bool,
    switched: bool,
    closed: bool,
    switch_target: Option<SwitchTarget>,
}

/// Shared, mutable cycle flags
///
/// Bound into scripts as `context` and handed to template engines, so both
/// can close the session or request a template switch.
#[derive(Clone)]
pub struct ContextHandle {
    flags: Arc<Mutex<ContextFlags>>,
    request: RequestHandle,
}

impl ContextHandle {
    /// Create flags for a request
    pub fn new(request: RequestHandle, api: bool) -> Self {
        Self {
            flags: Arc::new(Mutex::new(ContextFlags {
                api,
                ..ContextFlags::default()
            })),
            request,
        }
    }

    /// Request of the owning cycle
    pub fn request(&self) -> &RequestHandle {
        &self.request
    }

    /// Whether the request targets a script
    pub fn is_api(&self) -> bool {
        self.flags.lock().api
    }

    /// Whether script execution must hold the resource lock
    pub fn is_lock_needed(&self) -> bool {
        self.flags.lock().lock_needed
    }

    /// Whether the session was created for this request
    pub fn is_new_session(&self) -> bool {
        self.flags.lock().new_session
    }

    /// Whether a template switch (or abort) was requested
    pub fn is_switched(&self) -> bool {
        self.flags.lock().switched
    }

    /// Whether the session is to be invalidated
    pub fn is_closed(&self) -> bool {
        self.flags.lock().closed
    }

    /// Invalidate the session when the cycle closes
    pub fn close(&self) {
        debug!("Session close requested");
        self.flags.lock().closed = true;
    }

    /// Render `template` if the current render fails
    pub fn switch_to(&self, template: impl Into<String>, params: BTreeMap<String, ScriptValue>) {
        let template = template.into();
        debug!(template = %template, "Template switch requested");
        let mut flags = self.flags.lock();
        flags.switched = true;
        flags.switch_target = Some(SwitchTarget { template, params });
    }

    /// Answer with an empty body if the current render fails
    pub fn abort(&self) {
        debug!("Template abort requested");
        let mut flags = self.flags.lock();
        flags.switched = true;
        flags.switch_target = None;
    }

    /// Pending switch target
    pub fn switch_target(&self) -> Option<SwitchTarget> {
        self.flags.lock().switch_target.clone()
    }

    pub(crate) fn set_lock_needed(&self, needed: bool) {
        self.flags.lock().lock_needed = needed;
    }

    pub(crate) fn set_new_session(&self, new_session: bool) {
        self.flags.lock().new_session = new_session;
    }

    pub(crate) fn set_api(&self, api: bool) {
        self.flags.lock().api = api;
    }

    /// Register the `Context` type on an engine
    pub(crate) fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<ContextHandle>("Context")
            .register_get("isApi", |c: &mut ContextHandle| c.is_api())
            .register_get("isLockNeeded", |c: &mut ContextHandle| c.is_lock_needed())
            .register_get("isNewSession", |c: &mut ContextHandle| c.is_new_session())
            .register_get("isSwitched", |c: &mut ContextHandle| c.is_switched())
            .register_get("isClosed", |c: &mut ContextHandle| c.is_closed())
            .register_get("request", |c: &mut ContextHandle| c.request.clone())
            .register_fn("close", |c: &mut ContextHandle| c.close())
            .register_fn("abort", |c: &mut ContextHandle| c.abort())
            .register_fn("uuid", |_: &mut ContextHandle| uuid::Uuid::new_v4().to_string())
            .register_fn("switch_template", |c: &mut ContextHandle, template: &str| {
                c.switch_to(template, BTreeMap::new())
            })
            .register_fn(
                "switch_template",
                |c: &mut ContextHandle, template: &str, params: Map| {
                    let params = params
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), ScriptValue::from_dynamic(v)))
                        .collect();
                    c.switch_to(template, params)
                },
            )
            .register_fn("to_string", |c: &mut ContextHandle| format!("{c:?}"));
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("flags", &*self.flags.lock())
            .finish()
    }
}

/// Everything a cycle is built from
///
/// Config, request, optional session and free variables are fixed once the
/// cycle starts; only the flags behind [`ContextHandle`] change while it runs.
#[derive(Clone)]
pub struct ServerContext {
    config: Arc<ServerConfig>,
    request: RequestHandle,
    session: Option<Session>,
    variables: BTreeMap<String, ScriptValue>,
    custom_handler: Option<CustomHandler>,
    handle: ContextHandle,
}

impl ServerContext {
    /// Create a context; API requests are recognised by the configured prefix
    pub fn new(config: Arc<ServerConfig>, request: Request) -> Self {
        let api = config.is_api_path(&request.path);
        let request = RequestHandle::new(request);
        let handle = ContextHandle::new(request.clone(), api);
        Self {
            config,
            request,
            session: None,
            variables: BTreeMap::new(),
            custom_handler: None,
            handle,
        }
    }

    /// Attach a session
    pub fn with_session(mut self, session: Session, is_new: bool) -> Self {
        self.handle.set_new_session(is_new);
        self.session = Some(session);
        self
    }

    /// Attach a session if there is one
    pub fn with_optional_session(self, session: Option<(Session, bool)>) -> Self {
        match session {
            Some((session, is_new)) => self.with_session(session, is_new),
            None => self,
        }
    }

    /// Add a free variable
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<ScriptValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Add free variables; later entries win
    pub fn with_variables<I>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (String, ScriptValue)>,
    {
        self.variables.extend(variables);
        self
    }

    /// Answer with `handler` instead of resolving a resource
    ///
    /// The handler's response still carries the session cookie headers.
    pub fn with_custom_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn() -> Response + Send + Sync + 'static,
    {
        self.custom_handler = Some(Arc::new(handler));
        self
    }

    /// Force (or clear) lock-gated execution
    pub fn with_lock(self, needed: bool) -> Self {
        self.handle.set_lock_needed(needed);
        self
    }

    /// Override API classification
    pub fn with_api(self, api: bool) -> Self {
        self.handle.set_api(api);
        self
    }

    /// Server configuration
    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Request handle
    pub fn request(&self) -> &RequestHandle {
        &self.request
    }

    /// Attached session
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Free variables
    pub fn variables(&self) -> &BTreeMap<String, ScriptValue> {
        &self.variables
    }

    /// Custom handler, if any
    pub fn custom_handler(&self) -> Option<&CustomHandler> {
        self.custom_handler.as_ref()
    }

    /// Shared flags
    pub fn handle(&self) -> &ContextHandle {
        &self.handle
    }

    /// Whether the request targets a script
    pub fn is_api(&self) -> bool {
        self.handle.is_api()
    }

    /// Whether the session is to be invalidated
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Whether the session was created for this request
    pub fn is_new_session(&self) -> bool {
        self.handle.is_new_session()
    }

    pub(crate) fn into_parts(self) -> ContextParts {
        ContextParts {
            config: self.config,
            request: self.request,
            session: self.session,
            variables: self.variables,
            custom_handler: self.custom_handler,
            handle: self.handle,
        }
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("request", &self.request.read().to_string())
            .field("session", &self.session.as_ref().map(|s| &s.id))
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("custom_handler", &self.custom_handler.is_some())
            .field("handle", &self.handle)
            .finish()
    }
}

pub(crate) struct ContextParts {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) request: RequestHandle,
    pub(crate) session: Option<Session>,
    pub(crate) variables: BTreeMap<String, ScriptValue>,
    pub(crate) custom_handler: Option<CustomHandler>,
    pub(crate) handle: ContextHandle,
}

/// Session data as a script-visible map
pub(crate) fn session_value(session: &Session) -> ScriptValue {
    ScriptValue::Map(
        session
            .data
            .iter()
            .map(|(k, v)| (k.clone(), ScriptValue::from_json(v)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockingjay_config::Config;
    use serde_json::json;

    fn config() -> Arc<ServerConfig> {
        Arc::new(
            ServerConfig::builder(Config::default())
                .resolver(crate::InMemoryResourceResolver::new())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_api_classification() {
        let config = config();
        assert!(ServerContext::new(config.clone(), Request::new("GET", "/api/cats")).is_api());
        assert!(!ServerContext::new(config.clone(), Request::new("GET", "/cats")).is_api());
        assert!(ServerContext::new(config, Request::new("GET", "/cats"))
            .with_api(true)
            .is_api());
    }

    #[test]
    fn test_switch_and_abort() {
        let handle = ContextHandle::new(RequestHandle::new(Request::new("GET", "/")), false);
        assert!(!handle.is_switched());

        let mut params = BTreeMap::new();
        params.insert("k".to_string(), ScriptValue::from("v"));
        handle.switch_to("T2", params.clone());
        assert!(handle.is_switched());
        assert_eq!(
            handle.switch_target(),
            Some(SwitchTarget {
                template: "T2".to_string(),
                params
            })
        );

        handle.abort();
        assert!(handle.is_switched());
        assert!(handle.switch_target().is_none());
    }

    #[test]
    fn test_session_value() {
        let mut session = Session::new(std::time::Duration::from_secs(60));
        session.data.insert("a".to_string(), json!(1));

        let value = session_value(&session);
        assert_eq!(value.as_map().unwrap()["a"].as_int(), Some(1));
    }

    #[test]
    fn test_context_builders() {
        let session = Session::new(std::time::Duration::from_secs(60));
        let context = ServerContext::new(config(), Request::new("GET", "/api/cats"))
            .with_session(session.clone(), true)
            .with_variable("x", 1_i64)
            .with_lock(true);

        assert_eq!(context.session().map(|s| &s.id), Some(&session.id));
        assert!(context.is_new_session());
        assert!(context.handle().is_lock_needed());
        assert_eq!(context.variables()["x"].as_int(), Some(1));
    }
}
