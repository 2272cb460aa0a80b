//! Host API registered into every bridge
//!
//! `request` and `response` are registered types backed by shared handles, so
//! the request cycle observes script mutations without copying values back
//! out of the scope.

use crate::host::HostRef;
use crate::value::ScriptValue;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use mockingjay_core::{Request, Response};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rhai::{Array, Dynamic, Engine, EvalAltResult, FuncRegistration, Map};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared request handle bound as `request`
#[derive(Debug, Clone)]
pub struct RequestHandle(Arc<RwLock<Request>>);

impl RequestHandle {
    /// Wrap a request
    pub fn new(request: Request) -> Self {
        Self(Arc::new(RwLock::new(request)))
    }

    /// Read access
    pub fn read(&self) -> RwLockReadGuard<'_, Request> {
        self.0.read()
    }

    /// Write access
    pub fn write(&self) -> RwLockWriteGuard<'_, Request> {
        self.0.write()
    }

    /// Copy of the current request state
    pub fn snapshot(&self) -> Request {
        self.0.read().clone()
    }

    fn body_value(&self) -> ScriptValue {
        let request = self.read();
        if let Some(value) = &request.body_value {
            return ScriptValue::from_json(value);
        }
        match &request.body {
            Some(body) => match std::str::from_utf8(body) {
                Ok(text) => ScriptValue::String(text.to_string()),
                Err(_) => ScriptValue::Bytes(body.clone()),
            },
            None => ScriptValue::Null,
        }
    }

    fn params_value(&self) -> ScriptValue {
        let request = self.read();
        ScriptValue::Map(
            request
                .params
                .iter()
                .map(|(k, values)| (k.clone(), ScriptValue::from(values.clone())))
                .collect(),
        )
    }

    fn headers_value(&self) -> ScriptValue {
        let request = self.read();
        ScriptValue::Map(
            request
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), ScriptValue::from(v.clone())))
                .collect(),
        )
    }

    fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<RequestHandle>("Request")
            .register_get("method", |r: &mut RequestHandle| r.read().method.clone())
            .register_get("path", |r: &mut RequestHandle| r.read().path.clone())
            .register_get("params", |r: &mut RequestHandle| {
                r.params_value().into_dynamic()
            })
            .register_get("headers", |r: &mut RequestHandle| {
                r.headers_value().into_dynamic()
            })
            .register_get("pathParams", |r: &mut RequestHandle| -> Array {
                r.read()
                    .path_params
                    .iter()
                    .cloned()
                    .map(Dynamic::from)
                    .collect()
            })
            .register_get("pathParam", |r: &mut RequestHandle| {
                r.read()
                    .path_param
                    .clone()
                    .map(Dynamic::from)
                    .unwrap_or(Dynamic::UNIT)
            })
            .register_get("body", |r: &mut RequestHandle| r.body_value().into_dynamic())
            .register_get("bodyBytes", |r: &mut RequestHandle| {
                ScriptValue::Bytes(r.read().body.clone().unwrap_or_default()).into_dynamic()
            })
            .register_fn("param", |r: &mut RequestHandle, name: &str| {
                r.read()
                    .param(name)
                    .map(|v| Dynamic::from(v.to_string()))
                    .unwrap_or(Dynamic::UNIT)
            })
            .register_fn("header", |r: &mut RequestHandle, name: &str| {
                r.read()
                    .header(name)
                    .map(|v| Dynamic::from(v.to_string()))
                    .unwrap_or(Dynamic::UNIT)
            })
            .register_fn("to_string", |r: &mut RequestHandle| r.read().to_string());
    }
}

/// Shared response handle bound as `response`
#[derive(Debug, Clone)]
pub struct ResponseHandle(Arc<RwLock<Response>>);

impl ResponseHandle {
    /// Wrap a response
    pub fn new(response: Response) -> Self {
        Self(Arc::new(RwLock::new(response)))
    }

    /// Read access
    pub fn read(&self) -> RwLockReadGuard<'_, Response> {
        self.0.read()
    }

    /// Write access
    pub fn write(&self) -> RwLockWriteGuard<'_, Response> {
        self.0.write()
    }

    /// Copy of the current response state
    pub fn snapshot(&self) -> Response {
        self.0.read().clone()
    }

    /// Set the status code
    pub fn set_status(&self, status: u16) {
        self.write().status = status;
    }

    /// Set the body from a script value
    ///
    /// Maps and arrays are serialized to JSON, strings are stored as text and
    /// byte buffers are stored raw.
    pub fn set_body(&self, value: ScriptValue) {
        let mut response = self.write();
        match value {
            ScriptValue::Null => response.body = None,
            ScriptValue::Bytes(bytes) => response.body = Some(bytes),
            ScriptValue::String(text) => {
                if !response.has_content_type() {
                    response.set_header("Content-Type", "text/plain; charset=utf-8");
                }
                response.body = Some(Bytes::from(text));
            }
            value @ (ScriptValue::Map(_) | ScriptValue::Array(_)) => {
                response.body = Some(Bytes::from(value.to_json().to_string()));
                if !response.has_content_type() {
                    response.set_header("Content-Type", "application/json");
                }
            }
            other => response.body = Some(Bytes::from(other.to_string())),
        }
    }

    fn body_value(&self) -> ScriptValue {
        let response = self.read();
        let Some(body) = &response.body else {
            return ScriptValue::Null;
        };
        let is_json = response
            .header("content-type")
            .is_some_and(|ct| ct.contains("json"));
        if is_json {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
                return ScriptValue::from_json(&value);
            }
        }
        match std::str::from_utf8(body) {
            Ok(text) => ScriptValue::String(text.to_string()),
            Err(_) => ScriptValue::Bytes(body.clone()),
        }
    }

    fn headers_value(&self) -> ScriptValue {
        let response = self.read();
        ScriptValue::Map(
            response
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), ScriptValue::from(v.clone())))
                .collect(),
        )
    }

    fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<ResponseHandle>("Response")
            .register_get("status", |r: &mut ResponseHandle| r.read().status as i64)
            .register_get("body", |r: &mut ResponseHandle| r.body_value().into_dynamic())
            .register_get("headers", |r: &mut ResponseHandle| {
                r.headers_value().into_dynamic()
            })
            .register_fn("header", |r: &mut ResponseHandle, name: &str, value: Dynamic| {
                let value = ScriptValue::from_dynamic(value).to_string();
                r.write().set_header(name, value);
            })
            .register_fn("to_string", |r: &mut ResponseHandle| {
                format!("Response({})", r.read().status)
            });

        // setters write through the shared handle, so they stay usable on the
        // constant `response` binding
        FuncRegistration::new_setter("status").with_purity(true).register_into_engine(
            engine,
            |r: &mut ResponseHandle, status: i64| -> Result<(), Box<EvalAltResult>> {
                let status =
                    u16::try_from(status).map_err(|_| format!("invalid status code: {status}"))?;
                r.set_status(status);
                Ok(())
            },
        );
        FuncRegistration::new_setter("body").with_purity(true).register_into_engine(
            engine,
            |r: &mut ResponseHandle, body: Dynamic| {
                r.set_body(ScriptValue::from_dynamic(body));
            },
        );
        FuncRegistration::new_setter("headers").with_purity(true).register_into_engine(
            engine,
            |r: &mut ResponseHandle, headers: Map| {
                let mut response = r.write();
                response.headers = headers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), ScriptValue::from_dynamic(v).to_string()))
                    .collect();
            },
        );
    }
}

/// Register the host API on a fresh engine
pub(crate) fn register_host_api(engine: &mut Engine) {
    HostRef::register(engine);
    RequestHandle::register(engine);
    ResponseHandle::register(engine);
    register_functions(engine);
}

/// Register utility functions available to every mock script
fn register_functions(engine: &mut Engine) {
    // JSON
    engine.register_fn("to_json", |value: Dynamic| -> String {
        ScriptValue::from_dynamic(value).to_json().to_string()
    });

    engine.register_fn(
        "parse_json",
        |s: &str| -> Result<Dynamic, Box<EvalAltResult>> {
            let value: serde_json::Value =
                serde_json::from_str(s).map_err(|e| format!("invalid JSON: {e}"))?;
            Ok(ScriptValue::from_json(&value).into_dynamic())
        },
    );

    // String utilities
    engine.register_fn("base64_encode", |s: &str| -> String {
        general_purpose::STANDARD.encode(s.as_bytes())
    });

    engine.register_fn("base64_decode", |s: &str| -> String {
        general_purpose::STANDARD
            .decode(s.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default()
    });

    // Utility functions
    engine.register_fn("unix_time", || -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    });

    engine.register_fn("uuid", || -> String { uuid::Uuid::new_v4().to_string() });

    // Logging (for debugging scripts)
    engine.register_fn("log_debug", |msg: &str| {
        debug!(script_log = msg);
    });

    engine.register_fn("log_info", |msg: &str| {
        info!(script_log = msg);
    });

    engine.register_fn("log_warn", |msg: &str| {
        warn!(script_log = msg);
    });
}
