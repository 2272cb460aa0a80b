//! Values crossing the host/script boundary

use crate::host::{ForeignObject, HostRef};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use rhai::{Array, Blob, Dynamic, FnPtr, Map};
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

/// A callable produced by evaluating a function or closure expression
///
/// Invoke it through [`crate::ScriptBridge::invoke`] on the bridge that
/// produced it; captured variables travel with the value.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    ptr: FnPtr,
}

impl ScriptFunction {
    /// Wrap a Rhai function pointer
    pub fn new(ptr: FnPtr) -> Self {
        Self { ptr }
    }

    /// Name of the underlying function (anonymous closures get a generated name)
    pub fn name(&self) -> &str {
        self.ptr.fn_name()
    }

    /// Whether the function is an anonymous closure
    pub fn is_anonymous(&self) -> bool {
        self.ptr.is_anonymous()
    }

    pub(crate) fn fn_ptr(&self) -> &FnPtr {
        &self.ptr
    }
}

impl fmt::Display for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ptr)
    }
}

/// Tagged union over every value that can cross the bridge
#[derive(Debug, Clone)]
pub enum ScriptValue {
    /// Absence of a value
    Null,
    /// Boolean
    Bool(bool),
    /// Integer (exact)
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
    /// Ordered sequence
    Array(Vec<ScriptValue>),
    /// Ordered string-keyed mapping
    Map(BTreeMap<String, ScriptValue>),
    /// Callable
    Function(ScriptFunction),
    /// Opaque host reference
    HostRef(HostRef),
    /// Byte buffer, never implicitly decoded
    Bytes(Bytes),
}

impl ScriptValue {
    /// Convert a Rhai value into a host value
    pub fn from_dynamic(value: Dynamic) -> Self {
        let value = value.flatten();

        if value.is_unit() {
            return Self::Null;
        }
        if let Ok(b) = value.as_bool() {
            return Self::Bool(b);
        }
        if let Ok(i) = value.as_int() {
            return Self::Int(i);
        }
        if let Ok(f) = value.as_float() {
            return Self::Float(f);
        }
        if let Ok(c) = value.as_char() {
            return Self::String(c.to_string());
        }
        if value.is_string() {
            return Self::String(value.into_string().unwrap_or_default());
        }
        if value.is_array() {
            let items = value.into_array().unwrap_or_default();
            return Self::Array(items.into_iter().map(Self::from_dynamic).collect());
        }
        if value.is_blob() {
            return Self::Bytes(Bytes::from(value.into_blob().unwrap_or_default()));
        }
        if value.is_map() {
            let map = value.try_cast::<Map>().unwrap_or_default();
            return Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k.to_string(), Self::from_dynamic(v)))
                    .collect(),
            );
        }
        if value.is::<FnPtr>() {
            if let Some(ptr) = value.clone().try_cast::<FnPtr>() {
                return Self::Function(ScriptFunction::new(ptr));
            }
        }
        if value.is::<HostRef>() {
            if let Some(host) = value.clone().try_cast::<HostRef>() {
                return Self::HostRef(host);
            }
        }

        trace!(type_name = value.type_name(), "Wrapping foreign script value");
        Self::HostRef(HostRef::new(ForeignObject::new(value)))
    }

    /// Convert into a Rhai value
    pub fn into_dynamic(self) -> Dynamic {
        match self {
            Self::Null => Dynamic::UNIT,
            Self::Bool(b) => Dynamic::from(b),
            Self::Int(i) => Dynamic::from(i),
            Self::Float(f) => Dynamic::from(f),
            Self::String(s) => Dynamic::from(s),
            Self::Array(items) => {
                let array: Array = items.into_iter().map(Self::into_dynamic).collect();
                Dynamic::from_array(array)
            }
            Self::Map(entries) => {
                let map: Map = entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into_dynamic()))
                    .collect();
                Dynamic::from_map(map)
            }
            Self::Function(f) => Dynamic::from(f.ptr),
            Self::HostRef(host) => host.to_dynamic(),
            Self::Bytes(bytes) => Dynamic::from_blob(Blob::from(bytes.as_ref())),
        }
    }

    /// Convert a JSON value into a host value
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::Array(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into JSON
    ///
    /// Byte buffers become base64 strings; callables and host references
    /// have no JSON form and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null | Self::Function(_) | Self::HostRef(_) => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Bytes(bytes) => {
                serde_json::Value::String(general_purpose::STANDARD.encode(bytes))
            }
        }
    }

    /// Name of the variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Float(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Function(_) => "function",
            Self::HostRef(_) => "host",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this value is a plain mapping (host references are not)
    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// Whether this value is a sequence
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Whether this value can be invoked
    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    /// Truthiness: `true` only for the boolean `true`
    pub fn is_true(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// Integer value, if this is an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// String slice, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Mapping entries, if this is a mapping
    pub fn as_map(&self) -> Option<&BTreeMap<String, ScriptValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Sequence items, if this is a sequence
    pub fn as_array(&self) -> Option<&[ScriptValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.name() == b.name(),
            (Self::HostRef(a), Self::HostRef(b)) => a.ptr_eq(b),
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Function(func) => write!(f, "{func}"),
            Self::HostRef(host) => write!(f, "{host}"),
            Self::Bytes(bytes) => write!(f, "[{} bytes]", bytes.len()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ScriptValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for ScriptValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Bytes> for ScriptValue {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<HostRef> for ScriptValue {
    fn from(host: HostRef) -> Self {
        Self::HostRef(host)
    }
}

impl<V: Into<ScriptValue>> From<Vec<V>> for ScriptValue {
    fn from(items: Vec<V>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<ScriptValue>> From<BTreeMap<String, V>> for ScriptValue {
    fn from(entries: BTreeMap<String, V>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<Dynamic> for ScriptValue {
    fn from(value: Dynamic) -> Self {
        Self::from_dynamic(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_large_integers_are_exact() {
        let big = i64::MAX - 1;
        let back = ScriptValue::from_dynamic(ScriptValue::Int(big).into_dynamic());
        assert_eq!(back, ScriptValue::Int(big));
    }

    #[test]
    fn test_json_conversion() {
        let value = ScriptValue::from_json(&json!({
            "name": "Billie",
            "age": 3,
            "weight": 4.5,
            "tags": ["a", "b"],
            "owner": null
        }));

        let map = value.as_map().unwrap();
        assert_eq!(map["age"], ScriptValue::Int(3));
        assert_eq!(map["weight"], ScriptValue::Float(4.5));
        assert_eq!(map["owner"], ScriptValue::Null);
        assert_eq!(value.to_json()["tags"], json!(["a", "b"]));
    }

    #[test]
    fn test_bytes_stay_opaque() {
        let bytes = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
        let dynamic = ScriptValue::Bytes(bytes.clone()).into_dynamic();
        assert!(dynamic.is_blob());
        assert_eq!(ScriptValue::from_dynamic(dynamic), ScriptValue::Bytes(bytes));
    }

    #[test]
    fn test_map_is_not_host_ref() {
        let value = ScriptValue::from_dynamic(Dynamic::from_map(Map::new()));
        assert!(value.is_map());
        assert_eq!(value.type_name(), "map");
    }
}
