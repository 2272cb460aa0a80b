//! Opaque host references exposed to scripts

use crate::value::ScriptValue;
use rhai::{Dynamic, Engine, EvalAltResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A host object that scripts may read from
///
/// Only the names returned by [`HostObject::members`] are reachable from
/// scripts; everything else on the Rust side stays private.
pub trait HostObject: Send + Sync + fmt::Debug {
    /// Type name shown to scripts
    fn type_name(&self) -> &str;

    /// Members scripts are allowed to read
    fn members(&self) -> Vec<String>;

    /// Read an allowed member
    fn get(&self, member: &str) -> Option<ScriptValue>;

    /// Native Rhai representation, for objects backed by a registered type
    fn to_dynamic(&self) -> Option<Dynamic> {
        None
    }
}

/// Shared, cheaply clonable reference to a [`HostObject`]
#[derive(Clone)]
pub struct HostRef(Arc<dyn HostObject>);

impl HostRef {
    /// Wrap a host object
    pub fn new<T: HostObject + 'static>(object: T) -> Self {
        Self(Arc::new(object))
    }

    /// Type name of the wrapped object
    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    /// Read an allowed member
    pub fn get(&self, member: &str) -> Option<ScriptValue> {
        self.0.get(member)
    }

    /// Allowed member names
    pub fn members(&self) -> Vec<String> {
        self.0.members()
    }

    /// Whether two references point at the same object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn to_dynamic(&self) -> Dynamic {
        self.0
            .to_dynamic()
            .unwrap_or_else(|| Dynamic::from(self.clone()))
    }

    /// Register the script-side accessors for host references
    pub(crate) fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<HostRef>("HostRef")
            .register_indexer_get(
                |host: &mut HostRef, member: &str| -> Result<Dynamic, Box<EvalAltResult>> {
                    host.get(member)
                        .map(ScriptValue::into_dynamic)
                        .ok_or_else(|| {
                            format!("'{}' has no member '{}'", host.type_name(), member).into()
                        })
                },
            )
            .register_fn("members", |host: &mut HostRef| -> rhai::Array {
                host.members().into_iter().map(Dynamic::from).collect()
            })
            .register_fn("to_string", |host: &mut HostRef| host.to_string());
    }
}

impl fmt::Debug for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostRef").field(&self.0).finish()
    }
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[host {}]", self.type_name())
    }
}

/// Host object built from an explicit allow-list of members
#[derive(Debug, Clone)]
pub struct MemberObject {
    type_name: String,
    members: BTreeMap<String, ScriptValue>,
}

impl MemberObject {
    /// Start an object with no members
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            members: BTreeMap::new(),
        }
    }

    /// Expose a member
    pub fn member(mut self, name: impl Into<String>, value: impl Into<ScriptValue>) -> Self {
        self.members.insert(name.into(), value.into());
        self
    }

    /// Finish and wrap as a [`HostRef`]
    pub fn into_ref(self) -> HostRef {
        HostRef::new(self)
    }
}

impl HostObject for MemberObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn members(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    fn get(&self, member: &str) -> Option<ScriptValue> {
        self.members.get(member).cloned()
    }
}

/// Script value of a registered type the host has no converter for
#[derive(Debug)]
pub(crate) struct ForeignObject {
    value: Dynamic,
}

impl ForeignObject {
    pub(crate) fn new(value: Dynamic) -> Self {
        Self { value }
    }
}

impl HostObject for ForeignObject {
    fn type_name(&self) -> &str {
        self.value.type_name()
    }

    fn members(&self) -> Vec<String> {
        Vec::new()
    }

    fn get(&self, _member: &str) -> Option<ScriptValue> {
        None
    }

    fn to_dynamic(&self) -> Option<Dynamic> {
        Some(self.value.clone())
    }
}
