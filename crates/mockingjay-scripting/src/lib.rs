//! # Mockingjay Scripting
//!
//! The boundary between host code and the embedded Rhai runtime that runs
//! mock scripts.
//!
//! ## Features
//!
//! - Explicit [`ScriptValue`] tagged union with converters in both directions
//! - Host objects exposed through [`HostRef`] with an allow-list of members
//! - Typed `request` / `response` handles shared with the host
//! - Callables returned from scripts can be invoked from Rust
//! - Shared "global" bridges and isolated per-dispatch bridges
//! - AST caching for named script resources
//! - Sandbox limits

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod api;
pub mod bridge;
pub mod engine;
pub mod error;
pub mod host;
pub mod value;

pub use api::{RequestHandle, ResponseHandle};
pub use bridge::{BridgeLifetime, ScriptBridge};
pub use engine::{BridgeFactory, CacheStats, ScriptLimits, SCRIPT_EXTENSION};
pub use error::{Result, ScriptError};
pub use host::{HostObject, HostRef, MemberObject};
pub use value::{ScriptFunction, ScriptValue};

/// Re-export of the embedded runtime for custom type registration
pub use rhai;

/// Prelude with commonly used types
pub mod prelude {
    pub use crate::api::{RequestHandle, ResponseHandle};
    pub use crate::bridge::{BridgeLifetime, ScriptBridge};
    pub use crate::engine::{BridgeFactory, ScriptLimits};
    pub use crate::error::{Result, ScriptError};
    pub use crate::host::{HostObject, HostRef, MemberObject};
    pub use crate::value::{ScriptFunction, ScriptValue};
}
