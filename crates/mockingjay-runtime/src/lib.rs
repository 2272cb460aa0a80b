//! # Mockingjay Runtime
//!
//! The request lifecycle of the mock server:
//! - Resolution of request paths to scripts, with ancestor fallback
//! - Script execution, optionally serialized per resource
//! - Template rendering with switch/abort recovery
//! - Session reconciliation and guaranteed cleanup
//! - Nested cycles on isolated script bridges
//!
//! Everything is synchronous: a cycle runs to completion on the thread that
//! handles it, and a worker owns one [`Dispatcher`].
//!
//! ## Example
//!
//! ```rust
//! use mockingjay_config::Config;
//! use mockingjay_core::Request;
//! use mockingjay_runtime::{Dispatcher, InMemoryResourceResolver, ServerConfig};
//! use std::sync::Arc;
//!
//! let resolver = InMemoryResourceResolver::new()
//!     .with("api/cats.rhai", "response.status = 201; response.body = #{ name: \"Billie\" };");
//! let config = ServerConfig::builder(Config::default())
//!     .resolver(resolver)
//!     .build()
//!     .unwrap();
//!
//! let mut dispatcher = Dispatcher::new(Arc::new(config));
//! let response = dispatcher.handle(Request::new("POST", "/api/cats"));
//! assert_eq!(response.status(), 201);
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod config;
pub mod context;
pub mod cycle;
pub mod dispatcher;
pub mod error;
pub mod lock;
pub mod registry;
pub mod resource;
pub mod response;
pub mod template;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use context::{ContextHandle, CustomHandler, ServerContext, SwitchTarget};
pub use cycle::{resolve_resource, RequestCycle, Resolution, CONTEXT, REQUEST, RESPONSE, SESSION};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use lock::LockRegistry;
pub use registry::{ActiveCycle, CycleGuard, CycleRegistry};
pub use resource::{FileResourceResolver, InMemoryResourceResolver, Resource, ResourceResolver};
pub use response::ResponseBuilder;
pub use template::{FileTemplateEngine, TemplateEngine};

/// Phase of a request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Bindings in place, not yet handling
    Initialized,
    /// Mapping the path to a script
    Resolving,
    /// Running a script
    Executing,
    /// Rendering a template
    Rendering,
    /// Rendering a switch target after a failed render
    Switched,
    /// Assembling the response
    Building,
    /// Handling failed, answered with 500
    Failed,
    /// Session reconciled, cycle finished
    Closed,
}

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ServerConfig, ServerConfigBuilder};
    pub use crate::context::{ContextHandle, ServerContext};
    pub use crate::cycle::RequestCycle;
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{Error, Result};
    pub use crate::CyclePhase;
}
