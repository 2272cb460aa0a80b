//! # Mockingjay Core
//!
//! Core types and error handling for the Mockingjay mock server.
//!
//! This crate provides the values that flow through a request cycle:
//! - [`Request`] as seen by mock scripts
//! - [`Response`] as mutated by mock scripts
//! - [`Session`] data reconciled with a session store
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;
pub mod request;
pub mod response;
pub mod session;

pub use error::{Error, Result};
pub use request::Request;
pub use response::{body_bytes, responses, Body, HttpResponse, Response};
pub use session::Session;

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Method, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::request::Request;
    pub use crate::response::{Body, HttpResponse, Response};
    pub use crate::session::Session;
}
