//! # Mockingjay State
//!
//! Session storage for mock servers.
//!
//! A request cycle works on a copy of the session bound into the script
//! environment; the store holds the authoritative copy and receives a
//! `save` or `delete` when the cycle closes.
//!
//! ## Example
//!
//! ```rust
//! use mockingjay_state::{InMemorySessionStore, SessionStore};
//! use std::time::Duration;
//!
//! fn main() -> mockingjay_state::Result<()> {
//!     let store = InMemorySessionStore::new(Duration::from_secs(600));
//!
//!     let mut session = store.create()?;
//!     session.data.insert("user".to_string(), serde_json::json!("john"));
//!     store.save(&session)?;
//!
//!     let loaded = store.get(&session.id)?;
//!     assert!(loaded.is_some());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

mod error;
mod inmemory;
mod store;

pub use error::{Error, Result};
pub use inmemory::InMemorySessionStore;
pub use store::SessionStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::inmemory::InMemorySessionStore;
    pub use crate::store::SessionStore;
}
