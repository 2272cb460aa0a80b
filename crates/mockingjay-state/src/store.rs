//! Session store trait definition

use crate::Result;
use mockingjay_core::Session;
use std::fmt;

/// Session store trait
///
/// Calls are synchronous and never retried by the caller. Concurrent
/// writers to the same session ID are last-write-wins.
pub trait SessionStore: Send + Sync + fmt::Debug {
    /// Get a session by ID
    ///
    /// Returns `None` if the session doesn't exist or has expired.
    fn get(&self, id: &str) -> Result<Option<Session>>;

    /// Create and persist a new, empty session
    fn create(&self) -> Result<Session>;

    /// Persist a session, replacing any previous copy
    fn save(&self, session: &Session) -> Result<()>;

    /// Delete a session
    ///
    /// Returns Ok(()) whether the session existed or not.
    fn delete(&self, id: &str) -> Result<()>;

    /// Check if a session exists
    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.get(id)?.is_some())
    }
}
