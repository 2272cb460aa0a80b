//! Session data shared between a store and a request cycle

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Session data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID
    pub id: String,
    /// Session creation time
    pub created_at: SystemTime,
    /// Session expiration time
    pub expires_at: SystemTime,
    /// Session data
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Session {
    /// Create a new session with a random ID
    pub fn new(ttl: Duration) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), ttl)
    }

    /// Create a new session with a known ID
    pub fn with_id(id: impl Into<String>, ttl: Duration) -> Self {
        let now = SystemTime::now();
        Self {
            id: id.into(),
            created_at: now,
            expires_at: now + ttl,
            data: BTreeMap::new(),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        SystemTime::now() > self.expires_at
    }

    /// Extend session expiration
    pub fn extend(&mut self, ttl: Duration) {
        self.expires_at = SystemTime::now() + ttl;
    }

    /// Merge entries into the session data; incoming keys win
    pub fn merge<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        self.data.extend(entries);
    }
}
