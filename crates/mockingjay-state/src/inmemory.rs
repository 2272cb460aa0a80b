//! In-memory session store implementation

use crate::{Result, SessionStore};
use dashmap::DashMap;
use mockingjay_core::Session;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Entry in the in-memory store
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// In-memory session store
///
/// Sessions are kept as serialized JSON so every `get` hands out an
/// independent copy, the same as a remote store would.
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    store: Arc<DashMap<String, Entry>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Create a new in-memory store
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Remove expired sessions
    pub fn cleanup(&self) {
        let mut removed = 0;
        self.store.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            debug!(removed, "Cleaned up expired sessions");
        }
    }

    /// Get the number of sessions in the store
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &str) -> Result<Option<Session>> {
        trace!(id, "InMemory GET");

        if let Some(entry) = self.store.get(id) {
            if entry.is_expired() {
                drop(entry); // Release read lock
                self.store.remove(id);
                return Ok(None);
            }
            return Ok(Some(serde_json::from_slice(&entry.value)?));
        }

        Ok(None)
    }

    fn create(&self) -> Result<Session> {
        let session = Session::new(self.ttl);
        self.save(&session)?;
        debug!(id = %session.id, "Session created");
        Ok(session)
    }

    fn save(&self, session: &Session) -> Result<()> {
        trace!(id = %session.id, keys = session.data.len(), "InMemory SAVE");

        let mut session = session.clone();
        session.extend(self.ttl);
        let value = serde_json::to_vec(&session)?;
        self.store
            .insert(session.id.clone(), Entry::new(value, self.ttl));

        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        trace!(id, "InMemory DELETE");
        self.store.remove(id);
        Ok(())
    }
}
