//! Execution locks for non-reentrant script resources

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Mutual-exclusion locks keyed by resource identity
///
/// Requests for the same key run one at a time; requests for other keys are
/// never blocked by it.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock for a key, created on first use
    pub fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(key) {
            return lock.clone();
        }
        trace!(key, "Creating execution lock");
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Number of keys that have been locked at least once
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no lock has been created yet
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_lock() {
        let registry = LockRegistry::new();
        let a = registry.lock_for("api/counter.rhai");
        let b = registry.lock_for("api/counter.rhai");
        let c = registry.lock_for("api/cats.rhai");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_other_keys_not_blocked() {
        let registry = LockRegistry::new();
        let counter = registry.lock_for("api/counter.rhai");
        let _held = counter.lock();

        let cats = registry.lock_for("api/cats.rhai");
        assert!(cats.try_lock().is_some());
        assert!(counter.try_lock().is_none());
    }
}
