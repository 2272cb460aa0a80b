//! Thread-affine record of the cycle currently running on each thread

use dashmap::DashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;
use tracing::trace;
use uuid::Uuid;

/// Cycle running on a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCycle {
    /// Unique cycle ID
    pub id: Uuid,
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
    /// Whether the cycle was created by copying another
    pub nested: bool,
    /// When the cycle entered its handling phase
    pub started: Instant,
}

impl ActiveCycle {
    /// Describe a cycle about to start
    pub fn new(method: impl Into<String>, path: impl Into<String>, nested: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: method.into(),
            path: path.into(),
            nested,
            started: Instant::now(),
        }
    }
}

/// Registry of active cycles keyed by thread
///
/// Entering a cycle installs it as the current cycle of the calling thread and
/// returns a guard; dropping the guard restores whatever was current before,
/// so a nested cycle hands the slot back to its parent.
#[derive(Debug, Clone, Default)]
pub struct CycleRegistry {
    active: Arc<DashMap<ThreadId, ActiveCycle>>,
}

impl CycleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycle currently active on the calling thread
    pub fn current(&self) -> Option<ActiveCycle> {
        self.active
            .get(&thread::current().id())
            .map(|entry| entry.value().clone())
    }

    /// Install a cycle as current for the calling thread
    pub fn enter(&self, cycle: ActiveCycle) -> CycleGuard {
        let thread = thread::current().id();
        trace!(id = %cycle.id, ?thread, "Entering cycle");
        let previous = self.active.insert(thread, cycle);
        CycleGuard {
            registry: self.clone(),
            thread,
            previous,
        }
    }

    /// Number of threads with an active cycle
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no thread has an active cycle
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Releases a thread's cycle slot on drop
#[derive(Debug)]
#[must_use = "the cycle is released as soon as the guard is dropped"]
pub struct CycleGuard {
    registry: CycleRegistry,
    thread: ThreadId,
    previous: Option<ActiveCycle>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                self.registry.active.insert(self.thread, previous);
            }
            None => {
                self.registry.active.remove(&self.thread);
            }
        }
        trace!(thread = ?self.thread, "Released cycle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_and_release() {
        let registry = CycleRegistry::new();
        assert!(registry.current().is_none());

        {
            let _guard = registry.enter(ActiveCycle::new("GET", "api/cats", false));
            let current = registry.current().unwrap();
            assert_eq!(current.path, "api/cats");
            assert!(!current.nested);
        }

        assert!(registry.current().is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_nested_restores_parent() {
        let registry = CycleRegistry::new();
        let _outer = registry.enter(ActiveCycle::new("GET", "index", false));
        let outer_id = registry.current().unwrap().id;

        {
            let _inner = registry.enter(ActiveCycle::new("POST", "api/cats", true));
            assert!(registry.current().unwrap().nested);
        }

        assert_eq!(registry.current().unwrap().id, outer_id);
    }

    #[test]
    fn test_threads_are_independent() {
        let registry = CycleRegistry::new();
        let _guard = registry.enter(ActiveCycle::new("GET", "index", false));

        let other = registry.clone();
        let seen = std::thread::spawn(move || other.current())
            .join()
            .unwrap();
        assert!(seen.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_released_on_panic() {
        let registry = CycleRegistry::new();
        let inner = registry.clone();

        let result = std::thread::spawn(move || {
            let _guard = inner.enter(ActiveCycle::new("GET", "api/boom", false));
            panic!("script host panicked");
        })
        .join();

        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
