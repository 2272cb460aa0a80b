//! Engine construction, sandbox limits and the shared AST cache

use crate::api::register_host_api;
use crate::bridge::{BridgeLifetime, ScriptBridge};
use crate::error::Result;
use parking_lot::RwLock;
use rhai::{Engine, AST};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Suffix appended to a candidate path to find its script resource
pub const SCRIPT_EXTENSION: &str = ".rhai";

/// Sandbox limits applied to every engine
///
/// A zero value means "unlimited" for every limit. Operations are unlimited
/// by default: a script that never terminates blocks its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    /// Maximum number of operations per evaluation
    pub max_operations: u64,
    /// Maximum string length
    pub max_string_size: usize,
    /// Maximum array length
    pub max_array_size: usize,
    /// Maximum map size
    pub max_map_size: usize,
    /// Maximum expression nesting depth
    pub max_expr_depth: usize,
    /// Maximum expression nesting depth inside functions
    pub max_function_expr_depth: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_string_size: 1024 * 1024, // 1MB string limit
            max_array_size: 10_000,
            max_map_size: 10_000,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
        }
    }
}

impl ScriptLimits {
    fn apply(&self, engine: &mut Engine) {
        engine.set_max_expr_depths(self.max_expr_depth, self.max_function_expr_depth);
        engine.set_max_operations(self.max_operations);
        engine.set_max_string_size(self.max_string_size);
        engine.set_max_array_size(self.max_array_size);
        engine.set_max_map_size(self.max_map_size);
    }
}

/// Extra registration hook run on every engine a factory builds
pub type Registrar = Arc<dyn Fn(&mut Engine) + Send + Sync>;

/// Builds bridges with a common configuration
///
/// The factory is the lifecycle policy for bridges: [`BridgeFactory::global`]
/// builds the long-lived instance a worker reuses for top-level cycles and
/// [`BridgeFactory::isolated`] builds a throwaway instance for nested
/// dispatch. Both share one AST cache.
#[derive(Clone)]
pub struct BridgeFactory {
    limits: ScriptLimits,
    registrars: Vec<Registrar>,
    cache: Arc<AstCache>,
}

impl BridgeFactory {
    /// Create a factory with the given limits
    pub fn new(limits: ScriptLimits) -> Self {
        Self {
            limits,
            registrars: Vec::new(),
            cache: Arc::new(AstCache::default()),
        }
    }

    /// Add a registration hook (custom types, extra functions)
    pub fn with_registrar<F>(mut self, registrar: F) -> Self
    where
        F: Fn(&mut Engine) + Send + Sync + 'static,
    {
        self.registrars.push(Arc::new(registrar));
        self
    }

    /// Sandbox limits
    pub fn limits(&self) -> ScriptLimits {
        self.limits
    }

    /// Build the shared instance for top-level cycles
    pub fn global(&self) -> ScriptBridge {
        ScriptBridge::new(self.build_engine(), BridgeLifetime::Global, self.cache.clone())
    }

    /// Build a fresh instance for a nested cycle
    pub fn isolated(&self) -> ScriptBridge {
        ScriptBridge::new(self.build_engine(), BridgeLifetime::Isolated, self.cache.clone())
    }

    /// AST cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached AST
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn build_engine(&self) -> Engine {
        let mut engine = Engine::new();
        self.limits.apply(&mut engine);
        register_host_api(&mut engine);
        for registrar in &self.registrars {
            registrar(&mut engine);
        }
        engine
    }
}

impl Default for BridgeFactory {
    fn default() -> Self {
        Self::new(ScriptLimits::default())
    }
}

impl fmt::Debug for BridgeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeFactory")
            .field("limits", &self.limits)
            .field("registrars", &self.registrars.len())
            .field("cache", &self.cache.stats())
            .finish()
    }
}

/// Compiled AST cache keyed by resource name
///
/// Entries remember a hash of their source so an edited script is
/// recompiled instead of served stale.
#[derive(Debug, Default)]
pub(crate) struct AstCache {
    entries: RwLock<HashMap<String, (u64, AST)>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AstCache {
    pub(crate) fn get_or_compile(&self, engine: &Engine, name: &str, source: &str) -> Result<AST> {
        let hash = source_hash(source);

        if let Some((cached_hash, ast)) = self.entries.read().get(name) {
            if *cached_hash == hash {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(script = %name, "AST cache hit");
                return Ok(ast.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(script = %name, "AST cache miss, compiling");

        let ast = engine.compile(source)?;
        self.entries
            .write()
            .insert(name.to_string(), (hash, ast.clone()));

        debug!(script = %name, "Script compiled and cached");
        Ok(ast)
    }

    fn clear(&self) {
        self.entries.write().clear();
        debug!("AST cache cleared");
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            cached_scripts: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn source_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

/// Cache statistics for compiled scripts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of compiled scripts in cache
    pub cached_scripts: usize,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
}

impl CacheStats {
    /// Get cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
