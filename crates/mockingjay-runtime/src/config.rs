//! Shared server configuration used by every request cycle

use crate::context::ContextHandle;
use crate::error::Result;
use crate::lock::LockRegistry;
use crate::registry::CycleRegistry;
use crate::resource::{FileResourceResolver, ResourceResolver};
use crate::template::{FileTemplateEngine, TemplateEngine};
use mockingjay_config::{Config, ScriptingConfig};
use mockingjay_scripting::rhai::Engine;
use mockingjay_scripting::{BridgeFactory, ScriptLimits, ScriptValue};
use mockingjay_state::{InMemorySessionStore, SessionStore};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Server configuration
///
/// Built once and shared (`Arc`) by every worker and every cycle, including
/// nested ones.
pub struct ServerConfig {
    settings: Config,
    resolver: Arc<dyn ResourceResolver>,
    templates: Arc<dyn TemplateEngine>,
    sessions: Arc<dyn SessionStore>,
    scripts: RwLock<HashSet<String>>,
    locks: LockRegistry,
    cycles: CycleRegistry,
    bridges: BridgeFactory,
}

impl ServerConfig {
    /// Create a builder from loaded settings
    pub fn builder(settings: Config) -> ServerConfigBuilder {
        ServerConfigBuilder::new(settings)
    }

    /// Loaded settings
    pub fn settings(&self) -> &Config {
        &self.settings
    }

    /// Resource resolver
    pub fn resolver(&self) -> &dyn ResourceResolver {
        self.resolver.as_ref()
    }

    /// Template engine
    pub fn templates(&self) -> &dyn TemplateEngine {
        self.templates.as_ref()
    }

    /// Session store
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    /// Execution locks
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Active cycle registry
    pub fn cycles(&self) -> &CycleRegistry {
        &self.cycles
    }

    /// Bridge factory
    pub fn bridges(&self) -> &BridgeFactory {
        &self.bridges
    }

    /// Script extension including the leading dot, e.g. `.rhai`
    pub fn script_extension(&self) -> String {
        format!(".{}", self.settings.server.script_extension)
    }

    /// Whether `path` names a registered script
    pub fn is_script(&self, path: &str) -> bool {
        self.scripts.read().contains(path)
    }

    /// Registered scripts, sorted
    pub fn scripts(&self) -> Vec<String> {
        let mut scripts: Vec<String> = self.scripts.read().iter().cloned().collect();
        scripts.sort();
        scripts
    }

    /// Re-scan the resolver for scripts, returning how many were found
    pub fn rescan(&self) -> Result<usize> {
        let found = self.resolver.list_scripts(&self.script_extension())?;
        let count = found.len();
        *self.scripts.write() = found.into_iter().collect();
        debug!(count, "Registered scripts refreshed");
        Ok(count)
    }

    /// Whether a request path is handled by scripts
    pub fn is_api_path(&self, path: &str) -> bool {
        path.trim_start_matches('/')
            .starts_with(self.settings.server.api_prefix.as_str())
    }

    /// Whether a resource is configured to run under its lock
    pub fn is_non_reentrant(&self, resource: &str) -> bool {
        let locking = &self.settings.locking;
        locking.serialize_all || locking.non_reentrant.iter().any(|r| r == resource)
    }

    /// Configured free variables
    pub fn variables(&self) -> BTreeMap<String, ScriptValue> {
        self.settings
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), ScriptValue::from_json(v)))
            .collect()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("settings", &self.settings)
            .field("resolver", &self.resolver)
            .field("sessions", &self.sessions)
            .field("scripts", &self.scripts.read().len())
            .field("bridges", &self.bridges)
            .finish()
    }
}

/// Builder for [`ServerConfig`]
///
/// Anything not set explicitly is derived from the settings: files under
/// `server.root`, verbatim HTML templates and an in-memory session store.
pub struct ServerConfigBuilder {
    settings: Config,
    resolver: Option<Arc<dyn ResourceResolver>>,
    templates: Option<Arc<dyn TemplateEngine>>,
    sessions: Option<Arc<dyn SessionStore>>,
    registrars: Vec<Arc<dyn Fn(&mut Engine) + Send + Sync>>,
}

impl ServerConfigBuilder {
    /// Create a builder
    pub fn new(settings: Config) -> Self {
        Self {
            settings,
            resolver: None,
            templates: None,
            sessions: None,
            registrars: Vec::new(),
        }
    }

    /// Set the resource resolver
    pub fn resolver(mut self, resolver: impl ResourceResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Set the template engine
    pub fn templates(mut self, templates: impl TemplateEngine + 'static) -> Self {
        self.templates = Some(Arc::new(templates));
        self
    }

    /// Set the session store
    pub fn sessions(mut self, sessions: impl SessionStore + 'static) -> Self {
        self.sessions = Some(Arc::new(sessions));
        self
    }

    /// Set a shared session store
    pub fn shared_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Register extra script types or functions
    pub fn register<F>(mut self, registrar: F) -> Self
    where
        F: Fn(&mut Engine) + Send + Sync + 'static,
    {
        self.registrars.push(Arc::new(registrar));
        self
    }

    /// Validate settings and build
    pub fn build(self) -> Result<ServerConfig> {
        mockingjay_config::validate_config(&self.settings)?;

        let server = &self.settings.server;
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(FileResourceResolver::new(&server.root)));
        let templates = self.templates.unwrap_or_else(|| {
            Arc::new(FileTemplateEngine::new(
                &server.root,
                &server.template_extension,
            ))
        });
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(InMemorySessionStore::new(self.settings.session.ttl)));

        let mut bridges = BridgeFactory::new(limits(&self.settings.scripting))
            .with_registrar(ContextHandle::register);
        for registrar in self.registrars {
            bridges = bridges.with_registrar(move |engine| registrar(engine));
        }

        let config = ServerConfig {
            settings: self.settings,
            resolver,
            templates,
            sessions,
            scripts: RwLock::new(HashSet::new()),
            locks: LockRegistry::new(),
            cycles: CycleRegistry::new(),
            bridges,
        };
        let count = config.rescan()?;
        info!(
            root = %config.settings.server.root.display(),
            scripts = count,
            "Server configuration ready"
        );

        Ok(config)
    }
}

impl fmt::Debug for ServerConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfigBuilder")
            .field("settings", &self.settings)
            .field("registrars", &self.registrars.len())
            .finish()
    }
}

fn limits(scripting: &ScriptingConfig) -> ScriptLimits {
    ScriptLimits {
        max_operations: scripting.max_operations,
        max_string_size: scripting.max_string_size,
        max_array_size: scripting.max_array_size,
        max_map_size: scripting.max_map_size,
        max_expr_depth: scripting.max_expr_depth,
        max_function_expr_depth: scripting.max_function_expr_depth,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::InMemoryResourceResolver;
    use mockingjay_config::ConfigBuilder;

    #[test]
    fn test_defaults_from_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("api")).unwrap();
        std::fs::write(dir.path().join("api/cats.rhai"), "1").unwrap();

        let settings = ConfigBuilder::new().root(dir.path()).build().unwrap();
        let config = ServerConfig::builder(settings).build().unwrap();

        assert_eq!(config.script_extension(), ".rhai");
        assert!(config.is_script("api/cats.rhai"));
        assert_eq!(config.scripts(), vec!["api/cats.rhai"]);
    }

    #[test]
    fn test_rescan_picks_up_new_scripts() {
        let resolver = InMemoryResourceResolver::new().with("api/cats.rhai", "1");
        let config = ServerConfig::builder(Config::default())
            .resolver(resolver.clone())
            .build()
            .unwrap();
        assert!(!config.is_script("api/dogs.rhai"));

        resolver.insert("api/dogs.rhai", "2");
        assert_eq!(config.rescan().unwrap(), 2);
        assert!(config.is_script("api/dogs.rhai"));
    }

    #[test]
    fn test_api_and_locking() {
        let settings = ConfigBuilder::new()
            .non_reentrant("api/counter.rhai")
            .build()
            .unwrap();
        let config = ServerConfig::builder(settings)
            .resolver(InMemoryResourceResolver::new())
            .build()
            .unwrap();

        assert!(config.is_api_path("/api/cats"));
        assert!(config.is_api_path("api/cats"));
        assert!(!config.is_api_path("/cats"));
        assert!(config.is_non_reentrant("api/counter.rhai"));
        assert!(!config.is_non_reentrant("api/cats.rhai"));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut settings = Config::default();
        settings.server.script_extension = String::new();
        assert!(ServerConfig::builder(settings).build().is_err());
    }

    #[test]
    fn test_variables() {
        let settings = ConfigBuilder::new()
            .variable("greeting", serde_json::json!("hello"))
            .build()
            .unwrap();
        let config = ServerConfig::builder(settings)
            .resolver(InMemoryResourceResolver::new())
            .build()
            .unwrap();

        assert_eq!(config.variables()["greeting"].as_str(), Some("hello"));
    }
}
