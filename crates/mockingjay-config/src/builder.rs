//! Configuration builder

use crate::types::Config;
use mockingjay_core::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mock directory
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.server.root = root.into();
        self
    }

    /// Set the API path prefix
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.server.api_prefix = prefix.into();
        self
    }

    /// Set the session time to live
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session.ttl = ttl;
        self
    }

    /// Create sessions for requests without one
    pub fn auto_create_session(mut self, enabled: bool) -> Self {
        self.config.session.auto_create = enabled;
        self
    }

    /// Mark a script resource as non-reentrant
    pub fn non_reentrant(mut self, resource: impl Into<String>) -> Self {
        self.config.locking.non_reentrant.push(resource.into());
        self
    }

    /// Add a global free variable
    pub fn variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.variables.insert(name.into(), value);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        crate::validator::validate_config(&self.config)?;
        Ok(self.config)
    }
}
