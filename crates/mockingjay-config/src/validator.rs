//! Configuration validation

use crate::Config;
use mockingjay_core::{Error, Result};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;
    validate_session(config)?;
    validate_scripting(config)?;
    validate_locking(config)?;

    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    let server = &config.server;

    if server.script_extension.is_empty() {
        return Err(Error::Config("script_extension cannot be empty".to_string()));
    }

    if server.script_extension.starts_with('.') {
        return Err(Error::Config(format!(
            "script_extension must not start with a dot: {}",
            server.script_extension
        )));
    }

    if server.template_extension.is_empty() {
        return Err(Error::Config("template_extension cannot be empty".to_string()));
    }

    if server.api_prefix.starts_with('/') {
        tracing::warn!(
            api_prefix = %server.api_prefix,
            "api_prefix starts with '/', request paths are matched without it"
        );
    }

    Ok(())
}

fn validate_session(config: &Config) -> Result<()> {
    if config.session.cookie_name.is_empty() {
        return Err(Error::Config("session cookie_name cannot be empty".to_string()));
    }

    if config.session.ttl.is_zero() {
        return Err(Error::Config("session ttl must be > 0".to_string()));
    }

    Ok(())
}

fn validate_scripting(config: &Config) -> Result<()> {
    let scripting = &config.scripting;

    if scripting.max_expr_depth == 0 {
        return Err(Error::Config("max_expr_depth must be > 0".to_string()));
    }

    if scripting.max_operations == 0 {
        tracing::debug!("max_operations is unlimited, a runaway script blocks its thread");
    }

    Ok(())
}

fn validate_locking(config: &Config) -> Result<()> {
    let ext = format!(".{}", config.server.script_extension);
    for resource in &config.locking.non_reentrant {
        if !resource.ends_with(&ext) {
            tracing::warn!(
                resource = %resource,
                extension = %ext,
                "Non-reentrant resource does not carry the script extension"
            );
        }
    }

    Ok(())
}
