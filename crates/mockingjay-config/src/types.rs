//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Mock directory and naming conventions
    #[serde(default)]
    pub server: ServerSettings,

    /// Session handling
    #[serde(default)]
    pub session: SessionConfig,

    /// Script sandbox limits
    #[serde(default)]
    pub scripting: ScriptingConfig,

    /// Execution locking
    #[serde(default)]
    pub locking: LockingConfig,

    /// Free variables bound into every request cycle
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
}

/// Mock directory and naming conventions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerSettings {
    /// Directory holding scripts and templates
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Script file extension (without the dot)
    #[serde(default = "default_script_extension")]
    pub script_extension: String,

    /// Template file extension (without the dot)
    #[serde(default = "default_template_extension")]
    pub template_extension: String,

    /// Path prefix that marks a request as an API (script) request
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            root: default_root(),
            script_extension: default_script_extension(),
            template_extension: default_template_extension(),
            api_prefix: default_api_prefix(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_script_extension() -> String {
    "rhai".to_string()
}

fn default_template_extension() -> String {
    "html".to_string()
}

fn default_api_prefix() -> String {
    "api/".to_string()
}

/// Session handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// Cookie carrying the session ID
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Session time to live
    #[serde(default = "default_session_ttl", with = "humantime_serde")]
    pub ttl: Duration,

    /// Create a session for requests that arrive without one
    #[serde(default)]
    pub auto_create: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl: default_session_ttl(),
            auto_create: false,
        }
    }
}

fn default_cookie_name() -> String {
    "MOCKINGJAY_SESSION".to_string()
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(600)
}

/// Script sandbox limits (0 = unlimited)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptingConfig {
    /// Maximum operations per evaluation
    #[serde(default)]
    pub max_operations: u64,

    /// Maximum string length
    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    /// Maximum array length
    #[serde(default = "default_max_collection_size")]
    pub max_array_size: usize,

    /// Maximum map size
    #[serde(default = "default_max_collection_size")]
    pub max_map_size: usize,

    /// Maximum expression nesting depth
    #[serde(default = "default_max_expr_depth")]
    pub max_expr_depth: usize,

    /// Maximum expression nesting depth inside functions
    #[serde(default = "default_max_function_expr_depth")]
    pub max_function_expr_depth: usize,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_string_size: default_max_string_size(),
            max_array_size: default_max_collection_size(),
            max_map_size: default_max_collection_size(),
            max_expr_depth: default_max_expr_depth(),
            max_function_expr_depth: default_max_function_expr_depth(),
        }
    }
}

fn default_max_string_size() -> usize {
    1024 * 1024
}

fn default_max_collection_size() -> usize {
    10_000
}

fn default_max_expr_depth() -> usize {
    64
}

fn default_max_function_expr_depth() -> usize {
    32
}

/// Execution locking
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockingConfig {
    /// Script resources whose execution is serialized, e.g. `api/counter.rhai`
    #[serde(default)]
    pub non_reentrant: Vec<String>,

    /// Serialize every script execution
    #[serde(default)]
    pub serialize_all: bool,
}
