//! Plugin manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plugin manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Root directory under which each plugin gets its own data directory.
    #[serde(default = "default_data_directory")]
    pub data_directory: String,
    /// Maximum number of lifecycle transitions retained per plugin.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Whether `enable` validates the plugin before activating it.
    #[serde(default = "default_true")]
    pub validate_on_enable: bool,
    /// Time-to-live of cached validation reports, in seconds.
    #[serde(default = "default_validation_ttl")]
    pub validation_cache_ttl_seconds: u64,
    /// Maximum number of cached validation reports.
    #[serde(default = "default_validation_capacity")]
    pub validation_cache_capacity: u64,
    /// Time-to-live of entries in each plugin's context cache, in seconds.
    #[serde(default = "default_context_cache_ttl")]
    pub context_cache_ttl_seconds: u64,
    /// Maximum number of entries in each plugin's context cache.
    #[serde(default = "default_context_cache_capacity")]
    pub context_cache_capacity: u64,
    /// Whether a successful install immediately enables the plugin.
    #[serde(default)]
    pub auto_enable_on_install: bool,
}

impl PluginsConfig {
    /// Validation cache TTL as a duration.
    pub fn validation_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.validation_cache_ttl_seconds)
    }

    /// Context cache TTL as a duration.
    pub fn context_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.context_cache_ttl_seconds)
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            history_limit: default_history_limit(),
            validate_on_enable: true,
            validation_cache_ttl_seconds: default_validation_ttl(),
            validation_cache_capacity: default_validation_capacity(),
            context_cache_ttl_seconds: default_context_cache_ttl(),
            context_cache_capacity: default_context_cache_capacity(),
            auto_enable_on_install: false,
        }
    }
}

fn default_data_directory() -> String {
    "./data/plugins".to_string()
}

fn default_history_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_validation_ttl() -> u64 {
    300
}

fn default_validation_capacity() -> u64 {
    1024
}

fn default_context_cache_ttl() -> u64 {
    600
}

fn default_context_cache_capacity() -> u64 {
    1000
}
