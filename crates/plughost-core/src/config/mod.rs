//! Runtime configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate. Every
//! field carries a serde default, so an empty source set yields a usable
//! configuration.

pub mod hooks;
pub mod logging;
pub mod plugin;

use std::path::Path;

use serde::{Deserialize, Serialize};

use self::hooks::HooksConfig;
use self::logging::LoggingConfig;
use self::plugin::PluginsConfig;

use crate::error::AppError;

/// Root runtime configuration.
///
/// Top-level deserialization target for the merged TOML files
/// (default.toml + environment overlay) and `PLUGHOST__*` variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Hook dispatch defaults.
    #[serde(default)]
    pub hooks: HooksConfig,
    /// Plugin manager settings.
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Runtime event channel settings.
    #[serde(default)]
    pub events: EventsConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Runtime event broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Capacity of the broadcast channel; slow subscribers lag beyond this.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `config/` relative to the working directory.
    ///
    /// Merges `config/default.toml`, `config/{env}.toml`, and environment
    /// variables prefixed with `PLUGHOST`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from(Path::new("config"), env)
    }

    /// Load configuration from an explicit directory.
    pub fn load_from(dir: &Path, env: &str) -> Result<Self, AppError> {
        let default_path = dir.join("default");
        let env_path = dir.join(env);
        let default_name = default_path.to_string_lossy();
        let env_name = env_path.to_string_lossy();

        let config = config::Config::builder()
            .add_source(config::File::with_name(&default_name).required(false))
            .add_source(config::File::with_name(&env_name).required(false))
            .add_source(
                config::Environment::with_prefix("PLUGHOST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

fn default_channel_capacity() -> usize {
    256
}
