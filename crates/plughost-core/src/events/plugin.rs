//! Plugin lifecycle and command events.

use serde::{Deserialize, Serialize};

/// Events emitted by the plugin manager and command registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PluginEvent {
    /// A plugin was installed.
    Installed {
        /// Plugin name.
        name: String,
        /// Installed version.
        version: String,
    },
    /// A plugin was uninstalled.
    Uninstalled {
        /// Plugin name.
        name: String,
    },
    /// A plugin was re-installed from its source.
    Updated {
        /// Plugin name.
        name: String,
        /// Version before the update.
        previous_version: String,
        /// Version after the update.
        version: String,
        /// Whether the version string changed.
        version_changed: bool,
    },
    /// A plugin was enabled.
    Enabled {
        /// Plugin name.
        name: String,
    },
    /// A plugin was disabled.
    Disabled {
        /// Plugin name.
        name: String,
    },
    /// A plugin's lifecycle state changed.
    StateChanged {
        /// Plugin name.
        name: String,
        /// Previous state.
        from: String,
        /// New state.
        to: String,
    },
    /// A plugin's configuration was replaced.
    ConfigChanged {
        /// Plugin name.
        name: String,
    },
    /// A command was registered.
    CommandRegistered {
        /// Owning plugin.
        plugin: String,
        /// Command name.
        command: String,
    },
    /// A command was unregistered.
    CommandUnregistered {
        /// Owning plugin.
        plugin: String,
        /// Command name.
        command: String,
    },
}

impl PluginEvent {
    /// Returns the notification name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Installed { .. } => "plugin:installed",
            Self::Uninstalled { .. } => "plugin:uninstalled",
            Self::Updated { .. } => "plugin:updated",
            Self::Enabled { .. } => "plugin:enabled",
            Self::Disabled { .. } => "plugin:disabled",
            Self::StateChanged { .. } => "plugin:state-changed",
            Self::ConfigChanged { .. } => "plugin:config-changed",
            Self::CommandRegistered { .. } => "command:registered",
            Self::CommandUnregistered { .. } => "command:unregistered",
        }
    }
}
