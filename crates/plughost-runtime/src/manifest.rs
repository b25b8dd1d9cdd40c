//! Plugin manifests, the `Plugin` trait, and registry records.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use plughost_core::result::AppResult;

use crate::api::context::PluginContext;
use crate::commands::Command;
use crate::hooks::definitions::Hook;

/// Maximum length of a plugin name.
pub const MAX_PLUGIN_NAME_LEN: usize = 214;

static PLUGIN_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(@[a-z0-9][a-z0-9._-]*/)?[a-z0-9][a-z0-9._-]*$")
        .expect("plugin name pattern compiles")
});

/// Returns whether `name` is an acceptable plugin name.
///
/// Names are lowercase, at most 214 characters, and may carry an
/// `@scope/` prefix.
pub fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_PLUGIN_NAME_LEN && PLUGIN_NAME_PATTERN.is_match(name)
}

fn validate_plugin_name(name: &str) -> Result<(), ValidationError> {
    if PLUGIN_NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        let mut err = ValidationError::new("plugin_name");
        err.message = Some(format!("'{name}' contains characters outside [a-z0-9._-]").into());
        Err(err)
    }
}

fn validate_permissions(permissions: &[String]) -> Result<(), ValidationError> {
    if permissions.iter().any(|p| p.trim().is_empty()) {
        let mut err = ValidationError::new("permissions");
        err.message = Some("permissions must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Static description of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PluginManifest {
    /// Unique plugin name.
    #[validate(
        length(min = 1, max = 214),
        custom(function = "validate_plugin_name")
    )]
    pub name: String,
    /// Semantic version.
    pub version: Version,
    /// Human-readable description.
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub description: String,
    /// Author or maintainer.
    #[serde(default)]
    pub author: Option<String>,
    /// Required plugins, keyed by name.
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionReq>,
    /// Permissions the plugin requests, e.g. `fs:read`.
    #[serde(default)]
    #[validate(custom(function = "validate_permissions"))]
    pub permissions: Vec<String>,
}

impl PluginManifest {
    /// Creates a manifest with no dependencies or permissions.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: String::new(),
            author: None,
            dependencies: BTreeMap::new(),
            permissions: Vec::new(),
        }
    }

    /// Creates a manifest, parsing the version string.
    pub fn parse(name: impl Into<String>, version: &str) -> AppResult<Self> {
        Ok(Self::new(name, Version::parse(version)?))
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Adds a dependency on another plugin.
    pub fn with_dependency(mut self, name: impl Into<String>, requirement: VersionReq) -> Self {
        self.dependencies.insert(name.into(), requirement);
        self
    }

    /// Adds a requested permission.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }
}

/// Trait that all plugins implement.
///
/// Every lifecycle callback is optional; the defaults do nothing.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Returns the plugin manifest.
    fn manifest(&self) -> &PluginManifest;

    /// Commands registered while the plugin is enabled.
    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Hooks registered while the plugin is enabled.
    fn hooks(&self) -> Vec<Hook> {
        Vec::new()
    }

    /// Called at the start of every enable.
    async fn init(&self, _ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called at the end of every disable.
    async fn cleanup(&self, _ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once after the package has been installed.
    async fn on_install(&self, _ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after hooks and commands are registered.
    async fn on_activate(&self, _ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before hooks and commands are unregistered.
    async fn on_deactivate(&self, _ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before the package is removed.
    async fn on_uninstall(&self, _ctx: Arc<PluginContext>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called on the new instance after an update.
    async fn on_update(
        &self,
        _ctx: Arc<PluginContext>,
        _previous_version: &Version,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the plugin's configuration is replaced.
    async fn on_config_change(&self, _ctx: Arc<PluginContext>, _config: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Persisted record of an installed plugin, as stored by a plugin registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// The plugin manifest.
    pub manifest: PluginManifest,
    /// Name or path the plugin was installed from.
    pub source: String,
    /// Whether the plugin should be enabled on startup.
    pub enabled: bool,
    /// Names of the hooks the plugin declares.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// Names of the commands the plugin declares.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Plugin configuration.
    #[serde(default)]
    pub config: Value,
    /// When the plugin was first installed.
    pub installed_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl PluginInfo {
    /// Builds a disabled record describing `plugin`.
    pub fn from_plugin(plugin: &dyn Plugin, source: &str) -> Self {
        let now = Utc::now();
        Self {
            manifest: plugin.manifest().clone(),
            source: source.to_string(),
            enabled: false,
            hooks: plugin.hooks().iter().map(|h| h.name.clone()).collect(),
            commands: plugin.commands().iter().map(|c| c.name.clone()).collect(),
            config: Value::Object(serde_json::Map::new()),
            installed_at: now,
            updated_at: now,
        }
    }

    /// Returns the plugin name.
    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}
