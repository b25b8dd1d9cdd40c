//! Plugin registry: the persistent record of installed plugins.
//!
//! The runtime only depends on the [`PluginRegistry`] contract; the
//! in-memory implementation is the default.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use plughost_core::error::AppError;
use plughost_core::result::AppResult;

use crate::manifest::PluginInfo;

/// Store of installed plugin records.
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    /// Every record, sorted by name.
    async fn list_plugins(&self) -> AppResult<Vec<PluginInfo>>;

    /// Inserts or replaces a record.
    async fn register_plugin(&self, info: PluginInfo) -> AppResult<()>;

    /// Removes a record. Removing an unknown plugin is a no-op.
    async fn unregister_plugin(&self, name: &str) -> AppResult<()>;

    /// Persists the enabled flag.
    async fn set_plugin_enabled(&self, name: &str, enabled: bool) -> AppResult<()>;

    /// Looks up a record.
    async fn get_plugin_info(&self, name: &str) -> AppResult<Option<PluginInfo>>;

    /// Persists the plugin configuration.
    async fn set_plugin_config(&self, name: &str, config: Value) -> AppResult<()>;
}

/// Registry kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryPluginRegistry {
    /// Plugin name → record.
    plugins: RwLock<HashMap<String, PluginInfo>>,
}

impl MemoryPluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = PluginInfo>) -> Self {
        let plugins = records
            .into_iter()
            .map(|info| (info.name().to_string(), info))
            .collect();
        Self {
            plugins: RwLock::new(plugins),
        }
    }
}

#[async_trait]
impl PluginRegistry for MemoryPluginRegistry {
    async fn list_plugins(&self) -> AppResult<Vec<PluginInfo>> {
        let plugins = self.plugins.read().await;
        let mut all: Vec<PluginInfo> = plugins.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(all)
    }

    async fn register_plugin(&self, info: PluginInfo) -> AppResult<()> {
        info!(plugin = %info.name(), version = %info.manifest.version, "Registering plugin record");
        self.plugins
            .write()
            .await
            .insert(info.name().to_string(), info);
        Ok(())
    }

    async fn unregister_plugin(&self, name: &str) -> AppResult<()> {
        if self.plugins.write().await.remove(name).is_some() {
            info!(plugin = %name, "Plugin record removed");
        }
        Ok(())
    }

    async fn set_plugin_enabled(&self, name: &str, enabled: bool) -> AppResult<()> {
        let mut plugins = self.plugins.write().await;
        let info = plugins
            .get_mut(name)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{name}' not found")))?;
        info.enabled = enabled;
        info.updated_at = Utc::now();
        debug!(plugin = %name, enabled, "Plugin enabled flag persisted");
        Ok(())
    }

    async fn get_plugin_info(&self, name: &str) -> AppResult<Option<PluginInfo>> {
        Ok(self.plugins.read().await.get(name).cloned())
    }

    async fn set_plugin_config(&self, name: &str, config: Value) -> AppResult<()> {
        let mut plugins = self.plugins.write().await;
        let info = plugins
            .get_mut(name)
            .ok_or_else(|| AppError::not_found(format!("Plugin '{name}' not found")))?;
        info.config = config;
        info.updated_at = Utc::now();
        Ok(())
    }
}
