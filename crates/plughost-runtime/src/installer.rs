//! Plugin installer: package acquisition and removal.
//!
//! Plugins are compiled in and registered as named sources on a
//! [`BuiltinInstaller`]; the manager only relies on the
//! [`PluginInstaller`] contract.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use plughost_core::error::AppError;
use plughost_core::result::AppResult;

use crate::manifest::{Plugin, PluginInfo};

/// Options accepted by [`PluginManager::install`](crate::manager::PluginManager::install).
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Reinstall over an existing installation.
    pub force: bool,
    /// Initial plugin configuration.
    pub config: Option<Value>,
    /// Enable right after installing; `None` uses the configured default.
    pub enable: Option<bool>,
}

impl InstallOptions {
    /// Options with `force` set.
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// Result of an installer acquisition.
#[derive(Clone)]
pub struct InstallOutcome {
    /// Whether the package was acquired.
    pub success: bool,
    /// The loaded plugin on success.
    pub plugin: Option<Arc<dyn Plugin>>,
    /// Failure reason.
    pub error: Option<String>,
}

impl InstallOutcome {
    /// A successful outcome.
    pub fn installed(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            success: true,
            plugin: Some(plugin),
            error: None,
        }
    }

    /// A failed outcome.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            plugin: None,
            error: Some(error.into()),
        }
    }
}

impl std::fmt::Debug for InstallOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallOutcome")
            .field("success", &self.success)
            .field("plugin", &self.plugin.as_ref().map(|p| p.manifest().name.clone()))
            .field("error", &self.error)
            .finish()
    }
}

/// Result of an installer removal.
#[derive(Debug, Clone)]
pub struct UninstallOutcome {
    /// Whether the package was removed.
    pub success: bool,
    /// Failure reason.
    pub error: Option<String>,
}

/// Acquires and removes plugin packages.
///
/// Calling `install_plugin` again after a failed attempt must be safe.
#[async_trait]
pub trait PluginInstaller: Send + Sync {
    /// Acquires the package named or located by `source`.
    async fn install_plugin(&self, source: &str, options: &InstallOptions) -> InstallOutcome;

    /// Removes the package of plugin `name`.
    async fn uninstall_plugin(&self, name: &str) -> UninstallOutcome;

    /// Instantiates an already installed plugin from its registry record.
    async fn load_plugin(&self, info: &PluginInfo) -> AppResult<Arc<dyn Plugin>>;
}

/// Constructor for a compiled-in plugin.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Installer over a catalog of compiled-in plugins.
///
/// Sources are catalog names, optionally prefixed with `builtin:`.
#[derive(Default)]
pub struct BuiltinInstaller {
    /// Source name → constructor.
    catalog: DashMap<String, PluginFactory>,
    /// Installed plugin name → source name.
    installed: DashMap<String, String>,
}

impl BuiltinInstaller {
    /// Creates an installer with an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiled-in plugin under `source`.
    pub fn register_source<F>(&self, source: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        let source = source.into();
        debug!(source = %source, "Plugin source registered");
        self.catalog.insert(source, Arc::new(factory));
    }

    /// Builder-style [`register_source`](Self::register_source).
    pub fn with_source<F>(self, source: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.register_source(source, factory);
        self
    }

    /// Source the installed package of `name` came from.
    pub fn installed_source(&self, name: &str) -> Option<String> {
        self.installed.get(name).map(|e| e.value().clone())
    }

    /// Sorted catalog names.
    pub fn sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.catalog.iter().map(|e| e.key().clone()).collect();
        sources.sort();
        sources
    }

    fn normalize(source: &str) -> &str {
        source.strip_prefix("builtin:").unwrap_or(source)
    }

    fn instantiate(&self, source: &str) -> AppResult<Arc<dyn Plugin>> {
        let factory = self
            .catalog
            .get(Self::normalize(source))
            .map(|f| f.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Unknown plugin source '{source}'")))?;
        Ok(factory())
    }
}

#[async_trait]
impl PluginInstaller for BuiltinInstaller {
    async fn install_plugin(&self, source: &str, options: &InstallOptions) -> InstallOutcome {
        let plugin = match self.instantiate(source) {
            Ok(plugin) => plugin,
            Err(e) => {
                warn!(source = %source, error = %e, "Plugin install failed");
                return InstallOutcome::failed(e.message);
            }
        };
        let name = plugin.manifest().name.clone();
        if !options.force && self.installed.contains_key(&name) {
            warn!(plugin = %name, source = %source, "Plugin package already installed");
            return InstallOutcome::failed(format!("Plugin '{name}' is already installed"));
        }
        self.installed
            .insert(name.clone(), Self::normalize(source).to_string());
        info!(plugin = %name, source = %source, force = options.force, "Plugin package installed");
        InstallOutcome::installed(plugin)
    }

    async fn uninstall_plugin(&self, name: &str) -> UninstallOutcome {
        match self.installed.remove(name) {
            Some(_) => {
                info!(plugin = %name, "Plugin package removed");
                UninstallOutcome {
                    success: true,
                    error: None,
                }
            }
            None => UninstallOutcome {
                success: false,
                error: Some(format!("Plugin '{name}' has no installed package")),
            },
        }
    }

    async fn load_plugin(&self, info: &PluginInfo) -> AppResult<Arc<dyn Plugin>> {
        let plugin = self.instantiate(&info.source)?;
        if plugin.manifest().name != info.manifest.name {
            return Err(AppError::installation(format!(
                "Source '{}' provides '{}', expected '{}'",
                info.source,
                plugin.manifest().name,
                info.manifest.name
            )));
        }
        self.installed
            .insert(info.manifest.name.clone(), Self::normalize(&info.source).to_string());
        Ok(plugin)
    }
}

impl std::fmt::Debug for BuiltinInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinInstaller")
            .field("sources", &self.catalog.len())
            .field("installed", &self.installed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PluginManifest;

    struct Bare(PluginManifest);

    impl Plugin for Bare {
        fn manifest(&self) -> &PluginManifest {
            &self.0
        }
    }

    fn installer() -> BuiltinInstaller {
        BuiltinInstaller::new().with_source("bare", || {
            Arc::new(Bare(PluginManifest::parse("bare", "0.1.0").expect("manifest"))) as Arc<dyn Plugin>
        })
    }

    #[tokio::test]
    async fn test_install_known_and_unknown_sources() {
        let installer = installer();
        let ok = installer
            .install_plugin("builtin:bare", &InstallOptions::default())
            .await;
        assert!(ok.success);
        assert_eq!(ok.plugin.expect("plugin").manifest().name, "bare");

        let missing = installer.install_plugin("ghost", &InstallOptions::default()).await;
        assert!(!missing.success);
        assert!(missing.error.expect("error").contains("ghost"));
    }

    #[tokio::test]
    async fn test_uninstall_requires_installation() {
        let installer = installer();
        assert!(!installer.uninstall_plugin("bare").await.success);
        installer.install_plugin("bare", &InstallOptions::default()).await;
        assert!(installer.uninstall_plugin("bare").await.success);
    }

    #[tokio::test]
    async fn test_reinstall_requires_force() {
        let installer = installer().with_source("bare-next", || {
            Arc::new(Bare(PluginManifest::parse("bare", "0.2.0").expect("manifest"))) as Arc<dyn Plugin>
        });
        installer.install_plugin("bare", &InstallOptions::default()).await;

        let refused = installer
            .install_plugin("bare-next", &InstallOptions::default())
            .await;
        assert!(!refused.success);
        assert_eq!(installer.installed_source("bare").as_deref(), Some("bare"));

        let forced = installer
            .install_plugin("bare-next", &InstallOptions::forced())
            .await;
        assert!(forced.success);
        assert_eq!(installer.installed_source("bare").as_deref(), Some("bare-next"));
    }
}
