//! Plugin context: the services and resources handed to plugin callbacks,
//! hook handlers, and command handlers.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use semver::Version;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use plughost_core::config::plugin::PluginsConfig;
use plughost_core::error::{AppError, ErrorKind};
use plughost_core::result::AppResult;

use crate::events::HookEventEmitter;
use crate::hooks::catalog::HookFactory;
use crate::manifest::{PluginInfo, PluginManifest};
use crate::services::{DependencyManager, Sandbox, Telemetry};

/// Permission required to read from the plugin data directory.
pub const FS_READ: &str = "fs:read";
/// Permission required to write to the plugin data directory.
pub const FS_WRITE: &str = "fs:write";

/// Context passed to plugins.
///
/// Built once per enable by a [`ContextFactory`] and shared by every
/// callback and handler of the plugin until it is disabled.
pub struct PluginContext {
    /// Manifest of the owning plugin.
    pub manifest: PluginManifest,
    /// Tracing logger tagged with the plugin name.
    pub logger: PluginLogger,
    /// Key/value cache private to the plugin.
    pub cache: Arc<dyn PluginCacheService>,
    /// Filesystem scoped to the plugin data directory.
    pub fs: PluginFs,
    /// Runtime event emitter.
    pub events: HookEventEmitter,
    /// In-memory state private to the plugin.
    pub state: PluginStateStore,
    /// Dependency manager handle.
    pub dependencies: Arc<dyn DependencyManager>,
    /// Sandbox handle.
    pub sandbox: Arc<dyn Sandbox>,
    /// Telemetry handle.
    pub telemetry: Arc<dyn Telemetry>,
    /// Factory for hooks registered at runtime.
    pub hook_factory: HookFactory,
    config: RwLock<Value>,
}

impl PluginContext {
    /// Plugin name.
    pub fn plugin_name(&self) -> &str {
        &self.manifest.name
    }

    /// Plugin version.
    pub fn plugin_version(&self) -> &Version {
        &self.manifest.version
    }

    /// Snapshot of the whole plugin configuration.
    pub fn config(&self) -> Value {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// One top-level configuration value.
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.config
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    /// Deserializes the configuration into `T`.
    pub fn config_as<T: DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_value(self.config())?)
    }

    /// Replaces the configuration.
    pub fn set_config(&self, config: Value) {
        *self.config.write().unwrap_or_else(|p| p.into_inner()) = config;
    }

    /// Whether the sandbox grants `permission` to this plugin.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.sandbox.is_allowed(&self.manifest, permission)
    }

    /// Fails with `PermissionDenied` unless `permission` is granted.
    pub fn require_permission(&self, permission: &str) -> AppResult<()> {
        self.sandbox.check(&self.manifest, permission)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.manifest.name)
            .field("version", &self.manifest.version.to_string())
            .finish()
    }
}

/// Logger that tags every event with the plugin name.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin: String,
}

impl PluginLogger {
    /// Creates a logger for `plugin`.
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        debug!(plugin = %self.plugin, "{message}");
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        info!(plugin = %self.plugin, "{message}");
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str) {
        warn!(plugin = %self.plugin, "{message}");
    }

    /// Logs at error level.
    pub fn error(&self, message: &str) {
        error!(plugin = %self.plugin, "{message}");
    }
}

/// Cache operations available to plugins.
#[async_trait]
pub trait PluginCacheService: Send + Sync {
    /// Gets a value from cache.
    async fn get(&self, key: &str) -> Option<Value>;
    /// Sets a value in cache.
    async fn set(&self, key: &str, value: Value);
    /// Deletes a value from cache.
    async fn delete(&self, key: &str);
    /// Drops every entry.
    async fn clear(&self);
}

/// Plugin cache backed by moka.
#[derive(Debug, Clone)]
pub struct MokaPluginCache {
    cache: Cache<String, Value>,
}

impl MokaPluginCache {
    /// Creates a cache holding at most `capacity` entries for `ttl`.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl PluginCacheService for MokaPluginCache {
    async fn get(&self, key: &str) -> Option<Value> {
        self.cache.get(key).await
    }

    async fn set(&self, key: &str, value: Value) {
        self.cache.insert(key.to_string(), value).await;
    }

    async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    async fn clear(&self) {
        self.cache.invalidate_all();
    }
}

/// In-memory state private to one plugin.
#[derive(Debug, Default)]
pub struct PluginStateStore {
    values: DashMap<String, Value>,
}

impl PluginStateStore {
    /// Gets a value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    /// Sets a value, returning the previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.remove(key).map(|(_, v)| v)
    }

    /// Sorted keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Drops every value.
    pub fn clear(&self) {
        self.values.clear();
    }
}

/// Filesystem access confined to the plugin's data directory.
///
/// Reads need `fs:read` and writes need `fs:write`.
#[derive(Debug, Clone)]
pub struct PluginFs {
    root: PathBuf,
    manifest: PluginManifest,
    sandbox: Arc<dyn Sandbox>,
}

impl PluginFs {
    /// Creates a filesystem rooted at `root`.
    pub fn new(root: PathBuf, manifest: PluginManifest, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            root,
            manifest,
            sandbox,
        }
    }

    /// Root data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` inside the root. Absolute paths and `..` are rejected.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> AppResult<PathBuf> {
        let relative = relative.as_ref();
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(AppError::permission_denied(format!(
                        "Path '{}' escapes the data directory of plugin '{}'",
                        relative.display(),
                        self.manifest.name
                    )));
                }
            }
        }
        Ok(self.root.join(relative))
    }

    /// Reads a file.
    pub async fn read(&self, relative: impl AsRef<Path>) -> AppResult<Vec<u8>> {
        self.sandbox.check(&self.manifest, FS_READ)?;
        let path = self.resolve(relative)?;
        tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))
    }

    /// Reads a UTF-8 file.
    pub async fn read_to_string(&self, relative: impl AsRef<Path>) -> AppResult<String> {
        self.sandbox.check(&self.manifest, FS_READ)?;
        let path = self.resolve(relative)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    /// Writes a file, creating parent directories.
    pub async fn write(&self, relative: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> AppResult<()> {
        self.sandbox.check(&self.manifest, FS_WRITE)?;
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| io_error(&path, e))
    }

    /// Whether a file exists.
    pub async fn exists(&self, relative: impl AsRef<Path>) -> AppResult<bool> {
        self.sandbox.check(&self.manifest, FS_READ)?;
        let path = self.resolve(relative)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| io_error(&path, e))
    }

    /// Removes a file.
    pub async fn remove(&self, relative: impl AsRef<Path>) -> AppResult<()> {
        self.sandbox.check(&self.manifest, FS_WRITE)?;
        let path = self.resolve(relative)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| io_error(&path, e))
    }
}

fn io_error(path: &Path, err: std::io::Error) -> AppError {
    let kind = if err.kind() == std::io::ErrorKind::NotFound {
        ErrorKind::NotFound
    } else {
        ErrorKind::Internal
    };
    AppError::with_source(kind, format!("I/O error on '{}'", path.display()), err)
}

/// Shared handles every context receives.
#[derive(Clone)]
pub struct ContextServices {
    /// Telemetry sink.
    pub telemetry: Arc<dyn Telemetry>,
    /// Dependency manager.
    pub dependencies: Arc<dyn DependencyManager>,
    /// Permission sandbox.
    pub sandbox: Arc<dyn Sandbox>,
    /// Event emitter.
    pub events: HookEventEmitter,
    /// Hook factory.
    pub hook_factory: HookFactory,
}

impl std::fmt::Debug for ContextServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextServices").finish()
    }
}

/// Per-call overrides for context creation.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Configuration to use instead of the registry record's.
    pub config: Option<Value>,
    /// Data directory to use instead of `<data_directory>/<plugin>`.
    pub data_directory: Option<PathBuf>,
}

/// Creates plugin contexts.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Builds the context for `plugin_name` described by `info`.
    async fn create_context(
        &self,
        plugin_name: &str,
        info: &PluginInfo,
        options: ContextOptions,
    ) -> AppResult<Arc<PluginContext>>;
}

/// Context factory wiring the runtime services and a moka cache per plugin.
#[derive(Debug, Clone)]
pub struct DefaultContextFactory {
    services: ContextServices,
    config: PluginsConfig,
}

impl DefaultContextFactory {
    /// Creates the factory.
    pub fn new(services: ContextServices, config: PluginsConfig) -> Self {
        Self { services, config }
    }
}

#[async_trait]
impl ContextFactory for DefaultContextFactory {
    async fn create_context(
        &self,
        plugin_name: &str,
        info: &PluginInfo,
        options: ContextOptions,
    ) -> AppResult<Arc<PluginContext>> {
        let root = options.data_directory.unwrap_or_else(|| {
            Path::new(&self.config.data_directory).join(plugin_name.replace('/', "__"))
        });
        let config = options.config.unwrap_or_else(|| info.config.clone());
        let cache = MokaPluginCache::new(
            self.config.context_cache_capacity,
            self.config.context_cache_ttl(),
        );

        debug!(plugin = %plugin_name, root = %root.display(), "Creating plugin context");

        Ok(Arc::new(PluginContext {
            manifest: info.manifest.clone(),
            logger: PluginLogger::new(plugin_name),
            cache: Arc::new(cache),
            fs: PluginFs::new(root, info.manifest.clone(), self.services.sandbox.clone()),
            events: self.services.events.clone(),
            state: PluginStateStore::default(),
            dependencies: self.services.dependencies.clone(),
            sandbox: self.services.sandbox.clone(),
            telemetry: self.services.telemetry.clone(),
            hook_factory: self.services.hook_factory.clone(),
            config: RwLock::new(config),
        }))
    }
}
