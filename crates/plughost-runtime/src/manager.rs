//! Plugin manager: install, enable, disable, update, and uninstall plugins.
//!
//! Every mutating operation holds the manager's operation lock so two
//! orchestrations never interleave. Hooks announcing the outcome are fired
//! after the lock is released, which lets hook handlers call back into the
//! manager.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use semver::Version;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use plughost_core::config::plugin::PluginsConfig;
use plughost_core::error::{AppError, ErrorKind};
use plughost_core::events::PluginEvent;
use plughost_core::result::AppResult;

use crate::api::context::{ContextFactory, ContextOptions, PluginContext};
use crate::commands::{Command, CommandRegistry};
use crate::events::HookEventEmitter;
use crate::hooks::definitions::{Hook, HookContext, StandardHook};
use crate::hooks::dispatcher::HookDispatcher;
use crate::installer::{InstallOptions, PluginInstaller};
use crate::lifecycle::{LifecycleMachine, PluginState, StateTransition};
use crate::manifest::{Plugin, PluginInfo, PluginManifest};
use crate::registry::PluginRegistry;
use crate::services::{DependencyManager, PerformanceProfiler, ProfileTimer, Telemetry};
use crate::validation::ValidationService;

/// Coarse status of an installed plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Installed but never enabled.
    Installed,
    /// Hooks and commands are registered.
    Enabled,
    /// Was enabled, now disabled.
    Disabled,
    /// A lifecycle step failed.
    Error,
}

impl PluginStatus {
    /// Returns the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one managed plugin.
#[derive(Debug, Clone, Serialize)]
pub struct PluginSummary {
    /// Plugin name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Description from the manifest.
    pub description: String,
    /// Manager status.
    pub status: PluginStatus,
    /// Lifecycle state.
    pub state: PluginState,
    /// Install source.
    pub source: String,
    /// Declared hook names.
    pub hooks: Vec<String>,
    /// Declared command names.
    pub commands: Vec<String>,
}

/// Counts of managed plugins.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerStats {
    /// All managed plugins.
    pub total: usize,
    /// Per status.
    pub by_status: BTreeMap<String, usize>,
    /// Per lifecycle state.
    pub by_state: BTreeMap<String, usize>,
    /// Hooks currently registered across all plugins.
    pub registered_hooks: usize,
    /// Commands currently registered across all plugins.
    pub registered_commands: usize,
}

/// Result of a successful install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    /// Installed plugin name.
    pub name: String,
    /// Installed version.
    pub version: String,
    /// Whether the plugin was enabled as part of the install.
    pub enabled: bool,
}

/// Result of a successful update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateResult {
    /// Plugin name.
    pub name: String,
    /// Version before the update.
    pub previous_version: String,
    /// Version after the update.
    pub version: String,
    /// Whether the version number changed.
    pub version_changed: bool,
}

/// Collaborators the manager orchestrates.
#[derive(Clone)]
pub struct ManagerDeps {
    /// Hook dispatcher.
    pub dispatcher: Arc<HookDispatcher>,
    /// Command registry.
    pub commands: Arc<CommandRegistry>,
    /// Persistent plugin records.
    pub registry: Arc<dyn PluginRegistry>,
    /// Plugin acquisition.
    pub installer: Arc<dyn PluginInstaller>,
    /// Context construction.
    pub contexts: Arc<dyn ContextFactory>,
    /// Cached plugin validation.
    pub validation: Arc<ValidationService>,
    /// Dependency resolution.
    pub dependencies: Arc<dyn DependencyManager>,
    /// Usage telemetry.
    pub telemetry: Arc<dyn Telemetry>,
    /// Operation timings.
    pub profiler: Arc<dyn PerformanceProfiler>,
    /// Runtime events.
    pub events: HookEventEmitter,
}

struct PluginRecord {
    plugin: Arc<dyn Plugin>,
    source: String,
    status: PluginStatus,
    lifecycle: LifecycleMachine,
    context: Option<Arc<PluginContext>>,
}

impl PluginRecord {
    fn summary(&self) -> PluginSummary {
        let manifest = self.plugin.manifest();
        PluginSummary {
            name: manifest.name.clone(),
            version: manifest.version.to_string(),
            description: manifest.description.clone(),
            status: self.status,
            state: self.lifecycle.current(),
            source: self.source.clone(),
            hooks: self.plugin.hooks().into_iter().map(|h| h.name).collect(),
            commands: self.plugin.commands().into_iter().map(|c| c.name).collect(),
        }
    }
}

type Slot = Arc<Mutex<PluginRecord>>;

/// Orchestrates installed plugins through their lifecycle.
pub struct PluginManager {
    config: PluginsConfig,
    deps: ManagerDeps,
    plugins: RwLock<HashMap<String, Slot>>,
    op_lock: Mutex<()>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("initialized", &self.initialized.load(Ordering::Acquire))
            .finish()
    }
}

impl PluginManager {
    /// Creates an uninitialized manager.
    pub fn new(config: PluginsConfig, deps: ManagerDeps) -> Self {
        Self {
            config,
            deps,
            plugins: RwLock::new(HashMap::new()),
            op_lock: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Loads every registry record and re-enables the ones flagged enabled,
    /// dependencies first. Idempotent.
    pub async fn initialize(&self) -> AppResult<()> {
        let enabled = {
            let _guard = self.op_lock.lock().await;
            if self.is_initialized() {
                return Ok(());
            }

            let records = self.deps.registry.list_plugins().await?;
            let mut enabled = Vec::new();
            for info in records {
                let plugin = match self.deps.installer.load_plugin(&info).await {
                    Ok(plugin) => plugin,
                    Err(e) => {
                        warn!(plugin = %info.name(), error = %e, "Skipping plugin that failed to load");
                        continue;
                    }
                };

                let mut lifecycle = self.new_lifecycle(info.name());
                lifecycle.transition(PluginState::Loading).await?;
                lifecycle.transition(PluginState::Loaded).await?;

                if info.enabled {
                    enabled.push(info.manifest.clone());
                }
                self.insert_record(PluginRecord {
                    plugin,
                    source: info.source.clone(),
                    status: PluginStatus::Installed,
                    lifecycle,
                    context: None,
                })
                .await;
            }

            self.initialized.store(true, Ordering::Release);

            let order = self.ordered(&enabled);
            let mut started = Vec::new();
            for name in order {
                match self.enable_locked(&name).await {
                    Ok(true) => started.push(name),
                    Ok(false) => {}
                    Err(e) => error!(plugin = %name, error = %e, "Failed to re-enable plugin"),
                }
            }
            started
        };

        for name in &enabled {
            self.fire(StandardHook::PluginEnabled, vec![json!(name)]).await;
        }

        info!(
            plugins = self.plugins.read().await.len(),
            enabled = enabled.len(),
            "Plugin manager initialized"
        );
        Ok(())
    }

    /// Acquires a plugin from `source` and records it as installed.
    pub async fn install(&self, source: &str, options: &InstallOptions) -> AppResult<InstallResult> {
        self.ensure_initialized()?;
        let installed = {
            let _guard = self.op_lock.lock().await;
            self.install_locked(source, options).await?
        };

        self.fire(
            StandardHook::PluginInstalled,
            vec![json!(installed.name), json!(installed.version)],
        )
        .await;

        let mut result = installed;
        if options.enable.unwrap_or(self.config.auto_enable_on_install) {
            match self.enable(&result.name).await {
                Ok(()) => result.enabled = true,
                Err(e) => warn!(plugin = %result.name, error = %e, "Installed plugin could not be enabled"),
            }
        }
        Ok(result)
    }

    /// Disables (if needed) and removes an installed plugin.
    pub async fn uninstall(&self, name: &str) -> AppResult<()> {
        self.ensure_initialized()?;
        let disabled = {
            let _guard = self.op_lock.lock().await;
            self.uninstall_locked(name).await?
        };

        if disabled {
            self.fire(StandardHook::PluginDisabled, vec![json!(name)]).await;
        }
        self.fire(StandardHook::PluginUninstalled, vec![json!(name)])
            .await;
        Ok(())
    }

    /// Reinstalls a plugin from its original source, keeping its config and
    /// enabled state.
    pub async fn update(&self, name: &str) -> AppResult<UpdateResult> {
        self.ensure_initialized()?;
        let _guard = self.op_lock.lock().await;
        self.update_locked(name).await
    }

    /// Activates an installed plugin. Enabling an enabled plugin is a no-op.
    pub async fn enable(&self, name: &str) -> AppResult<()> {
        self.ensure_initialized()?;
        let changed = {
            let _guard = self.op_lock.lock().await;
            self.enable_locked(name).await?
        };
        if changed {
            self.fire(StandardHook::PluginEnabled, vec![json!(name)]).await;
        }
        Ok(())
    }

    /// Deactivates a plugin. Disabling a disabled plugin is a no-op.
    pub async fn disable(&self, name: &str) -> AppResult<()> {
        self.ensure_initialized()?;
        let changed = {
            let _guard = self.op_lock.lock().await;
            self.disable_locked(name).await?
        };
        if changed {
            self.fire(StandardHook::PluginDisabled, vec![json!(name)]).await;
        }
        Ok(())
    }

    /// Keeps an active plugin loaded but stops dispatching its hooks.
    pub async fn suspend(&self, name: &str) -> AppResult<()> {
        self.ensure_initialized()?;
        let _guard = self.op_lock.lock().await;
        let slot = self.slot(name).await?;
        let mut record = slot.lock().await;

        match record.lifecycle.current() {
            PluginState::Suspended => return Ok(()),
            PluginState::Active => {}
            state => {
                return Err(AppError::conflict(format!(
                    "Plugin '{name}' cannot be suspended while {state}"
                )));
            }
        }

        let hooks = self
            .deps
            .dispatcher
            .set_plugin_hooks_enabled(name, false)
            .await;
        record.lifecycle.transition(PluginState::Suspended).await?;
        info!(plugin = %name, hooks, "Plugin suspended");
        Ok(())
    }

    /// Restores hook dispatch for a suspended plugin.
    pub async fn resume(&self, name: &str) -> AppResult<()> {
        self.ensure_initialized()?;
        let _guard = self.op_lock.lock().await;
        let slot = self.slot(name).await?;
        let mut record = slot.lock().await;

        match record.lifecycle.current() {
            PluginState::Active => return Ok(()),
            PluginState::Suspended => {}
            state => {
                return Err(AppError::conflict(format!(
                    "Plugin '{name}' cannot be resumed while {state}"
                )));
            }
        }

        let hooks = self
            .deps
            .dispatcher
            .set_plugin_hooks_enabled(name, true)
            .await;
        record.lifecycle.transition(PluginState::Active).await?;
        info!(plugin = %name, hooks, "Plugin resumed");
        Ok(())
    }

    /// Persists new configuration and notifies a running plugin.
    pub async fn configure(&self, name: &str, config: Value) -> AppResult<()> {
        self.ensure_initialized()?;
        {
            let _guard = self.op_lock.lock().await;
            let slot = self.slot(name).await?;
            let record = slot.lock().await;

            self.deps
                .registry
                .set_plugin_config(name, config.clone())
                .await?;

            if let Some(ctx) = record.context.clone() {
                ctx.set_config(config.clone());
                record
                    .plugin
                    .on_config_change(ctx, &config)
                    .await
                    .map_err(|e| {
                        AppError::lifecycle(format!(
                            "Plugin '{name}' rejected its configuration: {e:#}"
                        ))
                    })?;
            }

            self.deps.events.emit(PluginEvent::ConfigChanged {
                name: name.to_string(),
            });
            debug!(plugin = %name, "Plugin configuration updated");
        }

        self.fire(StandardHook::ConfigChanged, vec![json!(name), config])
            .await;
        Ok(())
    }

    /// Disables every enabled plugin, dependents first.
    pub async fn shutdown(&self) -> AppResult<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        let _guard = self.op_lock.lock().await;

        let mut enabled = Vec::new();
        for slot in self.slots().await {
            let record = slot.lock().await;
            if matches!(record.status, PluginStatus::Enabled | PluginStatus::Error) {
                enabled.push(record.plugin.manifest().clone());
            }
        }

        let mut order = self.ordered(&enabled);
        order.reverse();
        for name in order {
            if let Err(e) = self.disable_locked(&name).await {
                error!(plugin = %name, error = %e, "Failed to disable plugin during shutdown");
            }
        }

        info!("Plugin manager shut down");
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Every managed plugin, sorted by name.
    pub async fn list(&self) -> Vec<PluginSummary> {
        let mut summaries = Vec::new();
        for slot in self.slots().await {
            summaries.push(slot.lock().await.summary());
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Snapshot of one plugin.
    pub async fn get_plugin(&self, name: &str) -> Option<PluginSummary> {
        let slot = self.plugins.read().await.get(name).cloned()?;
        let summary = slot.lock().await.summary();
        Some(summary)
    }

    /// The plugin instance.
    pub async fn plugin_instance(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let slot = self.plugins.read().await.get(name).cloned()?;
        let plugin = slot.lock().await.plugin.clone();
        Some(plugin)
    }

    /// The context of an enabled plugin.
    pub async fn plugin_context(&self, name: &str) -> Option<Arc<PluginContext>> {
        let slot = self.plugins.read().await.get(name).cloned()?;
        let context = slot.lock().await.context.clone();
        context
    }

    /// Whether `name` is installed.
    pub async fn is_installed(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// Whether `name` is enabled.
    pub async fn is_enabled(&self, name: &str) -> bool {
        match self.get_plugin(name).await {
            Some(summary) => summary.status == PluginStatus::Enabled,
            None => false,
        }
    }

    /// Lifecycle transitions of `name`, oldest first.
    pub async fn state_history(&self, name: &str) -> AppResult<Vec<StateTransition>> {
        let slot = self.slot(name).await?;
        let history = slot.lock().await.lifecycle.history();
        Ok(history)
    }

    /// Counts by status and lifecycle state.
    pub async fn get_stats(&self) -> ManagerStats {
        let mut stats = ManagerStats::default();
        for slot in self.slots().await {
            let record = slot.lock().await;
            stats.total += 1;
            *stats
                .by_status
                .entry(record.status.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_state
                .entry(record.lifecycle.current().as_str().to_string())
                .or_default() += 1;
        }
        stats.registered_hooks = self.deps.dispatcher.hook_count().await;
        stats.registered_commands = self.deps.commands.count().await;
        stats
    }

    // ── Pass-throughs ───────────────────────────────────────────

    /// Registers an extra hook on behalf of an installed plugin.
    pub async fn register_hook(&self, plugin_name: &str, hook: Hook) -> AppResult<Uuid> {
        self.ensure_initialized()?;
        self.slot(plugin_name).await?;
        self.deps.dispatcher.register_hook(hook, plugin_name).await
    }

    /// Removes hooks named `hook_name` owned by `plugin_name`.
    pub async fn unregister_hook(&self, plugin_name: &str, hook_name: &str) -> AppResult<usize> {
        self.ensure_initialized()?;
        self.slot(plugin_name).await?;
        Ok(self
            .deps
            .dispatcher
            .unregister_hook(hook_name, plugin_name)
            .await)
    }

    /// Registers an extra command on behalf of an enabled plugin.
    pub async fn register_command(&self, plugin_name: &str, command: Command) -> AppResult<()> {
        self.ensure_initialized()?;
        let ctx = self.plugin_context(plugin_name).await.ok_or_else(|| {
            AppError::conflict(format!(
                "Plugin '{plugin_name}' must be enabled to register commands"
            ))
        })?;
        self.deps.commands.register(command, plugin_name, ctx).await
    }

    /// Removes a command owned by `plugin_name`.
    pub async fn unregister_command(&self, plugin_name: &str, command_name: &str) -> AppResult<()> {
        self.ensure_initialized()?;
        self.slot(plugin_name).await?;
        self.deps
            .commands
            .unregister(command_name, plugin_name)
            .await
    }

    // ── Orchestration ───────────────────────────────────────────

    async fn install_locked(&self, source: &str, options: &InstallOptions) -> AppResult<InstallResult> {
        if !options.force && self.is_installed(source).await {
            return Err(AppError::conflict(format!(
                "Plugin '{source}' is already installed"
            )));
        }
        let timer = ProfileTimer::start(self.deps.profiler.clone(), "plugin.install");

        let outcome = self.deps.installer.install_plugin(source, options).await;
        let plugin = match outcome.plugin {
            Some(plugin) if outcome.success => plugin,
            _ => {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "installer returned no plugin".to_string());
                return Err(AppError::installation(format!(
                    "Failed to install '{source}': {reason}"
                )));
            }
        };
        let manifest = plugin.manifest().clone();
        let name = manifest.name.clone();

        let replacing = self.is_installed(&name).await;
        if replacing && !options.force {
            return Err(AppError::conflict(format!(
                "Plugin '{name}' is already installed"
            )));
        }

        let previous = self.deps.registry.get_plugin_info(&name).await?;
        let mut info = PluginInfo::from_plugin(plugin.as_ref(), source);
        if let Some(previous) = previous {
            info.installed_at = previous.installed_at;
            info.config = previous.config;
        }
        if let Some(config) = &options.config {
            info.config = config.clone();
        }

        // The new instance is staged on its own lifecycle; an existing
        // installation stays live until staging succeeds.
        let staged = self.stage_install(&name, &plugin, &info).await;
        let lifecycle = match staged {
            Ok(lifecycle) => lifecycle,
            Err(e) => {
                if !replacing {
                    self.rollback_install(&name).await;
                }
                return Err(e);
            }
        };

        let was_enabled = replacing && self.is_enabled(&name).await;
        if replacing {
            self.disable_locked(&name).await?;
        }

        if let Err(e) = self.deps.registry.register_plugin(info).await {
            if replacing {
                self.restore_enabled(&name, was_enabled).await;
            } else {
                self.rollback_install(&name).await;
            }
            return Err(e);
        }
        self.insert_record(PluginRecord {
            plugin,
            source: source.to_string(),
            status: PluginStatus::Installed,
            lifecycle,
            context: None,
        })
        .await;

        let elapsed = timer.finish();
        self.deps.telemetry.increment("plugin.installed", 1);
        self.deps.telemetry.record_event(
            "plugin.installed",
            json!({ "plugin": name, "version": manifest.version.to_string() }),
        );
        self.deps.events.emit(PluginEvent::Installed {
            name: name.clone(),
            version: manifest.version.to_string(),
        });
        info!(
            plugin = %name,
            version = %manifest.version,
            source = %source,
            elapsed_ms = elapsed.as_millis() as u64,
            "Plugin installed"
        );

        Ok(InstallResult {
            name,
            version: manifest.version.to_string(),
            enabled: false,
        })
    }

    async fn rollback_install(&self, name: &str) {
        let outcome = self.deps.installer.uninstall_plugin(name).await;
        if !outcome.success {
            warn!(
                plugin = %name,
                error = ?outcome.error,
                "Failed to roll back plugin acquisition"
            );
        }
    }

    /// Runs the install phase of a freshly acquired plugin.
    async fn stage_install(
        &self,
        name: &str,
        plugin: &Arc<dyn Plugin>,
        info: &PluginInfo,
    ) -> AppResult<LifecycleMachine> {
        let ctx = self
            .deps
            .contexts
            .create_context(name, info, ContextOptions::default())
            .await?;
        let mut lifecycle = self.new_lifecycle(name);
        lifecycle.transition(PluginState::Loading).await?;
        lifecycle
            .transition_with(PluginState::Loaded, plugin.on_install(ctx))
            .await?;
        Ok(lifecycle)
    }

    async fn restore_enabled(&self, name: &str, was_enabled: bool) {
        if was_enabled && let Err(e) = self.enable_locked(name).await {
            warn!(plugin = %name, error = %e, "Failed to re-enable plugin after failed reinstall");
        }
    }

    /// Returns whether the plugin was enabled and had to be disabled first.
    async fn uninstall_locked(&self, name: &str) -> AppResult<bool> {
        let slot = self.slot(name).await?;
        let was_enabled = slot.lock().await.status == PluginStatus::Enabled;
        self.disable_locked(name).await?;

        let mut record = slot.lock().await;
        let plugin = record.plugin.clone();
        let ctx = self.context_for(name, &record).await?;

        record.lifecycle.transition(PluginState::Unloading).await?;
        record
            .lifecycle
            .transition_with(PluginState::Unloaded, plugin.on_uninstall(ctx))
            .await?;

        let outcome = self.deps.installer.uninstall_plugin(name).await;
        if !outcome.success {
            let reason = outcome.error.unwrap_or_default();
            record.lifecycle.fail(reason.clone());
            record.status = PluginStatus::Error;
            return Err(AppError::installation(format!(
                "Failed to uninstall '{name}': {reason}"
            )));
        }
        drop(record);

        self.plugins.write().await.remove(name);
        self.deps.registry.unregister_plugin(name).await?;

        self.deps.telemetry.increment("plugin.uninstalled", 1);
        self.deps.events.emit(PluginEvent::Uninstalled {
            name: name.to_string(),
        });
        info!(plugin = %name, "Plugin uninstalled");
        Ok(was_enabled)
    }

    async fn update_locked(&self, name: &str) -> AppResult<UpdateResult> {
        let timer = ProfileTimer::start(self.deps.profiler.clone(), "plugin.update");
        let slot = self.slot(name).await?;
        let (source, previous_version, was_enabled) = {
            let record = slot.lock().await;
            (
                record.source.clone(),
                record.plugin.manifest().version.clone(),
                record.status == PluginStatus::Enabled,
            )
        };

        if was_enabled {
            self.disable_locked(name).await?;
        }

        let outcome = self
            .deps
            .installer
            .install_plugin(&source, &InstallOptions::forced())
            .await;
        let plugin = match outcome.plugin {
            Some(plugin) if outcome.success && plugin.manifest().name == name => plugin,
            Some(plugin) if outcome.success => {
                return Err(self
                    .restore_after_failed_update(
                        name,
                        was_enabled,
                        format!("source now provides '{}'", plugin.manifest().name),
                    )
                    .await);
            }
            _ => {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "installer returned no plugin".to_string());
                return Err(self
                    .restore_after_failed_update(name, was_enabled, reason)
                    .await);
            }
        };
        let version = plugin.manifest().version.clone();

        if let Err(e) = self
            .swap_updated(name, &slot, plugin, &source, &previous_version)
            .await
        {
            return Err(self
                .restore_after_failed_update(name, was_enabled, format!("{e}"))
                .await);
        }

        if was_enabled {
            self.enable_locked(name).await?;
        }

        let elapsed = timer.finish();
        let result = UpdateResult {
            name: name.to_string(),
            previous_version: previous_version.to_string(),
            version: version.to_string(),
            version_changed: previous_version != version,
        };
        self.deps.telemetry.increment("plugin.updated", 1);
        self.deps.events.emit(PluginEvent::Updated {
            name: result.name.clone(),
            previous_version: result.previous_version.clone(),
            version: result.version.clone(),
            version_changed: result.version_changed,
        });
        info!(
            plugin = %name,
            from = %previous_version,
            to = %version,
            elapsed_ms = elapsed.as_millis() as u64,
            "Plugin updated"
        );
        Ok(result)
    }

    /// Runs the update phase of `plugin` and swaps it into the record.
    /// On failure the record keeps its previous instance and state.
    async fn swap_updated(
        &self,
        name: &str,
        slot: &Slot,
        plugin: Arc<dyn Plugin>,
        source: &str,
        previous_version: &Version,
    ) -> AppResult<()> {
        let mut info = PluginInfo::from_plugin(plugin.as_ref(), source);
        if let Some(previous) = self.deps.registry.get_plugin_info(name).await? {
            info.installed_at = previous.installed_at;
            info.config = previous.config;
        }

        let mut record = slot.lock().await;
        let resume_state = record.lifecycle.current();
        let staged = async {
            let ctx = self
                .deps
                .contexts
                .create_context(name, &info, ContextOptions::default())
                .await?;
            record.lifecycle.transition(PluginState::Loading).await?;
            record
                .lifecycle
                .transition_with(
                    PluginState::Loaded,
                    plugin.on_update(ctx, previous_version),
                )
                .await?;
            self.deps.registry.register_plugin(info).await
        }
        .await;

        if let Err(e) = staged {
            warn!(plugin = %name, error = %e, "Plugin update failed, keeping previous version");
            record.lifecycle.transition(resume_state).await?;
            return Err(e);
        }
        record.plugin = plugin;
        record.status = PluginStatus::Installed;
        record.context = None;
        Ok(())
    }

    async fn restore_after_failed_update(
        &self,
        name: &str,
        was_enabled: bool,
        reason: String,
    ) -> AppError {
        if was_enabled && let Err(e) = self.enable_locked(name).await {
            warn!(plugin = %name, error = %e, "Failed to re-enable plugin after failed update");
        }
        AppError::installation(format!("Failed to update '{name}': {reason}"))
    }

    /// Returns whether the plugin changed state.
    async fn enable_locked(&self, name: &str) -> AppResult<bool> {
        let slot = self.slot(name).await?;
        if slot.lock().await.status == PluginStatus::Enabled {
            return Ok(false);
        }

        let timer = ProfileTimer::start(self.deps.profiler.clone(), "plugin.enable");
        let installed = self.enabled_versions(name).await;

        let mut record = slot.lock().await;
        let plugin = record.plugin.clone();
        self.check_enable(name, plugin.as_ref(), &installed).await?;

        let ctx = self.context_for(name, &record).await?;
        if let Err(err) = self
            .activate(name, &plugin, &ctx, &mut record.lifecycle)
            .await
        {
            self.deps.dispatcher.unregister_hooks(name).await;
            self.deps.commands.unregister_plugin(name).await;
            if let Err(e) = plugin.cleanup(ctx).await {
                warn!(plugin = %name, error = %e, "Cleanup after failed enable also failed");
            }
            record.status = PluginStatus::Error;
            record.context = None;
            self.deps.telemetry.increment("plugin.enable_failed", 1);
            error!(plugin = %name, error = %err, "Failed to enable plugin");
            return Err(err);
        }

        record.status = PluginStatus::Enabled;
        record.context = Some(ctx);
        drop(record);

        let elapsed = timer.finish();
        self.deps.telemetry.increment("plugin.enabled", 1);
        self.deps
            .telemetry
            .record_event("plugin.enabled", json!({ "plugin": name }));
        self.deps.events.emit(PluginEvent::Enabled {
            name: name.to_string(),
        });
        info!(
            plugin = %name,
            elapsed_ms = elapsed.as_millis() as u64,
            "Plugin enabled"
        );
        Ok(true)
    }

    async fn check_enable(
        &self,
        name: &str,
        plugin: &dyn Plugin,
        installed: &BTreeMap<String, Version>,
    ) -> AppResult<()> {
        if self.config.validate_on_enable {
            let report = self.deps.validation.validate(plugin).await;
            for warning in &report.warnings {
                warn!(plugin = %name, warning = %warning, "Plugin validation warning");
            }
            if !report.valid {
                return Err(AppError::validation(format!(
                    "Plugin '{name}' failed validation: {}",
                    report.errors.join("; ")
                )));
            }
        }

        let issues = self.deps.dependencies.check(plugin.manifest(), installed);
        if !issues.is_empty() {
            let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
            return Err(AppError::validation(format!(
                "Plugin '{name}' has unmet dependencies: {}",
                issues.join("; ")
            )));
        }
        Ok(())
    }

    async fn activate(
        &self,
        name: &str,
        plugin: &Arc<dyn Plugin>,
        ctx: &Arc<PluginContext>,
        lifecycle: &mut LifecycleMachine,
    ) -> AppResult<()> {
        lifecycle.transition(PluginState::Initializing).await?;
        lifecycle
            .transition_with(PluginState::Initialized, plugin.init(ctx.clone()))
            .await?;
        lifecycle.transition(PluginState::Activating).await?;

        for command in plugin.commands() {
            if let Err(e) = self
                .deps
                .commands
                .register(command, name, ctx.clone())
                .await
            {
                return Err(fail_activation(lifecycle, name, e));
            }
        }
        for hook in plugin.hooks() {
            if let Err(e) = self.deps.dispatcher.register_hook(hook, name).await {
                return Err(fail_activation(lifecycle, name, e));
            }
        }

        lifecycle
            .transition_with(PluginState::Active, plugin.on_activate(ctx.clone()))
            .await?;

        if let Err(e) = self.deps.registry.set_plugin_enabled(name, true).await {
            return Err(fail_activation(lifecycle, name, e));
        }
        Ok(())
    }

    /// Returns whether the plugin changed state.
    async fn disable_locked(&self, name: &str) -> AppResult<bool> {
        let slot = self.slot(name).await?;
        let mut record = slot.lock().await;
        let was_error = match record.status {
            PluginStatus::Installed | PluginStatus::Disabled => return Ok(false),
            PluginStatus::Enabled => false,
            PluginStatus::Error => true,
        };

        let timer = ProfileTimer::start(self.deps.profiler.clone(), "plugin.disable");
        let plugin = record.plugin.clone();
        let ctx = self.context_for(name, &record).await?;

        record.lifecycle.transition(PluginState::Deactivating).await?;
        let deactivated = if was_error {
            Ok(())
        } else {
            plugin.on_deactivate(ctx.clone()).await
        };
        let hooks = self.deps.dispatcher.unregister_hooks(name).await;
        let commands = self.deps.commands.unregister_plugin(name).await;
        let cleaned = if was_error {
            Ok(())
        } else {
            plugin.cleanup(ctx).await
        };
        record.context = None;
        self.deps.registry.set_plugin_enabled(name, false).await?;

        if let Err(e) = deactivated.and(cleaned) {
            let message = format!("{e:#}");
            record.lifecycle.fail(message.clone());
            record.status = PluginStatus::Error;
            error!(plugin = %name, error = %message, "Plugin failed to deactivate cleanly");
            return Err(AppError::lifecycle(format!(
                "Plugin '{name}' failed to deactivate: {message}"
            )));
        }

        record.lifecycle.transition(PluginState::Deactivated).await?;
        record.status = PluginStatus::Disabled;
        drop(record);

        let elapsed = timer.finish();
        self.deps.telemetry.increment("plugin.disabled", 1);
        self.deps.events.emit(PluginEvent::Disabled {
            name: name.to_string(),
        });
        info!(
            plugin = %name,
            hooks,
            commands,
            elapsed_ms = elapsed.as_millis() as u64,
            "Plugin disabled"
        );
        Ok(true)
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn ensure_initialized(&self) -> AppResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(AppError::not_initialized(
                "Plugin manager has not been initialized",
            ))
        }
    }

    async fn slot(&self, name: &str) -> AppResult<Slot> {
        self.plugins
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Plugin '{name}' is not installed")))
    }

    async fn slots(&self) -> Vec<Slot> {
        self.plugins.read().await.values().cloned().collect()
    }

    async fn insert_record(&self, record: PluginRecord) {
        let name = record.plugin.manifest().name.clone();
        self.plugins
            .write()
            .await
            .insert(name, Arc::new(Mutex::new(record)));
    }

    fn new_lifecycle(&self, name: &str) -> LifecycleMachine {
        let lifecycle = LifecycleMachine::new(name, self.config.history_limit);
        let events = self.deps.events.clone();
        let plugin = name.to_string();
        // Dropping the handle leaves the listener registered.
        let _ = lifecycle.on_state_change(move |from, to| {
            events.emit(PluginEvent::StateChanged {
                name: plugin.clone(),
                from: from.to_string(),
                to: to.to_string(),
            });
        });
        lifecycle
    }

    /// The live context, or a fresh one built from the registry record.
    async fn context_for(&self, name: &str, record: &PluginRecord) -> AppResult<Arc<PluginContext>> {
        if let Some(ctx) = &record.context {
            return Ok(ctx.clone());
        }
        let info = match self.deps.registry.get_plugin_info(name).await? {
            Some(info) => info,
            None => PluginInfo::from_plugin(record.plugin.as_ref(), &record.source),
        };
        self.deps
            .contexts
            .create_context(name, &info, ContextOptions::default())
            .await
    }

    /// Versions of every enabled plugin other than `except`.
    async fn enabled_versions(&self, except: &str) -> BTreeMap<String, Version> {
        let others: Vec<(String, Slot)> = self
            .plugins
            .read()
            .await
            .iter()
            .filter(|(name, _)| name.as_str() != except)
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();

        let mut versions = BTreeMap::new();
        for (name, slot) in others {
            let record = slot.lock().await;
            if record.status == PluginStatus::Enabled {
                versions.insert(name, record.plugin.manifest().version.clone());
            }
        }
        versions
    }

    /// Dependency order, falling back to the given order on a cycle.
    fn ordered(&self, manifests: &[PluginManifest]) -> Vec<String> {
        match self.deps.dependencies.load_order(manifests) {
            Ok(order) => order,
            Err(e) => {
                warn!(error = %e, "Could not order plugins by dependency");
                manifests.iter().map(|m| m.name.clone()).collect()
            }
        }
    }

    async fn fire(&self, hook: StandardHook, args: Vec<Value>) {
        let context = HookContext::new().with_source("plugin-manager");
        match self.deps.dispatcher.fire(hook.as_str(), context, args).await {
            Ok(result) if !result.success => {
                for failure in &result.errors {
                    warn!(hook = %hook, error = %failure, "Lifecycle hook handler failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(hook = %hook, error = %e, "Failed to fire lifecycle hook"),
        }
    }
}

fn fail_activation(lifecycle: &mut LifecycleMachine, name: &str, err: AppError) -> AppError {
    lifecycle.fail(err.to_string());
    AppError::with_source(
        ErrorKind::Lifecycle,
        format!("Plugin '{name}' failed to activate: {err}"),
        err,
    )
}
