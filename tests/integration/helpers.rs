//! Shared test helpers for integration tests.

use std::sync::{Arc, Mutex};

use futures::future::{Ready, ready};
use serde_json::{Value, json};

use plughost_core::config::RuntimeConfig;
use plughost_runtime::PluginRuntime;
use plughost_runtime::api::context::PluginContext;
use plughost_runtime::builder::PluginBuilder;
use plughost_runtime::commands::Command;
use plughost_runtime::hooks::definitions::Hook;
use plughost_runtime::hooks::dispatcher::HookDispatcher;
use plughost_runtime::installer::BuiltinInstaller;
use plughost_runtime::manager::PluginManager;
use plughost_runtime::manifest::{Plugin, PluginManifest};
use plughost_runtime::registry::MemoryPluginRegistry;

/// Ordered record of callbacks and handler invocations.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

/// Test configuration with short timeouts and a temp data directory.
pub fn test_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.hooks.default_timeout_ms = 2_000;
    config.hooks.default_retry_delay_ms = 10;
    config.plugins.data_directory = std::env::temp_dir()
        .join("plughost-integration")
        .to_string_lossy()
        .into_owned();
    config
}

/// A runtime plus handles to its in-memory collaborators.
pub struct TestRuntime {
    pub runtime: PluginRuntime,
    pub installer: Arc<BuiltinInstaller>,
    pub registry: Arc<MemoryPluginRegistry>,
}

impl TestRuntime {
    /// Creates and starts a runtime with empty collaborators.
    pub async fn new() -> Self {
        let app = Self::unstarted(BuiltinInstaller::new(), MemoryPluginRegistry::new());
        app.runtime.start().await.expect("Failed to start runtime");
        app
    }

    /// Creates a runtime without initializing the plugin manager.
    pub fn unstarted(installer: BuiltinInstaller, registry: MemoryPluginRegistry) -> Self {
        let installer = Arc::new(installer);
        let registry = Arc::new(registry);
        let runtime = PluginRuntime::builder(test_config())
            .with_installer(installer.clone())
            .with_registry(registry.clone())
            .build()
            .expect("Failed to build runtime");
        Self {
            runtime,
            installer,
            registry,
        }
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        self.runtime.manager()
    }

    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        self.runtime.dispatcher()
    }

    /// Adds `plugin` to the installer catalog under its own name.
    pub fn provide(&self, plugin: impl Fn() -> Arc<dyn Plugin> + Send + Sync + 'static) {
        let name = plugin().manifest().name.clone();
        self.installer.register_source(name, plugin);
    }
}

pub fn manifest(name: &str, version: &str) -> PluginManifest {
    PluginManifest::parse(name, version)
        .expect("valid manifest")
        .with_description(format!("{name} test plugin"))
}

/// Phase callback that appends `<plugin>:<phase>` to `log`.
pub fn record(
    log: &CallLog,
    plugin: &str,
    phase: &str,
) -> impl Fn(Arc<PluginContext>) -> Ready<anyhow::Result<()>> + Send + Sync + 'static {
    let log = log.clone();
    let entry = format!("{plugin}:{phase}");
    move |_ctx| {
        log.push(entry.clone());
        ready(Ok(()))
    }
}

/// Builder for a plugin with one `test:ping` hook, one `<name>:hello`
/// command, and every lifecycle callback recorded in `log`.
pub fn sample_builder(name: &str, version: &str, log: &CallLog) -> PluginBuilder {
    let hook_log = log.clone();
    let owner = name.to_string();

    PluginBuilder::new(manifest(name, version))
        .hook(Hook::from_fn("test:ping", move |_ctx, _args| {
            let log = hook_log.clone();
            let owner = owner.clone();
            async move {
                log.push(format!("{owner}:ping"));
                Ok(json!(owner))
            }
        }))
        .command(Command::from_fn(format!("{name}:hello"), |ctx, args| async move {
            Ok(json!({ "plugin": ctx.plugin_name(), "args": args }))
        }))
        .on_install(record(log, name, "install"))
        .on_init(record(log, name, "init"))
        .on_activate(record(log, name, "activate"))
        .on_deactivate(record(log, name, "deactivate"))
        .on_cleanup(record(log, name, "cleanup"))
        .on_uninstall(record(log, name, "uninstall"))
}

pub fn sample_plugin(name: &str, version: &str, log: &CallLog) -> Arc<dyn Plugin> {
    sample_builder(name, version, log).build_arc()
}

/// Hook returning `value` at `priority`.
pub fn value_hook(name: &str, priority: i32, value: Value) -> Hook {
    Hook::from_fn(name, move |_ctx, _args| {
        let value = value.clone();
        async move { Ok(value) }
    })
    .with_priority(priority)
}
