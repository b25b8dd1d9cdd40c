//! Runtime bootstrap: wires the container, dispatcher, commands, and manager.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};

use plughost_core::config::RuntimeConfig;
use plughost_core::result::AppResult;

use crate::api::context::{ContextFactory, ContextServices, DefaultContextFactory};
use crate::commands::{CommandExecutor, CommandRegistry};
use crate::container::ServiceContainer;
use crate::hooks::definitions::{HookContext, StandardHook};
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::registry::HookRegistry;
use crate::installer::{BuiltinInstaller, PluginInstaller};
use crate::manager::{ManagerDeps, PluginManager};
use crate::registry::{MemoryPluginRegistry, PluginRegistry};
use crate::validation::{ManifestValidator, PluginValidator, ValidationService};

/// A fully wired plugin runtime.
#[derive(Debug)]
pub struct PluginRuntime {
    config: RuntimeConfig,
    container: Arc<ServiceContainer>,
    dispatcher: Arc<HookDispatcher>,
    commands: Arc<CommandRegistry>,
    executor: CommandExecutor,
    manager: Arc<PluginManager>,
    validation: Arc<ValidationService>,
}

impl PluginRuntime {
    /// Wires a runtime with the default collaborators.
    pub fn bootstrap(config: RuntimeConfig) -> AppResult<Self> {
        RuntimeBuilder::new(config).build()
    }

    /// Starts a builder for overriding collaborators.
    pub fn builder(config: RuntimeConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    /// Initializes the plugin manager and fires `system:startup`.
    pub async fn start(&self) -> AppResult<()> {
        self.manager.initialize().await?;
        self.fire_system(StandardHook::SystemStartup).await;
        info!(
            plugins = self.manager.list().await.len(),
            hooks = self.dispatcher.hook_count().await,
            commands = self.commands.count().await,
            "Plugin runtime started"
        );
        Ok(())
    }

    /// Fires `system:shutdown` and disables every plugin.
    pub async fn stop(&self) -> AppResult<()> {
        self.fire_system(StandardHook::SystemShutdown).await;
        self.manager.shutdown().await?;
        info!("Plugin runtime stopped");
        Ok(())
    }

    /// Runs a registered command by name or alias.
    pub async fn execute_command(&self, name: &str, args: Vec<String>) -> AppResult<Value> {
        self.executor.execute(name, args).await
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Service container.
    pub fn container(&self) -> &Arc<ServiceContainer> {
        &self.container
    }

    /// Hook dispatcher.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    /// Command registry.
    pub fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Command executor.
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Plugin manager.
    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Validation service.
    pub fn validation(&self) -> &Arc<ValidationService> {
        &self.validation
    }

    async fn fire_system(&self, hook: StandardHook) {
        let context = HookContext::new()
            .with_source("runtime")
            .with_data("version", json!(env!("CARGO_PKG_VERSION")));
        match self.dispatcher.fire(hook.as_str(), context, Vec::new()).await {
            Ok(result) => {
                for failure in &result.errors {
                    warn!(hook = %hook, error = %failure, "System hook handler failed");
                }
            }
            Err(e) => warn!(hook = %hook, error = %e, "Failed to fire system hook"),
        }
    }
}

/// Builds a [`PluginRuntime`], falling back to in-memory defaults.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    container: Option<Arc<ServiceContainer>>,
    installer: Option<Arc<dyn PluginInstaller>>,
    registry: Option<Arc<dyn PluginRegistry>>,
    contexts: Option<Arc<dyn ContextFactory>>,
    validator: Option<Arc<dyn PluginValidator>>,
}

impl RuntimeBuilder {
    /// Creates a builder.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            container: None,
            installer: None,
            registry: None,
            contexts: None,
            validator: None,
        }
    }

    /// Uses a pre-populated service container.
    pub fn with_container(mut self, container: Arc<ServiceContainer>) -> Self {
        self.container = Some(container);
        self
    }

    /// Uses a custom plugin installer.
    pub fn with_installer(mut self, installer: Arc<dyn PluginInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Uses a custom plugin registry.
    pub fn with_registry(mut self, registry: Arc<dyn PluginRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses a custom context factory.
    pub fn with_context_factory(mut self, contexts: Arc<dyn ContextFactory>) -> Self {
        self.contexts = Some(contexts);
        self
    }

    /// Uses a custom plugin validator.
    pub fn with_validator(mut self, validator: Arc<dyn PluginValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Resolves services and wires the runtime.
    pub fn build(self) -> AppResult<PluginRuntime> {
        let config = self.config;
        let container = self
            .container
            .unwrap_or_else(|| Arc::new(ServiceContainer::with_defaults(&config)));

        let telemetry = container.telemetry()?;
        let dependencies = container.dependency_manager()?;
        let sandbox = container.sandbox()?;
        let profiler = container.profiler()?;
        let events = container.event_emitter()?;
        let typed_hooks = container.typed_hooks()?;
        let hook_factory = container.hook_factory()?;

        let dispatcher = Arc::new(HookDispatcher::new(
            Arc::new(HookRegistry::new()),
            events.clone(),
            config.hooks.clone(),
        ));
        let commands = Arc::new(CommandRegistry::new(events.clone()));
        let executor = CommandExecutor::new(commands.clone(), dispatcher.clone());

        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(ManifestValidator::new(typed_hooks)));
        let validation = Arc::new(ValidationService::new(
            validator,
            config.plugins.validation_cache_capacity,
            config.plugins.validation_cache_ttl(),
        ));

        let contexts = match self.contexts {
            Some(contexts) => contexts,
            None => Arc::new(DefaultContextFactory::new(
                ContextServices {
                    telemetry: telemetry.clone(),
                    dependencies: dependencies.clone(),
                    sandbox,
                    events: events.clone(),
                    hook_factory,
                },
                config.plugins.clone(),
            )),
        };

        let manager = Arc::new(PluginManager::new(
            config.plugins.clone(),
            ManagerDeps {
                dispatcher: dispatcher.clone(),
                commands: commands.clone(),
                registry: self
                    .registry
                    .unwrap_or_else(|| Arc::new(MemoryPluginRegistry::new())),
                installer: self
                    .installer
                    .unwrap_or_else(|| Arc::new(BuiltinInstaller::new())),
                contexts,
                validation: validation.clone(),
                dependencies,
                telemetry,
                profiler,
                events,
            },
        ));

        info!(
            services = container.registered_keys().len(),
            "Plugin runtime wired"
        );

        Ok(PluginRuntime {
            config,
            container,
            dispatcher,
            commands,
            executor,
            manager,
            validation,
        })
    }
}
