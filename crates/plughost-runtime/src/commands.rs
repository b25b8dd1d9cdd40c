//! Plugin commands: registration by owning plugin and execution wrapped in
//! the `command:*` hooks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use plughost_core::error::AppError;
use plughost_core::events::plugin::PluginEvent;
use plughost_core::result::AppResult;

use crate::api::context::PluginContext;
use crate::events::HookEventEmitter;
use crate::hooks::definitions::{HookContext, HookExecutionResult, StandardHook};
use crate::hooks::dispatcher::HookDispatcher;

static COMMAND_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]*(?::[a-z0-9_-]+)*$").expect("command name pattern compiles")
});

/// Returns whether `name` is a valid command or alias name.
pub fn is_valid_command_name(name: &str) -> bool {
    name.len() <= 128 && COMMAND_NAME_PATTERN.is_match(name)
}

/// Trait for command handler implementations.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Runs the command with its string arguments.
    async fn run(&self, ctx: Arc<PluginContext>, args: Vec<String>) -> anyhow::Result<Value>;
}

type CommandFn =
    Box<dyn Fn(Arc<PluginContext>, Vec<String>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A closure-based command handler.
pub struct FnCommand {
    handler: CommandFn,
}

impl FnCommand {
    /// Wraps an async closure.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<PluginContext>, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            handler: Box::new(move |ctx, args| handler(ctx, args).boxed()),
        }
    }
}

#[async_trait]
impl CommandHandler for FnCommand {
    async fn run(&self, ctx: Arc<PluginContext>, args: Vec<String>) -> anyhow::Result<Value> {
        (self.handler)(ctx, args).await
    }
}

/// A command contributed by a plugin.
#[derive(Clone)]
pub struct Command {
    /// Command name.
    pub name: String,
    /// Help text.
    pub description: String,
    /// Alternative names.
    pub aliases: Vec<String>,
    /// The handler.
    pub handler: Arc<dyn CommandHandler>,
}

impl Command {
    /// Creates a command around an existing handler.
    pub fn new(name: impl Into<String>, handler: Arc<dyn CommandHandler>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            aliases: Vec::new(),
            handler,
        }
    }

    /// Creates a command from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<PluginContext>, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, Arc::new(FnCommand::new(handler)))
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds an alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Checks the command shape.
    pub fn validate(&self) -> AppResult<()> {
        for name in std::iter::once(&self.name).chain(self.aliases.iter()) {
            if !is_valid_command_name(name) {
                return Err(AppError::validation(format!("Invalid command name '{name}'")));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// Read-only view of a registered command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandInfo {
    /// Command name.
    pub name: String,
    /// Help text.
    pub description: String,
    /// Alternative names.
    pub aliases: Vec<String>,
    /// Owning plugin.
    pub plugin_name: String,
}

#[derive(Clone)]
struct RegisteredCommand {
    command: Command,
    plugin_name: String,
    context: Arc<PluginContext>,
}

impl RegisteredCommand {
    fn info(&self) -> CommandInfo {
        CommandInfo {
            name: self.command.name.clone(),
            description: self.command.description.clone(),
            aliases: self.command.aliases.clone(),
            plugin_name: self.plugin_name.clone(),
        }
    }
}

#[derive(Default)]
struct CommandTable {
    commands: HashMap<String, RegisteredCommand>,
    /// Alias → command name.
    aliases: HashMap<String, String>,
}

impl CommandTable {
    fn owner_of(&self, name: &str) -> Option<&str> {
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.commands.get(canonical).map(|c| c.plugin_name.as_str())
    }

    fn remove(&mut self, name: &str) -> Option<RegisteredCommand> {
        let removed = self.commands.remove(name)?;
        self.aliases.retain(|_, target| target != name);
        Some(removed)
    }
}

/// Commands registered by enabled plugins.
pub struct CommandRegistry {
    table: RwLock<CommandTable>,
    events: HookEventEmitter,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new(events: HookEventEmitter) -> Self {
        Self {
            table: RwLock::new(CommandTable::default()),
            events,
        }
    }

    /// Registers `command` for `plugin_name`. A plugin may replace its own
    /// command; a name or alias owned by another plugin is a conflict.
    pub async fn register(
        &self,
        command: Command,
        plugin_name: &str,
        context: Arc<PluginContext>,
    ) -> AppResult<()> {
        command.validate()?;

        let mut table = self.table.write().await;
        for name in std::iter::once(&command.name).chain(command.aliases.iter()) {
            if let Some(owner) = table.owner_of(name)
                && owner != plugin_name
            {
                return Err(AppError::conflict(format!(
                    "Command '{name}' is already registered by plugin '{owner}'"
                )));
            }
        }

        table.remove(&command.name);
        for alias in &command.aliases {
            table.aliases.insert(alias.clone(), command.name.clone());
        }
        let name = command.name.clone();
        table.commands.insert(
            name.clone(),
            RegisteredCommand {
                command,
                plugin_name: plugin_name.to_string(),
                context,
            },
        );
        drop(table);

        info!(command = %name, plugin = %plugin_name, "Command registered");
        self.events.emit(PluginEvent::CommandRegistered {
            plugin: plugin_name.to_string(),
            command: name,
        });
        Ok(())
    }

    /// Removes `name` if `plugin_name` owns it.
    pub async fn unregister(&self, name: &str, plugin_name: &str) -> AppResult<()> {
        let mut table = self.table.write().await;
        match table.commands.get(name) {
            None => return Err(AppError::not_found(format!("Command '{name}' not found"))),
            Some(c) if c.plugin_name != plugin_name => {
                return Err(AppError::conflict(format!(
                    "Command '{name}' is owned by plugin '{}'",
                    c.plugin_name
                )));
            }
            Some(_) => {}
        }
        table.remove(name);
        drop(table);

        debug!(command = %name, plugin = %plugin_name, "Command unregistered");
        self.events.emit(PluginEvent::CommandUnregistered {
            plugin: plugin_name.to_string(),
            command: name.to_string(),
        });
        Ok(())
    }

    /// Removes every command owned by `plugin_name` under one write lock.
    pub async fn unregister_plugin(&self, plugin_name: &str) -> usize {
        let mut table = self.table.write().await;
        let owned: Vec<String> = table
            .commands
            .values()
            .filter(|c| c.plugin_name == plugin_name)
            .map(|c| c.command.name.clone())
            .collect();
        for name in &owned {
            table.remove(name);
        }
        drop(table);

        for name in &owned {
            self.events.emit(PluginEvent::CommandUnregistered {
                plugin: plugin_name.to_string(),
                command: name.clone(),
            });
        }
        owned.len()
    }

    /// Looks up a command by name or alias.
    pub async fn get(&self, name: &str) -> Option<CommandInfo> {
        let table = self.table.read().await;
        let canonical = table.aliases.get(name).map(String::as_str).unwrap_or(name);
        table.commands.get(canonical).map(RegisteredCommand::info)
    }

    /// Whether a command or alias exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.table.read().await.owner_of(name).is_some()
    }

    /// All commands sorted by name.
    pub async fn list(&self) -> Vec<CommandInfo> {
        let table = self.table.read().await;
        let mut all: Vec<CommandInfo> = table.commands.values().map(RegisteredCommand::info).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Commands owned by `plugin_name`.
    pub async fn plugin_commands(&self, plugin_name: &str) -> Vec<CommandInfo> {
        self.list()
            .await
            .into_iter()
            .filter(|c| c.plugin_name == plugin_name)
            .collect()
    }

    /// Number of registered commands.
    pub async fn count(&self) -> usize {
        self.table.read().await.commands.len()
    }

    async fn resolve(&self, name: &str) -> Option<RegisteredCommand> {
        let table = self.table.read().await;
        let canonical = table.aliases.get(name).map(String::as_str).unwrap_or(name);
        table.commands.get(canonical).cloned()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry").finish()
    }
}

/// Runs commands between the `command:before` and `command:after` /
/// `command:error` hooks.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    commands: Arc<CommandRegistry>,
    dispatcher: Arc<HookDispatcher>,
}

impl CommandExecutor {
    /// Creates an executor.
    pub fn new(commands: Arc<CommandRegistry>, dispatcher: Arc<HookDispatcher>) -> Self {
        Self {
            commands,
            dispatcher,
        }
    }

    /// Executes `name` with `args`.
    ///
    /// Hook failures are logged and never change the command outcome.
    pub async fn execute(&self, name: &str, args: Vec<String>) -> AppResult<Value> {
        let registered = self
            .commands
            .resolve(name)
            .await
            .ok_or_else(|| AppError::not_found(format!("Command '{name}' not found")))?;
        let command = registered.command.name.clone();
        let args_value = Value::from(args.clone());

        self.fire(
            StandardHook::CommandBefore,
            &registered.plugin_name,
            vec![Value::from(command.as_str()), args_value.clone()],
        )
        .await;

        match registered
            .command
            .handler
            .run(registered.context.clone(), args)
            .await
        {
            Ok(value) => {
                self.fire(
                    StandardHook::CommandAfter,
                    &registered.plugin_name,
                    vec![Value::from(command.as_str()), args_value, value.clone()],
                )
                .await;
                Ok(value)
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(command = %command, plugin = %registered.plugin_name, error = %message, "Command failed");
                self.fire(
                    StandardHook::CommandError,
                    &registered.plugin_name,
                    vec![Value::from(command.as_str()), args_value, Value::from(message.as_str())],
                )
                .await;
                Err(AppError::hook_execution(format!(
                    "Command '{command}' failed: {message}"
                )))
            }
        }
    }

    async fn fire(&self, hook: StandardHook, plugin_name: &str, args: Vec<Value>) {
        let context = HookContext::new().with_source(plugin_name);
        match self.dispatcher.fire(hook.as_str(), context, args).await {
            Ok(HookExecutionResult { success: false, errors, .. }) => {
                warn!(hook = %hook, errors = errors.len(), "Command hook reported failures");
            }
            Ok(_) => {}
            Err(err) => warn!(hook = %hook, error = %err, "Command hook dispatch failed"),
        }
    }
}
