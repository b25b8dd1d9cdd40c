//! Hook records, handler traits, dispatch options, and dispatch results.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use plughost_core::error::AppError;
use plughost_core::result::AppResult;

/// Maximum length of a hook name.
pub const MAX_HOOK_NAME_LEN: usize = 128;

static HOOK_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_.-]*(?::[A-Za-z0-9_.-]+)*$").expect("hook name pattern compiles")
});

/// Returns whether `name` is a valid extension-point identifier,
/// e.g. `command:before`.
pub fn is_valid_hook_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_HOOK_NAME_LEN && HOOK_NAME_PATTERN.is_match(name)
}

/// Extension points fired by the runtime itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardHook {
    /// Fired once the runtime has booted.
    SystemStartup,
    /// Fired before the runtime shuts down.
    SystemShutdown,
    /// Fired before a plugin command runs.
    CommandBefore,
    /// Fired after a plugin command succeeded.
    CommandAfter,
    /// Fired after a plugin command failed.
    CommandError,
    /// Fired after a plugin was installed.
    PluginInstalled,
    /// Fired after a plugin was enabled.
    PluginEnabled,
    /// Fired after a plugin was disabled.
    PluginDisabled,
    /// Fired after a plugin was uninstalled.
    PluginUninstalled,
    /// Fired when runtime or plugin configuration changes.
    ConfigChanged,
}

impl StandardHook {
    /// All standard hooks.
    pub const ALL: [StandardHook; 10] = [
        Self::SystemStartup,
        Self::SystemShutdown,
        Self::CommandBefore,
        Self::CommandAfter,
        Self::CommandError,
        Self::PluginInstalled,
        Self::PluginEnabled,
        Self::PluginDisabled,
        Self::PluginUninstalled,
        Self::ConfigChanged,
    ];

    /// Returns the hook name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemStartup => "system:startup",
            Self::SystemShutdown => "system:shutdown",
            Self::CommandBefore => "command:before",
            Self::CommandAfter => "command:after",
            Self::CommandError => "command:error",
            Self::PluginInstalled => "plugin:installed",
            Self::PluginEnabled => "plugin:enabled",
            Self::PluginDisabled => "plugin:disabled",
            Self::PluginUninstalled => "plugin:uninstalled",
            Self::ConfigChanged => "config:changed",
        }
    }

    /// One-line description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::SystemStartup => "Runtime finished booting",
            Self::SystemShutdown => "Runtime is shutting down",
            Self::CommandBefore => "A plugin command is about to run",
            Self::CommandAfter => "A plugin command completed successfully",
            Self::CommandError => "A plugin command failed",
            Self::PluginInstalled => "A plugin was installed",
            Self::PluginEnabled => "A plugin was enabled",
            Self::PluginDisabled => "A plugin was disabled",
            Self::PluginUninstalled => "A plugin was uninstalled",
            Self::ConfigChanged => "Configuration changed",
        }
    }

    /// Names of the positional arguments passed to handlers.
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            Self::SystemStartup | Self::SystemShutdown => &[],
            Self::CommandBefore => &["command", "args"],
            Self::CommandAfter => &["command", "args", "result"],
            Self::CommandError => &["command", "args", "error"],
            Self::PluginInstalled
            | Self::PluginEnabled
            | Self::PluginDisabled
            | Self::PluginUninstalled => &["plugin"],
            Self::ConfigChanged => &["plugin", "config"],
        }
    }
}

impl std::fmt::Display for StandardHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-supplied context passed to every handler of a dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    /// The hook being dispatched; set by the dispatcher.
    pub hook_name: String,
    /// Subsystem or plugin that triggered the dispatch.
    pub source: Option<String>,
    /// Arbitrary data keyed by string.
    pub data: HashMap<String, Value>,
    /// When the context was created.
    pub created_at: DateTime<Utc>,
}

impl HookContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self {
            hook_name: String::new(),
            source: None,
            data: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Sets the triggering source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Inserts a data value.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Inserts a string value.
    pub fn with_string(self, key: &str, value: &str) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Gets a data value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a string data value.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}

impl Default for HookContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Positional arguments shared by every handler of a dispatch.
pub type HookArgs = Arc<[Value]>;

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handles one invocation. The returned value is collected into the
    /// dispatch results.
    async fn handle(&self, context: Arc<HookContext>, args: HookArgs) -> anyhow::Result<Value>;
}

type HandlerFn =
    Box<dyn Fn(Arc<HookContext>, HookArgs) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// A closure-based hook handler.
pub struct FnHandler {
    handler: HandlerFn,
}

impl FnHandler {
    /// Wraps an async closure.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Arc<HookContext>, HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            handler: Box::new(move |context, args| handler(context, args).boxed()),
        }
    }
}

impl std::fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("handler", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl HookHandler for FnHandler {
    async fn handle(&self, context: Arc<HookContext>, args: HookArgs) -> anyhow::Result<Value> {
        (self.handler)(context, args).await
    }
}

/// Guard predicate evaluated before a hook runs.
#[async_trait]
pub trait HookCondition: Send + Sync {
    /// Returns `false` to skip the hook for this dispatch.
    async fn check(&self, context: Arc<HookContext>, args: HookArgs) -> anyhow::Result<bool>;
}

type ConditionFn =
    Box<dyn Fn(Arc<HookContext>, HookArgs) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

/// A closure-based condition.
pub struct FnCondition {
    predicate: ConditionFn,
}

impl FnCondition {
    /// Wraps an async predicate.
    pub fn new<F, Fut>(predicate: F) -> Self
    where
        F: Fn(Arc<HookContext>, HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self {
            predicate: Box::new(move |context, args| predicate(context, args).boxed()),
        }
    }
}

#[async_trait]
impl HookCondition for FnCondition {
    async fn check(&self, context: Arc<HookContext>, args: HookArgs) -> anyhow::Result<bool> {
        (self.predicate)(context, args).await
    }
}

/// A hook: a handler attached to a named extension point.
#[derive(Clone)]
pub struct Hook {
    /// Extension-point name, e.g. `command:after`.
    pub name: String,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
    /// Higher runs earlier. Must be non-negative.
    pub priority: i32,
    /// Unregister after the first execution.
    pub once: bool,
    /// Overrides the dispatch timeout.
    pub timeout: Option<Duration>,
    /// All must pass for the hook to run, evaluated in order.
    pub conditions: Vec<Arc<dyn HookCondition>>,
    /// Disabled hooks are invisible to dispatch.
    pub enabled: bool,
    /// Optional description.
    pub description: Option<String>,
}

impl Hook {
    /// Creates an enabled hook with priority 0.
    pub fn new(name: impl Into<String>, handler: Arc<dyn HookHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            priority: 0,
            once: false,
            timeout: None,
            conditions: Vec::new(),
            enabled: true,
            description: None,
        }
    }

    /// Creates a hook from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<HookContext>, HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::new(name, Arc::new(FnHandler::new(handler)))
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Marks the hook as run-once.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Sets a per-hook timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Appends a condition.
    pub fn with_condition(mut self, condition: Arc<dyn HookCondition>) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Appends a closure condition.
    pub fn with_condition_fn<F, Fut>(self, predicate: F) -> Self
    where
        F: Fn(Arc<HookContext>, HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.with_condition(Arc::new(FnCondition::new(predicate)))
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks the hook shape.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Hook name must not be empty"));
        }
        if !is_valid_hook_name(&self.name) {
            return Err(AppError::validation(format!(
                "Invalid hook name '{}': expected identifiers separated by ':'",
                self.name
            )));
        }
        if self.priority < 0 {
            return Err(AppError::validation(format!(
                "Hook '{}' has negative priority {}",
                self.name, self.priority
            )));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(AppError::validation(format!(
                "Hook '{}' timeout must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("once", &self.once)
            .field("timeout", &self.timeout)
            .field("conditions", &self.conditions.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Per-dispatch overrides. Unset fields fall back to the dispatcher defaults.
#[derive(Debug, Clone, Default)]
pub struct HookExecutionOptions {
    /// Per-hook timeout when the hook sets none.
    pub timeout: Option<Duration>,
    /// Start every eligible hook concurrently.
    pub parallel: bool,
    /// Abort the remaining hooks after the first failure (sequential only).
    pub stop_on_error: bool,
    /// Additional attempts after a failure.
    pub max_retries: Option<u32>,
    /// Delay between attempts.
    pub retry_delay: Option<Duration>,
}

impl HookExecutionOptions {
    /// Options that use every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs hooks concurrently.
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Stops at the first failure.
    pub fn stop_on_error(mut self) -> Self {
        self.stop_on_error = true;
        self
    }

    /// Sets the default per-hook timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = Some(max_retries);
        self.retry_delay = Some(retry_delay);
        self
    }
}

/// Category of a contained hook failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookFailureKind {
    /// The handler returned an error or panicked.
    Execution,
    /// The handler exceeded its time budget.
    Timeout,
    /// A guard condition failed or timed out.
    Condition,
}

impl std::fmt::Display for HookFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execution => write!(f, "execution"),
            Self::Timeout => write!(f, "timeout"),
            Self::Condition => write!(f, "condition"),
        }
    }
}

/// A hook failure recorded in a dispatch result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} failure in hook '{hook_name}' ({plugin_name}) after {attempts} attempt(s): {message}")]
pub struct HookFailure {
    /// Registration id of the failing hook.
    pub hook_id: Uuid,
    /// Hook name.
    pub hook_name: String,
    /// Owning plugin.
    pub plugin_name: String,
    /// Failure category.
    pub kind: HookFailureKind,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Underlying cause.
    pub message: String,
}

/// Aggregated outcome of one dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct HookExecutionResult {
    /// True iff no failures were recorded.
    pub success: bool,
    /// Successful handler values, in priority order.
    pub results: Vec<Value>,
    /// Contained failures.
    pub errors: Vec<HookFailure>,
    /// Wall-clock duration of the dispatch.
    pub duration: Duration,
    /// Hook names that ran, regardless of outcome.
    pub executed_hooks: Vec<String>,
    /// Hook names skipped by a condition returning false.
    pub skipped_hooks: Vec<String>,
}

impl HookExecutionResult {
    /// A successful result for a dispatch with no hooks.
    pub fn empty() -> Self {
        Self {
            success: true,
            results: Vec::new(),
            errors: Vec::new(),
            duration: Duration::ZERO,
            executed_hooks: Vec::new(),
            skipped_hooks: Vec::new(),
        }
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}
