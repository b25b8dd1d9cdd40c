//! Hook dispatcher: registers hooks and executes every hook of a name under
//! timeout, retry, parallelism, and error policies.
//!
//! Failures inside handlers are contained in the returned
//! [`HookExecutionResult`]; only invalid options fail a dispatch.
//!
//! Each handler invocation runs as its own tokio task raced against a timer.
//! On timeout the task is aborted, which stops it at its next await point;
//! blocking code inside a handler is not interrupted.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use plughost_core::config::hooks::HooksConfig;
use plughost_core::error::AppError;
use plughost_core::events::hook::HookEvent;
use plughost_core::result::AppResult;

use super::definitions::{
    Hook, HookArgs, HookContext, HookExecutionOptions, HookExecutionResult, HookFailure,
    HookFailureKind,
};
use super::registry::{HookEntry, HookInfo, HookRegistry, HookStats};
use crate::events::HookEventEmitter;

/// Options after applying dispatcher defaults.
#[derive(Debug, Clone, Copy)]
struct ResolvedOptions {
    timeout: Duration,
    parallel: bool,
    stop_on_error: bool,
    max_retries: u32,
    retry_delay: Duration,
}

/// What happened to one hook during a dispatch.
enum Outcome {
    /// A condition returned false.
    Skipped,
    /// A once-hook already consumed by a concurrent dispatch.
    AlreadyConsumed,
    /// A condition failed or timed out.
    ConditionFailed(HookFailure),
    /// The handler ran.
    Executed(Result<Value, HookFailure>),
}

/// Why a guarded task did not produce a value.
enum GuardError {
    Failed(String),
    TimedOut,
}

/// Dispatches hooks to all registered handlers.
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
    /// Notification sink.
    emitter: HookEventEmitter,
    /// Dispatch defaults.
    defaults: HooksConfig,
}

impl HookDispatcher {
    /// Creates a new hook dispatcher.
    pub fn new(registry: Arc<HookRegistry>, emitter: HookEventEmitter, defaults: HooksConfig) -> Self {
        Self {
            registry,
            emitter,
            defaults,
        }
    }

    /// Validates and registers `hook` for `plugin_name`, returning the
    /// registration id. Nothing is stored when validation fails.
    pub async fn register_hook(&self, hook: Hook, plugin_name: &str) -> AppResult<Uuid> {
        if plugin_name.trim().is_empty() {
            return Err(AppError::validation("Plugin name must not be empty"));
        }
        hook.validate()?;

        let entry = self.registry.insert(hook, plugin_name).await;
        info!(
            hook = %entry.hook.name,
            plugin = %plugin_name,
            priority = entry.hook.priority,
            "Hook registered"
        );
        self.emitter.emit(HookEvent::Registered {
            name: entry.hook.name.clone(),
            plugin: plugin_name.to_string(),
            priority: entry.hook.priority,
        });
        Ok(entry.id)
    }

    /// Removes every registration of `name` owned by `plugin_name`.
    pub async fn unregister_hook(&self, name: &str, plugin_name: &str) -> usize {
        let removed = self.registry.remove(name, plugin_name).await;
        if removed > 0 {
            info!(hook = %name, plugin = %plugin_name, removed, "Hook unregistered");
            self.emitter.emit(HookEvent::Unregistered {
                name: name.to_string(),
                plugin: plugin_name.to_string(),
            });
        }
        removed
    }

    /// Removes every hook owned by `plugin_name`.
    pub async fn unregister_hooks(&self, plugin_name: &str) -> usize {
        let count = self.registry.remove_plugin(plugin_name).await;
        info!(plugin = %plugin_name, count, "All hooks unregistered for plugin");
        self.emitter.emit(HookEvent::PluginHooksUnregistered {
            plugin: plugin_name.to_string(),
            count,
        });
        count
    }

    /// Executes every enabled hook registered for `name`.
    pub async fn execute_hooks(
        &self,
        name: &str,
        context: HookContext,
        options: &HookExecutionOptions,
        args: Vec<Value>,
    ) -> AppResult<HookExecutionResult> {
        let entries = self.registry.snapshot(name).await;
        if entries.is_empty() {
            return Ok(HookExecutionResult::empty());
        }
        let options = self.resolve_options(options)?;

        let mut context = context;
        context.hook_name = name.to_string();
        let context = Arc::new(context);
        let args: HookArgs = args.into();

        debug!(
            hook = %name,
            handler_count = entries.len(),
            parallel = options.parallel,
            "Dispatching hook"
        );

        let started = Instant::now();
        let mut result = HookExecutionResult::empty();

        if options.parallel {
            let runs = entries
                .iter()
                .map(|entry| self.run_entry(entry.clone(), context.clone(), args.clone(), options));
            for outcome in join_all(runs).await {
                Self::absorb(&mut result, name, outcome);
            }
        } else {
            for entry in &entries {
                let outcome = self
                    .run_entry(entry.clone(), context.clone(), args.clone(), options)
                    .await;
                let failed = Self::absorb(&mut result, name, outcome);
                if failed && options.stop_on_error {
                    warn!(hook = %name, plugin = %entry.plugin_name, "Stopping dispatch after failure");
                    break;
                }
            }
        }

        result.success = result.errors.is_empty();
        result.duration = started.elapsed();

        self.emitter.emit(HookEvent::Executed {
            name: name.to_string(),
            success: result.success,
            duration_ms: result.duration_ms(),
            executed: result.executed_hooks.len(),
            skipped: result.skipped_hooks.len(),
            errors: result.errors.len(),
        });
        Ok(result)
    }

    /// Executes `name` with default options.
    pub async fn fire(
        &self,
        name: &str,
        context: HookContext,
        args: Vec<Value>,
    ) -> AppResult<HookExecutionResult> {
        self.execute_hooks(name, context, &HookExecutionOptions::default(), args)
            .await
    }

    /// All registrations, optionally for one hook name.
    pub async fn get_hooks(&self, name: Option<&str>) -> Vec<HookInfo> {
        self.registry.entries(name).await
    }

    /// Registrations owned by `plugin_name`.
    pub async fn get_plugin_hooks(&self, plugin_name: &str) -> Vec<HookInfo> {
        self.registry.plugin_entries(plugin_name).await
    }

    /// Whether anything is registered for `name`.
    pub async fn has_hook(&self, name: &str) -> bool {
        self.registry.contains(name).await
    }

    /// Total number of registrations.
    pub async fn hook_count(&self) -> usize {
        self.registry.count(None).await
    }

    /// Sorted hook names with registrations.
    pub async fn hook_names(&self) -> Vec<String> {
        self.registry.names().await
    }

    /// Execution statistics, optionally for one hook name.
    pub fn hook_stats(&self, name: Option<&str>) -> Vec<HookStats> {
        self.registry.stats(name)
    }

    /// Hides or reveals every hook of a plugin to dispatch.
    pub async fn set_plugin_hooks_enabled(&self, plugin_name: &str, enabled: bool) -> usize {
        let touched = self.registry.set_plugin_enabled(plugin_name, enabled).await;
        debug!(plugin = %plugin_name, enabled, touched, "Plugin hooks toggled");
        touched
    }

    /// Drops every hook and statistic.
    pub async fn clear(&self) {
        self.registry.clear().await;
        info!("Hook registry cleared");
        self.emitter.emit(HookEvent::Cleared);
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    /// Returns the notification emitter.
    pub fn emitter(&self) -> &HookEventEmitter {
        &self.emitter
    }

    fn resolve_options(&self, options: &HookExecutionOptions) -> AppResult<ResolvedOptions> {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.defaults.default_timeout());
        if timeout.is_zero() {
            return Err(AppError::validation("Hook timeout must be positive"));
        }
        let max_retries = options
            .max_retries
            .unwrap_or(self.defaults.default_max_retries);
        if max_retries > self.defaults.max_retries_limit {
            return Err(AppError::validation(format!(
                "max_retries {} exceeds the limit of {}",
                max_retries, self.defaults.max_retries_limit
            )));
        }
        Ok(ResolvedOptions {
            timeout,
            parallel: options.parallel,
            stop_on_error: options.stop_on_error,
            max_retries,
            retry_delay: options
                .retry_delay
                .unwrap_or_else(|| self.defaults.default_retry_delay()),
        })
    }

    /// Folds one outcome into `result`. Returns whether it was a failure.
    fn absorb(result: &mut HookExecutionResult, name: &str, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Skipped => {
                result.skipped_hooks.push(name.to_string());
                false
            }
            Outcome::AlreadyConsumed => false,
            Outcome::ConditionFailed(failure) => {
                result.errors.push(failure);
                true
            }
            Outcome::Executed(Ok(value)) => {
                result.executed_hooks.push(name.to_string());
                result.results.push(value);
                false
            }
            Outcome::Executed(Err(failure)) => {
                result.executed_hooks.push(name.to_string());
                result.errors.push(failure);
                true
            }
        }
    }

    async fn run_entry(
        &self,
        entry: Arc<HookEntry>,
        context: Arc<HookContext>,
        args: HookArgs,
        options: ResolvedOptions,
    ) -> Outcome {
        let timeout = entry.hook.timeout.unwrap_or(options.timeout);

        for (index, condition) in entry.hook.conditions.iter().enumerate() {
            let condition = condition.clone();
            let (ctx, a) = (context.clone(), args.clone());
            match guarded(async move { condition.check(ctx, a).await }, timeout).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(hook = %entry.hook.name, plugin = %entry.plugin_name, index, "Hook skipped by condition");
                    return Outcome::Skipped;
                }
                Err(err) => {
                    let message = match err {
                        GuardError::Failed(msg) => format!("Condition {index} failed: {msg}"),
                        GuardError::TimedOut => format!(
                            "Condition {index} timed out after {}ms",
                            timeout.as_millis()
                        ),
                    };
                    warn!(hook = %entry.hook.name, plugin = %entry.plugin_name, %message, "Hook condition error");
                    return Outcome::ConditionFailed(failure(
                        &entry,
                        HookFailureKind::Condition,
                        0,
                        message,
                    ));
                }
            }
        }

        if entry.hook.once && !entry.try_consume() {
            return Outcome::AlreadyConsumed;
        }

        let started = Instant::now();
        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            let handler = entry.hook.handler.clone();
            let (ctx, a) = (context.clone(), args.clone());
            let error = match guarded(async move { handler.handle(ctx, a).await }, timeout).await {
                Ok(value) => break Ok(value),
                Err(GuardError::Failed(msg)) => (HookFailureKind::Execution, msg),
                Err(GuardError::TimedOut) => (
                    HookFailureKind::Timeout,
                    format!(
                        "Hook '{}' timed out after {}ms",
                        entry.hook.name,
                        timeout.as_millis()
                    ),
                ),
            };

            if attempts <= options.max_retries {
                warn!(
                    hook = %entry.hook.name,
                    plugin = %entry.plugin_name,
                    attempt = attempts,
                    error = %error.1,
                    "Hook attempt failed, retrying"
                );
                tokio::time::sleep(options.retry_delay).await;
                continue;
            }

            error!(
                hook = %entry.hook.name,
                plugin = %entry.plugin_name,
                attempts,
                error = %error.1,
                "Hook failed"
            );
            break Err(failure(&entry, error.0, attempts, error.1));
        };

        entry.record_execution();
        self.registry
            .record(&entry.hook.name, started.elapsed(), outcome.is_err());

        if entry.hook.once && self.registry.remove_by_id(&entry.hook.name, entry.id).await {
            debug!(hook = %entry.hook.name, plugin = %entry.plugin_name, "Once hook unregistered");
            self.emitter.emit(HookEvent::Unregistered {
                name: entry.hook.name.clone(),
                plugin: entry.plugin_name.clone(),
            });
        }

        Outcome::Executed(outcome)
    }
}

fn failure(entry: &HookEntry, kind: HookFailureKind, attempts: u32, message: String) -> HookFailure {
    HookFailure {
        hook_id: entry.id,
        hook_name: entry.hook.name.clone(),
        plugin_name: entry.plugin_name.clone(),
        kind,
        attempts,
        message,
    }
}

/// Runs `fut` as its own task, bounded by `timeout`. The task is aborted
/// when the timer wins; a panic is reported as a failure.
async fn guarded<T, F>(fut: F, timeout: Duration) -> Result<T, GuardError>
where
    T: Send + 'static,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let mut task = tokio::spawn(fut);
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(err))) => Err(GuardError::Failed(format!("{err:#}"))),
        Ok(Err(join_err)) if join_err.is_panic() => {
            Err(GuardError::Failed("handler panicked".to_string()))
        }
        Ok(Err(join_err)) => Err(GuardError::Failed(join_err.to_string())),
        Err(_) => {
            task.abort();
            Err(GuardError::TimedOut)
        }
    }
}
