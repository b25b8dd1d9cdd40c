//! Known hook definitions and a factory that applies registration defaults.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use plughost_core::error::AppError;
use plughost_core::result::AppResult;

use super::definitions::{Hook, HookArgs, HookContext, HookHandler, StandardHook, is_valid_hook_name};

/// Declared extension point.
#[derive(Debug, Clone, Serialize)]
pub struct HookDefinition {
    /// Hook name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Positional argument names.
    pub args: Vec<String>,
    /// Declared by the runtime rather than a plugin.
    pub builtin: bool,
}

/// Catalog of declared extension points.
///
/// Registering a hook for an undeclared name is allowed; the catalog only
/// drives manifest warnings and introspection.
#[derive(Debug)]
pub struct TypedHookRegistry {
    definitions: DashMap<String, HookDefinition>,
}

impl TypedHookRegistry {
    /// Creates a catalog seeded with every [`StandardHook`].
    pub fn new() -> Self {
        let definitions = DashMap::new();
        for hook in StandardHook::ALL {
            definitions.insert(
                hook.as_str().to_string(),
                HookDefinition {
                    name: hook.as_str().to_string(),
                    description: hook.description().to_string(),
                    args: hook.args().iter().map(|a| a.to_string()).collect(),
                    builtin: true,
                },
            );
        }
        Self { definitions }
    }

    /// Declares a plugin-provided extension point.
    pub fn define(
        &self,
        name: &str,
        description: impl Into<String>,
        args: &[&str],
    ) -> AppResult<()> {
        if !is_valid_hook_name(name) {
            return Err(AppError::validation(format!("Invalid hook name '{name}'")));
        }
        if self.definitions.get(name).is_some_and(|d| d.builtin) {
            return Err(AppError::conflict(format!(
                "Hook '{name}' is a built-in extension point"
            )));
        }
        self.definitions.insert(
            name.to_string(),
            HookDefinition {
                name: name.to_string(),
                description: description.into(),
                args: args.iter().map(|a| a.to_string()).collect(),
                builtin: false,
            },
        );
        Ok(())
    }

    /// Removes a plugin-provided definition. Built-ins cannot be removed.
    pub fn undefine(&self, name: &str) -> bool {
        self.definitions
            .remove_if(name, |_, d| !d.builtin)
            .is_some()
    }

    /// Looks up a definition.
    pub fn get(&self, name: &str) -> Option<HookDefinition> {
        self.definitions.get(name).map(|d| d.clone())
    }

    /// Whether `name` is declared.
    pub fn is_defined(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// All definitions sorted by name.
    pub fn list(&self) -> Vec<HookDefinition> {
        let mut all: Vec<HookDefinition> = self.definitions.iter().map(|d| d.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

impl Default for TypedHookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds hooks with the runtime's registration defaults.
#[derive(Debug, Clone)]
pub struct HookFactory {
    /// Priority given to new hooks.
    pub default_priority: i32,
    /// Timeout given to new hooks.
    pub default_timeout: Option<Duration>,
}

impl HookFactory {
    /// Creates a factory.
    pub fn new(default_priority: i32, default_timeout: Option<Duration>) -> Self {
        Self {
            default_priority,
            default_timeout,
        }
    }

    /// Creates a hook around an existing handler.
    pub fn create(&self, name: impl Into<String>, handler: Arc<dyn HookHandler>) -> Hook {
        let mut hook = Hook::new(name, handler).with_priority(self.default_priority);
        hook.timeout = self.default_timeout;
        hook
    }

    /// Creates a hook around an async closure.
    pub fn from_fn<F, Fut>(&self, name: impl Into<String>, handler: F) -> Hook
    where
        F: Fn(Arc<HookContext>, HookArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let mut hook = Hook::from_fn(name, handler).with_priority(self.default_priority);
        hook.timeout = self.default_timeout;
        hook
    }
}

impl Default for HookFactory {
    fn default() -> Self {
        Self::new(0, None)
    }
}
