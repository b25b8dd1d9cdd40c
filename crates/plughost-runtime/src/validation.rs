//! Plugin validation and the TTL cache in front of it.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tracing::debug;
use validator::Validate;

use crate::hooks::catalog::TypedHookRegistry;
use crate::manifest::Plugin;

/// Outcome of validating a plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// True iff `errors` is empty.
    pub valid: bool,
    /// Problems that prevent enabling the plugin.
    pub errors: Vec<String>,
    /// Problems worth reporting that do not block enabling.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Validates plugins before they are enabled.
pub trait PluginValidator: Send + Sync {
    /// Validates `plugin`.
    fn validate_plugin(&self, plugin: &dyn Plugin) -> ValidationReport;
}

/// Validates manifests, hooks, and commands.
#[derive(Debug, Clone)]
pub struct ManifestValidator {
    catalog: Arc<TypedHookRegistry>,
}

impl ManifestValidator {
    /// Creates a validator that warns about hooks missing from `catalog`.
    pub fn new(catalog: Arc<TypedHookRegistry>) -> Self {
        Self { catalog }
    }
}

impl PluginValidator for ManifestValidator {
    fn validate_plugin(&self, plugin: &dyn Plugin) -> ValidationReport {
        let manifest = plugin.manifest();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Err(report) = manifest.validate() {
            let mut fields: Vec<_> = report.field_errors().into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            for (field, field_errors) in fields {
                for err in field_errors {
                    let detail = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    errors.push(format!("{field}: {detail}"));
                }
            }
        }

        let hooks = plugin.hooks();
        let mut seen = HashSet::new();
        for hook in &hooks {
            if let Err(e) = hook.validate() {
                errors.push(e.message);
            }
            if !seen.insert(hook.name.as_str()) {
                errors.push(format!("Hook '{}' is declared more than once", hook.name));
            }
            if !self.catalog.is_defined(&hook.name) {
                warnings.push(format!(
                    "Hook '{}' is not a declared extension point",
                    hook.name
                ));
            }
        }

        let commands = plugin.commands();
        let mut seen = HashSet::new();
        for command in &commands {
            if let Err(e) = command.validate() {
                errors.push(e.message);
            }
            for name in std::iter::once(&command.name).chain(command.aliases.iter()) {
                if !seen.insert(name.as_str()) {
                    errors.push(format!("Command name '{name}' is declared more than once"));
                }
            }
        }

        if hooks.is_empty() && commands.is_empty() {
            warnings.push("Plugin contributes no hooks or commands".to_string());
        }
        if manifest.description.trim().is_empty() {
            warnings.push("Plugin has no description".to_string());
        }

        ValidationReport::finish(errors, warnings)
    }
}

/// Caches validation reports keyed by `name@version#structural-hash`.
pub struct ValidationService {
    validator: Arc<dyn PluginValidator>,
    cache: Cache<String, ValidationReport>,
}

impl ValidationService {
    /// Creates a service holding at most `capacity` reports for `ttl`.
    pub fn new(validator: Arc<dyn PluginValidator>, capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { validator, cache }
    }

    /// Validates `plugin`, reusing a cached report for an identical shape.
    pub async fn validate(&self, plugin: &dyn Plugin) -> ValidationReport {
        let key = Self::cache_key(plugin);
        self.cache
            .get_with(key.clone(), async {
                debug!(key = %key, "Validating plugin");
                self.validator.validate_plugin(plugin)
            })
            .await
    }

    /// Drops every cached report.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Cache key for `plugin`.
    pub fn cache_key(plugin: &dyn Plugin) -> String {
        let manifest = plugin.manifest();
        let mut hasher = DefaultHasher::new();

        manifest.description.hash(&mut hasher);
        let mut hooks: Vec<(String, i32, bool)> = plugin
            .hooks()
            .iter()
            .map(|h| (h.name.clone(), h.priority, h.once))
            .collect();
        hooks.sort();
        hooks.hash(&mut hasher);

        let mut commands: Vec<(String, Vec<String>)> = plugin
            .commands()
            .iter()
            .map(|c| (c.name.clone(), c.aliases.clone()))
            .collect();
        commands.sort();
        commands.hash(&mut hasher);

        let mut permissions = manifest.permissions.clone();
        permissions.sort();
        permissions.hash(&mut hasher);

        for (name, req) in &manifest.dependencies {
            name.hash(&mut hasher);
            req.to_string().hash(&mut hasher);
        }

        format!("{}@{}#{:016x}", manifest.name, manifest.version, hasher.finish())
    }
}

impl std::fmt::Debug for ValidationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationService").finish()
    }
}
