//! Hook registry: per-name lists of hook registrations kept in dispatch order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::definitions::Hook;

/// One registration of a hook by a plugin.
#[derive(Debug)]
pub struct HookEntry {
    /// Registration id.
    pub id: Uuid,
    /// The hook as registered.
    pub hook: Hook,
    /// Owning plugin.
    pub plugin_name: String,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    enabled: AtomicBool,
    consumed: AtomicBool,
    execution_count: AtomicU64,
}

impl HookEntry {
    fn new(hook: Hook, plugin_name: &str) -> Self {
        let enabled = hook.enabled;
        Self {
            id: Uuid::new_v4(),
            hook,
            plugin_name: plugin_name.to_string(),
            registered_at: Utc::now(),
            enabled: AtomicBool::new(enabled),
            consumed: AtomicBool::new(false),
            execution_count: AtomicU64::new(0),
        }
    }

    /// Whether dispatch can see this entry.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Toggles dispatch visibility.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Claims the single execution of a once-hook. Returns `false` if a
    /// concurrent dispatch already claimed it.
    pub fn try_consume(&self) -> bool {
        !self.consumed.swap(true, Ordering::AcqRel)
    }

    /// Number of completed executions.
    pub fn execution_count(&self) -> u64 {
        self.execution_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_execution(&self) {
        self.execution_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Serializable snapshot.
    pub fn info(&self) -> HookInfo {
        HookInfo {
            id: self.id,
            name: self.hook.name.clone(),
            plugin_name: self.plugin_name.clone(),
            priority: self.hook.priority,
            once: self.hook.once,
            enabled: self.is_enabled(),
            timeout_ms: self.hook.timeout.map(|t| t.as_millis() as u64),
            description: self.hook.description.clone(),
            execution_count: self.execution_count(),
            registered_at: self.registered_at,
        }
    }
}

/// Read-only view of a registration.
#[derive(Debug, Clone, Serialize)]
pub struct HookInfo {
    /// Registration id.
    pub id: Uuid,
    /// Hook name.
    pub name: String,
    /// Owning plugin.
    pub plugin_name: String,
    /// Priority.
    pub priority: i32,
    /// Run-once flag.
    pub once: bool,
    /// Dispatch visibility.
    pub enabled: bool,
    /// Per-hook timeout, if any.
    pub timeout_ms: Option<u64>,
    /// Description.
    pub description: Option<String>,
    /// Completed executions.
    pub execution_count: u64,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

/// Execution statistics for a hook name.
#[derive(Debug, Clone, Serialize)]
pub struct HookStats {
    /// Hook name.
    pub name: String,
    /// Hook executions, one per hook run regardless of retries.
    pub executions: u64,
    /// Executions whose final attempt failed.
    pub errors: u64,
    /// Cumulative execution time.
    pub total_duration: Duration,
    /// Last execution time.
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl HookStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            executions: 0,
            errors: 0,
            total_duration: Duration::ZERO,
            last_executed_at: None,
        }
    }

    /// Mean execution time in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_duration.as_secs_f64() * 1000.0 / self.executions as f64
        }
    }
}

/// Registry of hooks organized by name.
///
/// Each list is ordered by descending priority; equal priorities keep
/// registration order.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: RwLock<HashMap<String, Vec<Arc<HookEntry>>>>,
    stats: DashMap<String, HookStats>,
}

impl HookRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a hook for `plugin_name` and returns the new entry.
    pub async fn insert(&self, hook: Hook, plugin_name: &str) -> Arc<HookEntry> {
        let entry = Arc::new(HookEntry::new(hook, plugin_name));
        let mut hooks = self.hooks.write().await;
        let entries = hooks.entry(entry.hook.name.clone()).or_default();

        // After every entry of higher or equal priority.
        let position = entries
            .iter()
            .position(|e| e.hook.priority < entry.hook.priority)
            .unwrap_or(entries.len());
        entries.insert(position, entry.clone());

        debug!(
            hook = %entry.hook.name,
            plugin = %plugin_name,
            priority = entry.hook.priority,
            position = position,
            "Hook inserted"
        );
        entry
    }

    /// Removes every registration of `name` owned by `plugin_name`.
    pub async fn remove(&self, name: &str, plugin_name: &str) -> usize {
        let mut hooks = self.hooks.write().await;
        let Some(entries) = hooks.get_mut(name) else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|e| e.plugin_name != plugin_name);
        let removed = before - entries.len();
        if entries.is_empty() {
            hooks.remove(name);
        }
        removed
    }

    /// Removes one registration by id.
    pub async fn remove_by_id(&self, name: &str, id: Uuid) -> bool {
        let mut hooks = self.hooks.write().await;
        let Some(entries) = hooks.get_mut(name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            hooks.remove(name);
        }
        removed
    }

    /// Removes every registration owned by `plugin_name` under one write lock.
    pub async fn remove_plugin(&self, plugin_name: &str) -> usize {
        let mut hooks = self.hooks.write().await;
        let mut removed = 0;
        for entries in hooks.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.plugin_name != plugin_name);
            removed += before - entries.len();
        }
        hooks.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Enabled entries for `name`, in dispatch order.
    pub async fn snapshot(&self, name: &str) -> Vec<Arc<HookEntry>> {
        let hooks = self.hooks.read().await;
        hooks
            .get(name)
            .map(|entries| entries.iter().filter(|e| e.is_enabled()).cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshots of all registrations, optionally restricted to one name.
    pub async fn entries(&self, name: Option<&str>) -> Vec<HookInfo> {
        let hooks = self.hooks.read().await;
        match name {
            Some(name) => hooks
                .get(name)
                .map(|entries| entries.iter().map(|e| e.info()).collect())
                .unwrap_or_default(),
            None => {
                let mut names: Vec<&String> = hooks.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .flat_map(|n| hooks[n].iter().map(|e| e.info()))
                    .collect()
            }
        }
    }

    /// Snapshots of the registrations owned by `plugin_name`.
    pub async fn plugin_entries(&self, plugin_name: &str) -> Vec<HookInfo> {
        self.entries(None)
            .await
            .into_iter()
            .filter(|info| info.plugin_name == plugin_name)
            .collect()
    }

    /// Whether any registration exists for `name`.
    pub async fn contains(&self, name: &str) -> bool {
        let hooks = self.hooks.read().await;
        hooks.get(name).is_some_and(|entries| !entries.is_empty())
    }

    /// Number of registrations, optionally for one name.
    pub async fn count(&self, name: Option<&str>) -> usize {
        let hooks = self.hooks.read().await;
        match name {
            Some(name) => hooks.get(name).map(Vec::len).unwrap_or(0),
            None => hooks.values().map(Vec::len).sum(),
        }
    }

    /// Sorted names with at least one registration.
    pub async fn names(&self) -> Vec<String> {
        let hooks = self.hooks.read().await;
        let mut names: Vec<String> = hooks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sets the enabled flag on every registration owned by `plugin_name`.
    pub async fn set_plugin_enabled(&self, plugin_name: &str, enabled: bool) -> usize {
        let hooks = self.hooks.read().await;
        let mut touched = 0;
        for entry in hooks.values().flatten() {
            if entry.plugin_name == plugin_name {
                entry.set_enabled(enabled);
                touched += 1;
            }
        }
        touched
    }

    /// Records one hook execution.
    pub fn record(&self, name: &str, duration: Duration, failed: bool) {
        let mut stats = self
            .stats
            .entry(name.to_string())
            .or_insert_with(|| HookStats::new(name));
        stats.executions += 1;
        stats.total_duration += duration;
        stats.last_executed_at = Some(Utc::now());
        if failed {
            stats.errors += 1;
        }
    }

    /// Statistics, optionally for one name.
    pub fn stats(&self, name: Option<&str>) -> Vec<HookStats> {
        match name {
            Some(name) => self
                .stats
                .get(name)
                .map(|s| vec![s.value().clone()])
                .unwrap_or_default(),
            None => {
                let mut all: Vec<HookStats> =
                    self.stats.iter().map(|s| s.value().clone()).collect();
                all.sort_by(|a, b| a.name.cmp(&b.name));
                all
            }
        }
    }

    /// Removes every registration and all statistics.
    pub async fn clear(&self) {
        self.hooks.write().await.clear();
        self.stats.clear();
    }
}
