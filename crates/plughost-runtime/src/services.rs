//! Shared runtime services supplied through the service container.
//!
//! Each trait has an in-memory default so the runtime works without any
//! external wiring.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use plughost_core::error::AppError;
use plughost_core::result::AppResult;

use crate::manifest::PluginManifest;

// ── Telemetry ───────────────────────────────────────────────────

/// A recorded telemetry event.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    /// Event name, e.g. `plugin.enabled`.
    pub name: String,
    /// Arbitrary properties.
    pub properties: Value,
    /// When the event was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Usage telemetry sink.
pub trait Telemetry: Send + Sync + std::fmt::Debug {
    /// Records a named event.
    fn record_event(&self, name: &str, properties: Value);
    /// Increments a counter.
    fn increment(&self, counter: &str, by: u64);
    /// Current counter value.
    fn counter(&self, counter: &str) -> u64;
    /// Most recent events, newest last.
    fn recent_events(&self, limit: usize) -> Vec<TelemetryEvent>;
}

/// Bounded in-memory telemetry.
#[derive(Debug)]
pub struct InMemoryTelemetry {
    /// Ring of recent events.
    events: Mutex<VecDeque<TelemetryEvent>>,
    /// Named counters.
    counters: DashMap<String, AtomicU64>,
    /// Maximum retained events.
    capacity: usize,
}

impl InMemoryTelemetry {
    /// Creates a sink retaining at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            counters: DashMap::new(),
            capacity: capacity.max(1),
        }
    }
}

impl Default for InMemoryTelemetry {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Telemetry for InMemoryTelemetry {
    fn record_event(&self, name: &str, properties: Value) {
        let mut events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(TelemetryEvent {
            name: name.to_string(),
            properties,
            recorded_at: Utc::now(),
        });
        drop(events);
        self.increment(name, 1);
    }

    fn increment(&self, counter: &str, by: u64) {
        self.counters
            .entry(counter.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(by, Ordering::Relaxed);
    }

    fn counter(&self, counter: &str) -> u64 {
        self.counters
            .get(counter)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn recent_events(&self, limit: usize) -> Vec<TelemetryEvent> {
        let events = self.events.lock().unwrap_or_else(|p| p.into_inner());
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }
}

// ── Performance profiling ───────────────────────────────────────

/// Aggregated timings for one label.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileStats {
    /// Number of samples.
    pub count: u64,
    /// Sum of all samples.
    pub total: Duration,
    /// Longest sample.
    pub max: Duration,
}

impl ProfileStats {
    /// Mean sample duration.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

/// Records operation timings.
pub trait PerformanceProfiler: Send + Sync + std::fmt::Debug {
    /// Records one sample.
    fn record(&self, label: &str, elapsed: Duration);
    /// Aggregated timings for a label.
    fn stats(&self, label: &str) -> Option<ProfileStats>;
    /// All labels with samples.
    fn labels(&self) -> Vec<String>;
}

/// Guard that records the elapsed time when finished.
#[must_use = "call finish() to record the sample"]
pub struct ProfileTimer {
    profiler: Arc<dyn PerformanceProfiler>,
    label: String,
    started: Instant,
}

impl ProfileTimer {
    /// Starts timing `label`.
    pub fn start(profiler: Arc<dyn PerformanceProfiler>, label: impl Into<String>) -> Self {
        Self {
            profiler,
            label: label.into(),
            started: Instant::now(),
        }
    }

    /// Records and returns the elapsed time.
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.profiler.record(&self.label, elapsed);
        elapsed
    }
}

/// In-memory profiler.
#[derive(Debug, Default)]
pub struct InMemoryProfiler {
    /// Label → stats.
    samples: DashMap<String, ProfileStats>,
}

impl InMemoryProfiler {
    /// Creates an empty profiler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PerformanceProfiler for InMemoryProfiler {
    fn record(&self, label: &str, elapsed: Duration) {
        let mut stats = self.samples.entry(label.to_string()).or_default();
        stats.count += 1;
        stats.total += elapsed;
        if elapsed > stats.max {
            stats.max = elapsed;
        }
    }

    fn stats(&self, label: &str) -> Option<ProfileStats> {
        self.samples.get(label).map(|s| s.clone())
    }

    fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.samples.iter().map(|e| e.key().clone()).collect();
        labels.sort();
        labels
    }
}

// ── Dependency management ───────────────────────────────────────

/// A dependency that is not satisfied by the installed plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum DependencyIssue {
    /// The dependency is not installed.
    #[error("missing dependency '{name}' ({required})")]
    Missing {
        /// Dependency name.
        name: String,
        /// Required version range.
        required: String,
    },
    /// The installed version does not satisfy the range.
    #[error("dependency '{name}' {found} does not satisfy {required}")]
    Incompatible {
        /// Dependency name.
        name: String,
        /// Required version range.
        required: String,
        /// Installed version.
        found: String,
    },
}

/// Resolves plugin-to-plugin dependencies.
pub trait DependencyManager: Send + Sync + std::fmt::Debug {
    /// Checks `manifest` against the installed versions.
    fn check(
        &self,
        manifest: &PluginManifest,
        installed: &BTreeMap<String, Version>,
    ) -> Vec<DependencyIssue>;

    /// Orders plugin names so dependencies come before dependents.
    ///
    /// Dependencies outside `manifests` are ignored. Cycles are a conflict.
    fn load_order(&self, manifests: &[PluginManifest]) -> AppResult<Vec<String>>;
}

/// Semver-based dependency manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct SemverDependencyManager;

impl SemverDependencyManager {
    /// Creates the manager.
    pub fn new() -> Self {
        Self
    }

    fn visit<'a>(
        name: &'a str,
        by_name: &BTreeMap<&'a str, &'a PluginManifest>,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
        order: &mut Vec<String>,
    ) -> AppResult<()> {
        if done.contains(name) {
            return Ok(());
        }
        if !visiting.insert(name) {
            return Err(AppError::conflict(format!(
                "Dependency cycle detected at plugin '{name}'"
            )));
        }
        if let Some(manifest) = by_name.get(name) {
            for dep in manifest.dependencies.keys() {
                if let Some((dep_name, _)) = by_name.get_key_value(dep.as_str()) {
                    Self::visit(*dep_name, by_name, visiting, done, order)?;
                }
            }
        }
        visiting.remove(name);
        done.insert(name);
        order.push(name.to_string());
        Ok(())
    }
}

impl DependencyManager for SemverDependencyManager {
    fn check(
        &self,
        manifest: &PluginManifest,
        installed: &BTreeMap<String, Version>,
    ) -> Vec<DependencyIssue> {
        manifest
            .dependencies
            .iter()
            .filter_map(|(name, required)| match installed.get(name) {
                None => Some(DependencyIssue::Missing {
                    name: name.clone(),
                    required: required.to_string(),
                }),
                Some(found) if !required.matches(found) => Some(DependencyIssue::Incompatible {
                    name: name.clone(),
                    required: required.to_string(),
                    found: found.to_string(),
                }),
                Some(_) => None,
            })
            .collect()
    }

    fn load_order(&self, manifests: &[PluginManifest]) -> AppResult<Vec<String>> {
        let by_name: BTreeMap<&str, &PluginManifest> =
            manifests.iter().map(|m| (m.name.as_str(), m)).collect();
        let mut visiting = HashSet::new();
        let mut done = HashSet::new();
        let mut order = Vec::with_capacity(manifests.len());

        for manifest in manifests {
            Self::visit(&manifest.name, &by_name, &mut visiting, &mut done, &mut order)?;
        }

        debug!(order = ?order, "Resolved plugin load order");
        Ok(order)
    }
}

// ── Sandbox ─────────────────────────────────────────────────────

/// Decides whether a plugin may perform a permissioned operation.
pub trait Sandbox: Send + Sync + std::fmt::Debug {
    /// Returns whether `permission` is granted to the plugin.
    fn is_allowed(&self, manifest: &PluginManifest, permission: &str) -> bool;

    /// Fails with `PermissionDenied` unless `permission` is granted.
    fn check(&self, manifest: &PluginManifest, permission: &str) -> AppResult<()> {
        if self.is_allowed(manifest, permission) {
            Ok(())
        } else {
            Err(AppError::permission_denied(format!(
                "Plugin '{}' lacks permission '{}'",
                manifest.name, permission
            )))
        }
    }
}

/// Grants exactly the permissions a manifest declares.
///
/// A declared `prefix:*` grants every permission starting with `prefix:`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissionSandbox;

impl PermissionSandbox {
    /// Creates the sandbox.
    pub fn new() -> Self {
        Self
    }
}

impl Sandbox for PermissionSandbox {
    fn is_allowed(&self, manifest: &PluginManifest, permission: &str) -> bool {
        manifest.permissions.iter().any(|granted| {
            granted == permission
                || granted == "*"
                || granted
                    .strip_suffix('*')
                    .is_some_and(|prefix| prefix.ends_with(':') && permission.starts_with(prefix))
        })
    }
}
