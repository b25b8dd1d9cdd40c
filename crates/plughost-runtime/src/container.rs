//! Service container: shared runtime services resolved by a closed set of keys.

use std::any::{Any, type_name};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use plughost_core::config::RuntimeConfig;
use plughost_core::error::AppError;
use plughost_core::result::AppResult;

use crate::events::HookEventEmitter;
use crate::hooks::catalog::{HookFactory, TypedHookRegistry};
use crate::services::{
    DependencyManager, InMemoryProfiler, InMemoryTelemetry, PerformanceProfiler, PermissionSandbox,
    Sandbox, SemverDependencyManager, Telemetry,
};

/// Known service roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKey {
    /// Usage telemetry.
    Telemetry,
    /// Plugin dependency resolution.
    DependencyManager,
    /// Permission checks.
    Sandbox,
    /// Timing statistics.
    PerformanceProfiler,
    /// Runtime event broadcasting.
    HookEventEmitter,
    /// Catalog of declared hook names.
    TypedHookRegistry,
    /// Hook construction defaults.
    HookFactory,
}

impl ServiceKey {
    /// All keys.
    pub const ALL: [ServiceKey; 7] = [
        Self::Telemetry,
        Self::DependencyManager,
        Self::Sandbox,
        Self::PerformanceProfiler,
        Self::HookEventEmitter,
        Self::TypedHookRegistry,
        Self::HookFactory,
    ];

    /// Returns the key name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::DependencyManager => "dependency-manager",
            Self::Sandbox => "sandbox",
            Self::PerformanceProfiler => "performance-profiler",
            Self::HookEventEmitter => "hook-event-emitter",
            Self::TypedHookRegistry => "typed-hook-registry",
            Self::HookFactory => "hook-factory",
        }
    }

    fn instance_slot(&self) -> String {
        format!("{}:instance", self.as_str())
    }
}

impl std::fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn() -> Instance + Send + Sync>;

#[derive(Clone)]
struct Registration {
    factory: Factory,
    singleton: bool,
}

/// Minimal dependency-injection container.
///
/// Services are stored as values; register cheap-to-clone handles such as
/// `Arc<dyn Telemetry>` and resolve the same type back.
#[derive(Default)]
pub struct ServiceContainer {
    registrations: DashMap<ServiceKey, Registration>,
    instances: DashMap<String, Instance>,
}

impl ServiceContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a container with every default service registered.
    pub fn with_defaults(config: &RuntimeConfig) -> Self {
        let container = Self::new();
        container.register_defaults(config);
        container
    }

    /// Registers a singleton factory.
    pub fn register<T, F>(&self, key: ServiceKey, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_with(key, factory, true);
    }

    /// Registers a factory that runs on every resolution.
    pub fn register_transient<T, F>(&self, key: ServiceKey, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_with(key, factory, false);
    }

    /// Registers a factory, replacing any prior registration and its
    /// cached instance.
    pub fn register_with<T, F>(&self, key: ServiceKey, factory: F, singleton: bool)
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Arc::new(factory()) as Instance);
        self.registrations
            .insert(key, Registration { factory, singleton });
        self.instances.remove(&key.instance_slot());
        debug!(service = %key, singleton, "Service registered");
    }

    /// Resolves the service under `key` as `T`.
    ///
    /// Fails with `ServiceNotRegistered` for an unknown key and `Internal`
    /// when the registration produces a different type.
    pub fn resolve<T>(&self, key: ServiceKey) -> AppResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let registration = self
            .registrations
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or_else(|| {
                AppError::service_not_registered(format!("Service '{key}' is not registered"))
            })?;

        let instance = if registration.singleton {
            let slot = key.instance_slot();
            let cached = self.instances.get(&slot).map(|e| e.value().clone());
            match cached {
                Some(existing) => existing,
                None => {
                    let created = (registration.factory)();
                    self.instances.entry(slot).or_insert(created).value().clone()
                }
            }
        } else {
            (registration.factory)()
        };

        instance.downcast_ref::<T>().cloned().ok_or_else(|| {
            AppError::internal(format!(
                "Service '{key}' cannot be resolved as {}",
                type_name::<T>()
            ))
        })
    }

    /// Whether `key` has a registration.
    pub fn is_registered(&self, key: ServiceKey) -> bool {
        self.registrations.contains_key(&key)
    }

    /// Registered keys in declaration order.
    pub fn registered_keys(&self) -> Vec<ServiceKey> {
        ServiceKey::ALL
            .into_iter()
            .filter(|k| self.registrations.contains_key(k))
            .collect()
    }

    /// Drops every registration and cached instance.
    pub fn clear(&self) {
        self.registrations.clear();
        self.instances.clear();
    }

    /// Registers the in-memory default for every service role.
    pub fn register_defaults(&self, config: &RuntimeConfig) {
        self.register(ServiceKey::Telemetry, || {
            Arc::new(InMemoryTelemetry::default()) as Arc<dyn Telemetry>
        });
        self.register(ServiceKey::DependencyManager, || {
            Arc::new(SemverDependencyManager::new()) as Arc<dyn DependencyManager>
        });
        self.register(ServiceKey::Sandbox, || {
            Arc::new(PermissionSandbox::new()) as Arc<dyn Sandbox>
        });
        self.register(ServiceKey::PerformanceProfiler, || {
            Arc::new(InMemoryProfiler::new()) as Arc<dyn PerformanceProfiler>
        });
        let capacity = config.events.channel_capacity;
        self.register(ServiceKey::HookEventEmitter, move || {
            HookEventEmitter::new(capacity)
        });
        self.register(ServiceKey::TypedHookRegistry, || {
            Arc::new(TypedHookRegistry::new())
        });
        self.register(ServiceKey::HookFactory, HookFactory::default);
    }

    /// Resolves the telemetry service.
    pub fn telemetry(&self) -> AppResult<Arc<dyn Telemetry>> {
        self.resolve(ServiceKey::Telemetry)
    }

    /// Resolves the dependency manager.
    pub fn dependency_manager(&self) -> AppResult<Arc<dyn DependencyManager>> {
        self.resolve(ServiceKey::DependencyManager)
    }

    /// Resolves the sandbox.
    pub fn sandbox(&self) -> AppResult<Arc<dyn Sandbox>> {
        self.resolve(ServiceKey::Sandbox)
    }

    /// Resolves the performance profiler.
    pub fn profiler(&self) -> AppResult<Arc<dyn PerformanceProfiler>> {
        self.resolve(ServiceKey::PerformanceProfiler)
    }

    /// Resolves the event emitter.
    pub fn event_emitter(&self) -> AppResult<HookEventEmitter> {
        self.resolve(ServiceKey::HookEventEmitter)
    }

    /// Resolves the hook catalog.
    pub fn typed_hooks(&self) -> AppResult<Arc<TypedHookRegistry>> {
        self.resolve(ServiceKey::TypedHookRegistry)
    }

    /// Resolves the hook factory.
    pub fn hook_factory(&self) -> AppResult<HookFactory> {
        self.resolve(ServiceKey::HookFactory)
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("registered", &self.registered_keys())
            .field("instances", &self.instances.len())
            .finish()
    }
}
