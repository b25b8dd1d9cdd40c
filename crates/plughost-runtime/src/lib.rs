//! # plughost-runtime
//!
//! Plugin runtime core. Provides:
//!
//! - Service container resolving shared services by key
//! - Per-plugin lifecycle state machine with bounded history
//! - Hook registry and dispatcher with priorities, conditions, timeouts,
//!   retries, and one-shot hooks
//! - Plugin manager orchestrating install, enable, disable, update, and
//!   uninstall
//! - Command registry and executor wrapped by `command:*` hooks

#[macro_use]
pub mod macros;

pub mod api;
pub mod builder;
pub mod commands;
pub mod container;
pub mod events;
pub mod hooks;
pub mod installer;
pub mod lifecycle;
pub mod manager;
pub mod manifest;
pub mod prelude;
pub mod registry;
pub mod runtime;
pub mod services;
pub mod validation;

pub use plughost_core;
pub use semver;

pub use api::context::PluginContext;
pub use container::{ServiceContainer, ServiceKey};
pub use hooks::dispatcher::HookDispatcher;
pub use hooks::registry::HookRegistry;
pub use lifecycle::{LifecycleMachine, PluginState};
pub use manager::PluginManager;
pub use manifest::{Plugin, PluginManifest};
pub use registry::PluginRegistry;
pub use runtime::{PluginRuntime, RuntimeBuilder};
