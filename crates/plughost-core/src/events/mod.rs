//! Runtime events emitted by the hook dispatcher and plugin manager.
//!
//! Events are broadcast to in-process listeners (command executors,
//! telemetry sinks, CLI layers) so they can stay in sync with registrations
//! and lifecycle changes.

pub mod hook;
pub mod plugin;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use hook::HookEvent;
pub use plugin::PluginEvent;

/// Wrapper for all runtime events with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event ID.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub payload: RuntimeEvent,
}

/// Union of all runtime event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event")]
pub enum RuntimeEvent {
    /// A hook registry event.
    Hook(HookEvent),
    /// A plugin or command event.
    Plugin(PluginEvent),
}

impl RuntimeEvent {
    /// Returns the notification name, e.g. `hook:registered`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hook(event) => event.name(),
            Self::Plugin(event) => event.name(),
        }
    }
}

impl From<HookEvent> for RuntimeEvent {
    fn from(event: HookEvent) -> Self {
        Self::Hook(event)
    }
}

impl From<PluginEvent> for RuntimeEvent {
    fn from(event: PluginEvent) -> Self {
        Self::Plugin(event)
    }
}

impl DomainEvent {
    /// Create a new domain event.
    pub fn new(payload: impl Into<RuntimeEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload: payload.into(),
        }
    }

    /// Returns the notification name of the payload.
    pub fn name(&self) -> &'static str {
        self.payload.name()
    }
}
