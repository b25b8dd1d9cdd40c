//! Hook registry and dispatch events.

use serde::{Deserialize, Serialize};

/// Events emitted by the hook dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HookEvent {
    /// A hook was registered.
    Registered {
        /// Hook name.
        name: String,
        /// Owning plugin.
        plugin: String,
        /// Effective priority.
        priority: i32,
    },
    /// A single hook was unregistered (explicitly or after a `once` run).
    Unregistered {
        /// Hook name.
        name: String,
        /// Owning plugin.
        plugin: String,
    },
    /// All hooks of a plugin were unregistered.
    PluginHooksUnregistered {
        /// Owning plugin.
        plugin: String,
        /// Number of hooks removed.
        count: usize,
    },
    /// A dispatch for a hook name completed.
    Executed {
        /// Hook name.
        name: String,
        /// Whether the dispatch recorded zero errors.
        success: bool,
        /// Wall-clock duration of the dispatch.
        duration_ms: u64,
        /// Number of hooks that ran.
        executed: usize,
        /// Number of hooks skipped by a condition.
        skipped: usize,
        /// Number of recorded failures.
        errors: usize,
    },
    /// Every hook and statistic was dropped.
    Cleared,
}

impl HookEvent {
    /// Returns the notification name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "hook:registered",
            Self::Unregistered { .. } => "hook:unregistered",
            Self::PluginHooksUnregistered { .. } => "hooks:unregistered",
            Self::Executed { .. } => "hooks:executed",
            Self::Cleared => "hooks:cleared",
        }
    }
}
