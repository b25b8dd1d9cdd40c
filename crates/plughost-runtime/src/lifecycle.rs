//! Per-plugin lifecycle state machine.
//!
//! The plugin manager drives every transition; the machine records history,
//! runs phase callbacks, and notifies listeners. It does not police which
//! transitions are legal.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use plughost_core::error::AppError;
use plughost_core::result::AppResult;

/// Lifecycle states of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Not loaded (initial state).
    #[default]
    Unloaded,
    /// Being installed.
    Loading,
    /// Installed and inert.
    Loaded,
    /// Running `init`.
    Initializing,
    /// `init` completed.
    Initialized,
    /// Registering commands and hooks.
    Activating,
    /// Enabled and serving hooks.
    Active,
    /// Being disabled.
    Deactivating,
    /// Disabled.
    Deactivated,
    /// Being uninstalled.
    Unloading,
    /// A lifecycle callback failed. Recoverable by re-enabling.
    Error,
    /// Hooks temporarily hidden from dispatch.
    Suspended,
}

impl PluginState {
    /// Whether the plugin is serving or paused.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Suspended)
    }

    /// Whether the plugin is mid-transition.
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            Self::Loading | Self::Initializing | Self::Activating | Self::Deactivating | Self::Unloading
        )
    }

    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
            Self::Deactivated => "deactivated",
            Self::Unloading => "unloading",
            Self::Error => "error",
            Self::Suspended => "suspended",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: PluginState,
    /// New state.
    pub to: PluginState,
    /// When the transition completed.
    pub timestamp: DateTime<Utc>,
    /// Time spent in the phase callback.
    pub duration_ms: u64,
    /// Failure that forced the transition, if any.
    pub error: Option<String>,
}

/// Async callback run before entering a state.
pub type PhaseCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Listener invoked with `(old, new)` after every transition.
pub type StateListener = Arc<dyn Fn(PluginState, PluginState) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, StateListener)>>;

/// Handle returned by [`LifecycleMachine::on_state_change`].
#[derive(Debug)]
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl ListenerHandle {
    /// Removes the listener. A no-op if the machine is gone.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Tracks one plugin's state and transition history.
pub struct LifecycleMachine {
    plugin: String,
    current: PluginState,
    history: VecDeque<StateTransition>,
    history_limit: usize,
    phase_callbacks: HashMap<PluginState, PhaseCallback>,
    listeners: Arc<ListenerList>,
    next_listener_id: AtomicU64,
}

impl LifecycleMachine {
    /// Creates a machine in [`PluginState::Unloaded`] that keeps at most
    /// `history_limit` transitions.
    pub fn new(plugin: impl Into<String>, history_limit: usize) -> Self {
        Self {
            plugin: plugin.into(),
            current: PluginState::Unloaded,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            phase_callbacks: HashMap::new(),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Current state.
    pub fn current(&self) -> PluginState {
        self.current
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.history.iter().cloned().collect()
    }

    /// Registers the callback run by [`transition`](Self::transition) before
    /// entering `state`.
    pub fn on_enter<F, Fut>(&mut self, state: PluginState, callback: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.phase_callbacks
            .insert(state, Arc::new(move || callback().boxed()));
    }

    /// Registers a listener for every transition.
    pub fn on_state_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(PluginState, PluginState) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Moves to `to`, running its registered phase callback first.
    pub async fn transition(&mut self, to: PluginState) -> AppResult<()> {
        match self.phase_callbacks.get(&to).cloned() {
            Some(callback) => self.transition_with(to, callback()).await,
            None => {
                self.apply(to, Duration::ZERO, None);
                Ok(())
            }
        }
    }

    /// Runs `phase` and moves to `to` if it succeeds. On failure the machine
    /// moves to [`PluginState::Error`] and a lifecycle error is returned.
    pub async fn transition_with<F>(&mut self, to: PluginState, phase: F) -> AppResult<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let started = Instant::now();
        match phase.await {
            Ok(()) => {
                self.apply(to, started.elapsed(), None);
                Ok(())
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(plugin = %self.plugin, target = %to, error = %message, "Lifecycle phase failed");
                self.apply(PluginState::Error, started.elapsed(), Some(message.clone()));
                Err(AppError::lifecycle(format!(
                    "Plugin '{}' failed while entering '{}': {}",
                    self.plugin, to, message
                )))
            }
        }
    }

    /// Forces the machine into [`PluginState::Error`].
    pub fn fail(&mut self, error: impl Into<String>) {
        self.apply(PluginState::Error, Duration::ZERO, Some(error.into()));
    }

    fn apply(&mut self, to: PluginState, duration: Duration, error: Option<String>) {
        let from = self.current;
        self.current = to;

        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
            duration_ms: duration.as_millis() as u64,
            error,
        });

        debug!(plugin = %self.plugin, from = %from, to = %to, "Plugin state changed");

        let listeners: Vec<StateListener> = self
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(from, to);
        }
    }
}

impl std::fmt::Debug for LifecycleMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleMachine")
            .field("plugin", &self.plugin)
            .field("current", &self.current)
            .field("history", &self.history.len())
            .finish()
    }
}
