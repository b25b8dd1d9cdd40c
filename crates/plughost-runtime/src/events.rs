//! Runtime event emitter backed by a tokio broadcast channel.

use tokio::sync::broadcast;
use tracing::trace;

use plughost_core::events::{DomainEvent, RuntimeEvent};

/// Broadcasts [`DomainEvent`]s to every subscriber.
///
/// Cloning the emitter shares the underlying channel.
#[derive(Debug, Clone)]
pub struct HookEventEmitter {
    /// Broadcast sender.
    sender: broadcast::Sender<DomainEvent>,
}

impl HookEventEmitter {
    /// Creates an emitter whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emits an event. Having no subscribers is not an error.
    pub fn emit(&self, event: impl Into<RuntimeEvent>) {
        let event = DomainEvent::new(event);
        trace!(event = event.name(), "Emitting runtime event");
        let _ = self.sender.send(event);
    }

    /// Subscribes to all subsequently emitted events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for HookEventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
