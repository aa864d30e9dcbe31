//! Interaction lifecycle events for host applications.
//!
//! Observers run synchronously, in registration order, on the task that
//! caused the event. They must not block.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chainge_interact_core::Nonce;
use chainge_interact_flow::FlowType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionEventKind {
    /// A new interaction was started from a first token.
    Created,
    /// An existing interaction accepted another token.
    Updated,
    /// An interaction was rebuilt from the token log.
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    pub kind: InteractionEventKind,
    pub id: Nonce,
    pub flow: FlowType,
    pub message_count: usize,
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&InteractionEvent) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<(SubscriptionId, Observer)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        observer: impl Fn(&InteractionEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    pub fn emit(&self, event: &InteractionEvent) {
        // snapshot so observers may subscribe from inside a callback
        let observers: Vec<Observer> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();

        tracing::trace!(kind = ?event.kind, id = %event.id, observers = observers.len(), "emitting interaction event");
        for observer in observers {
            observer(event);
        }
    }
}
