//! Change notifications
//!
//! Renderers subscribe an [`ExplorationObserver`]; the engine delivers
//! events synchronously after each state transition, once its state lock has
//! been released, so observers may call back into the engine's read
//! accessors. [`ChannelObserver`] bridges events onto a tokio channel for
//! message-passing consumers.

use crate::state::Generation;
use parking_lot::RwLock;
use rex_types::{GenerationIndex, Guid, InstanceCategory, PreTraversalStats};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Notification emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum ExplorationEvent {
    /// A generation was committed
    GraphExtended {
        /// The new generation
        generation: GenerationIndex,
    },
    /// The top generation is about to be removed
    GraphBeingReduced {
        /// Contents of the generation being removed
        generation: Box<Generation>,
    },
    /// The top generation was removed
    GraphReduced {
        /// Index of the removed generation
        generation: GenerationIndex,
    },
    /// All state was reset
    GraphCleared,
    /// A new instance is in focus
    FocusChanged {
        /// Focused guid
        guid: Guid,
        /// Its category
        category: InstanceCategory,
    },
    /// The focus instance was removed
    FocusCleared,
    /// Instance retrieval failed
    InstanceLoadFailed {
        /// Requested category
        category: InstanceCategory,
        /// Gateway message
        message: String,
    },
    /// Pre-traversal statistics are available
    PreTraversalLoaded {
        /// The statistics
        stats: PreTraversalStats,
    },
    /// A traversal or search commit found nothing new
    NoNewObjects,
    /// Search failed
    SearchFailed {
        /// Searched category
        category: InstanceCategory,
        /// Gateway message
        message: String,
    },
    /// Traversal or pre-traversal failed
    TraversalFailed {
        /// Gateway message
        message: String,
    },
}

impl ExplorationEvent {
    /// Stable event name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GraphExtended { .. } => "graphExtended",
            Self::GraphBeingReduced { .. } => "graphBeingReduced",
            Self::GraphReduced { .. } => "graphReduced",
            Self::GraphCleared => "graphCleared",
            Self::FocusChanged { .. } => "focusChanged",
            Self::FocusCleared => "focusCleared",
            Self::InstanceLoadFailed { .. } => "instanceLoadFailed",
            Self::PreTraversalLoaded { .. } => "preTraversalLoaded",
            Self::NoNewObjects => "noNewObjects",
            Self::SearchFailed { .. } => "searchFailed",
            Self::TraversalFailed { .. } => "traversalFailed",
        }
    }
}

/// Consumer of engine notifications
pub trait ExplorationObserver: Send + Sync {
    /// Called once per event, in emission order
    fn on_event(&self, event: &ExplorationEvent);
}

impl<F> ExplorationObserver for F
where
    F: Fn(&ExplorationEvent) + Send + Sync,
{
    fn on_event(&self, event: &ExplorationEvent) {
        self(event);
    }
}

/// Handle returned by subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscriber list
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn ExplorationObserver>)>>,
}

impl ObserverRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer
    pub fn subscribe(&self, observer: Arc<dyn ExplorationObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Remove an observer; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Number of observers
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observer is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver events to every observer registered at the time of the call
    pub fn dispatch(&self, events: &[ExplorationEvent]) {
        if events.is_empty() {
            return;
        }
        // Snapshot so observers can (un)subscribe from inside a callback.
        let observers: Vec<Arc<dyn ExplorationObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for event in events {
            tracing::trace!(event = event.name(), "dispatch");
            for observer in &observers {
                observer.on_event(event);
            }
        }
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

/// Forwards events into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<ExplorationEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExplorationEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ExplorationObserver for ChannelObserver {
    fn on_event(&self, event: &ExplorationEvent) {
        if self.sender.send(event.clone()).is_err() {
            tracing::debug!(event = event.name(), "event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn dispatch_reaches_all_in_order() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.subscribe(Arc::new(move |e: &ExplorationEvent| sink.lock().push(e.name())));

        registry.dispatch(&[ExplorationEvent::GraphCleared, ExplorationEvent::NoNewObjects]);
        assert_eq!(*seen.lock(), vec!["graphCleared", "noNewObjects"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = ObserverRegistry::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let id = registry.subscribe(Arc::new(move |_: &ExplorationEvent| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        registry.dispatch(&[ExplorationEvent::GraphCleared]);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.dispatch(&[ExplorationEvent::GraphCleared]);
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn channel_observer_forwards() {
        let registry = ObserverRegistry::new();
        let (observer, mut receiver) = ChannelObserver::channel();
        registry.subscribe(Arc::new(observer));

        registry.dispatch(&[ExplorationEvent::FocusCleared]);
        assert_eq!(receiver.recv().await, Some(ExplorationEvent::FocusCleared));
    }
}
