//! Lifecycle notifications published by the networking layer.
//!
//! The transport owns an `EventBus` and publishes one event per finished
//! exchange and one per redirect hop. Observers (the archiver among them)
//! subscribe and unsubscribe explicitly; there is no global registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::exchange::{Exchange, RedirectNotice};

/// Receives lifecycle events. Called on whatever thread published the event,
/// possibly several at once.
pub trait LifecycleObserver: Send + Sync {
    fn exchange_completed(&self, exchange: &Exchange);

    fn exchange_redirected(&self, _notice: &RedirectNotice) {}
}

/// Handle returned by `EventBus::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn LifecycleObserver>)>>,
}

/// Subscribe/publish hub for exchange lifecycle events. Cheap to clone; clones
/// share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.write().push((id, observer));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.inner.observers.write();
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.read().len()
    }

    pub fn publish_completed(&self, exchange: &Exchange) {
        for observer in self.snapshot() {
            observer.exchange_completed(exchange);
        }
    }

    pub fn publish_redirected(&self, notice: &RedirectNotice) {
        for observer in self.snapshot() {
            observer.exchange_redirected(notice);
        }
    }

    // Observers run without the lock held so they may (un)subscribe themselves.
    fn snapshot(&self) -> Vec<Arc<dyn LifecycleObserver>> {
        self.inner
            .observers
            .read()
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
