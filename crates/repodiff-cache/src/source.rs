//! Sources of change-event trees.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use repodiff_engine::Subscription;
use repodiff_events::ChangeEvent;
use tracing::trace;

/// Callback receiving one change-event tree.
pub type EventCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Something that reports filesystem changes as [`ChangeEvent`] trees.
pub trait EventSource: Send + Sync {
    /// Deliver every future tree to `callback` until the handle is dropped.
    fn subscribe(&self, callback: EventCallback) -> Subscription;
}

type Subscribers = Vec<(u64, EventCallback)>;

/// In-process [`EventSource`] that fans published trees out to subscribers.
///
/// Subscribers are called synchronously on the publishing thread, outside
/// the subscriber lock, so a callback may subscribe or unsubscribe.
#[derive(Clone, Default)]
pub struct EventHub {
    next_id: Arc<AtomicU64>,
    subscribers: Arc<RwLock<Subscribers>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `tree` to every subscriber. Returns how many were called.
    pub fn publish(&self, tree: &ChangeEvent) -> usize {
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .read()
            .expect("event hub lock poisoned")
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        trace!(root = %tree.path.display(), nodes = tree.node_count(), subscribers = callbacks.len(), "publish");
        for cb in &callbacks {
            cb(tree);
        }
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("event hub lock poisoned").len()
    }
}

impl EventSource for EventHub {
    fn subscribe(&self, callback: EventCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .expect("event hub lock poisoned")
            .push((id, callback));

        let weak: Weak<RwLock<Subscribers>> = Arc::downgrade(&self.subscribers);
        Subscription::new(move || {
            if let Some(subs) = weak.upgrade() {
                subs.write()
                    .expect("event hub lock poisoned")
                    .retain(|(sid, _)| *sid != id);
            }
        })
    }
}
