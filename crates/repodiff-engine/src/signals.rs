//! Index-change fan-out and subscription handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use repodiff_types::RepositoryId;
use tracing::debug;

/// Callback invoked with the repository whose index or HEAD changed.
pub type IndexCallback = Arc<dyn Fn(&RepositoryId) + Send + Sync>;

/// Handle for a registered callback. Dropping it unregisters the callback.
#[must_use = "dropping a Subscription unregisters it immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Create a handle that runs `cancel` exactly once when unsubscribed.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to unregister.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Unregister now. Equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

type Listeners = HashMap<RepositoryId, Vec<(u64, IndexCallback)>>;

struct SignalsInner {
    next_id: AtomicU64,
    listeners: RwLock<Listeners>,
}

/// Per-repository fan-out for index-changed signals.
///
/// Engines embed one of these and call [`emit`](Self::emit) when they learn
/// that a repository's index or HEAD moved. Callbacks run on the emitting
/// thread, outside the internal lock.
#[derive(Clone)]
pub struct IndexSignals {
    inner: Arc<SignalsInner>,
}

impl Default for IndexSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexSignals {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalsInner {
                next_id: AtomicU64::new(0),
                listeners: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register `callback` for `repo`.
    pub fn subscribe(&self, repo: &RepositoryId, callback: IndexCallback) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .expect("signal lock poisoned")
            .entry(repo.clone())
            .or_default()
            .push((id, callback));

        let weak: Weak<SignalsInner> = Arc::downgrade(&self.inner);
        let repo = repo.clone();
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                let mut listeners = inner.listeners.write().expect("signal lock poisoned");
                if let Some(list) = listeners.get_mut(&repo) {
                    list.retain(|(lid, _)| *lid != id);
                    if list.is_empty() {
                        listeners.remove(&repo);
                    }
                }
            }
        })
    }

    /// Invoke every callback registered for `repo`. Returns how many ran.
    pub fn emit(&self, repo: &RepositoryId) -> usize {
        let callbacks: Vec<IndexCallback> = {
            let listeners = self.inner.listeners.read().expect("signal lock poisoned");
            match listeners.get(repo) {
                Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                None => Vec::new(),
            }
        };
        debug!(repo = %repo, listeners = callbacks.len(), "index changed");
        for cb in &callbacks {
            cb(repo);
        }
        callbacks.len()
    }

    /// Number of callbacks registered for `repo`.
    pub fn subscriber_count(&self, repo: &RepositoryId) -> usize {
        self.inner
            .listeners
            .read()
            .expect("signal lock poisoned")
            .get(repo)
            .map_or(0, Vec::len)
    }
}
