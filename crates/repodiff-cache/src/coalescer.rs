//! Debounced batching of changed paths.
//!
//! The first change into an empty buffer schedules one dispatch after the
//! debounce delay. Changes arriving before that dispatch runs join the same
//! buffer and ride along. The delay is measured from the first change of a
//! burst, not the last, so a continuous stream of edits still produces
//! updates at a steady cadence.

use std::collections::BTreeSet;
use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, trace};

use crate::scheduler::{Scheduler, TaskHandle};

/// Changes accumulated between two dispatches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingChanges {
    /// Repository-relative paths, folder entries ending with `/`.
    pub paths: BTreeSet<String>,
    /// Absolute paths of the resources the events named.
    pub resources: Vec<PathBuf>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.resources.is_empty()
    }
}

/// Receives each non-empty batch.
pub type DispatchFn = Arc<dyn Fn(PendingChanges) + Send + Sync>;

#[derive(Default)]
struct Buffer {
    changes: PendingChanges,
    scheduled: Option<TaskHandle>,
}

struct Inner {
    buffer: Mutex<Buffer>,
    delay: Duration,
    scheduler: Arc<dyn Scheduler>,
    dispatch: DispatchFn,
}

impl Inner {
    fn dispatch_now(&self) {
        let changes = {
            let mut buffer = self.buffer.lock().expect("coalescer lock poisoned");
            buffer.scheduled = None;
            mem::take(&mut buffer.changes)
        };
        if changes.is_empty() {
            trace!("dispatch with empty buffer");
            return;
        }
        debug!(paths = changes.paths.len(), resources = changes.resources.len(), "dispatching batch");
        (self.dispatch)(changes);
    }
}

/// Accumulate-then-delay batcher for changed paths.
#[derive(Clone)]
pub struct UpdateCoalescer {
    inner: Arc<Inner>,
}

impl UpdateCoalescer {
    pub fn new(scheduler: Arc<dyn Scheduler>, delay: Duration, dispatch: DispatchFn) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(Buffer::default()),
                delay,
                scheduler,
                dispatch,
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Add changes to the pending buffer, scheduling a dispatch if the
    /// buffer was empty.
    pub fn add_changes(
        &self,
        paths: impl IntoIterator<Item = String>,
        resources: impl IntoIterator<Item = PathBuf>,
    ) {
        let mut buffer = self.inner.buffer.lock().expect("coalescer lock poisoned");
        let was_empty = buffer.changes.is_empty();
        buffer.changes.paths.extend(paths);
        buffer.changes.resources.extend(resources);
        if !was_empty || buffer.changes.is_empty() {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = self.inner.scheduler.schedule(
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch_now();
                }
            }),
            self.inner.delay,
        );
        trace!(delay_ms = self.inner.delay.as_millis() as u64, "dispatch scheduled");
        buffer.scheduled = Some(handle);
    }

    /// Dispatch whatever is pending right now, on the calling thread.
    pub fn flush(&self) {
        if let Some(handle) = self
            .inner
            .buffer
            .lock()
            .expect("coalescer lock poisoned")
            .scheduled
            .take()
        {
            handle.cancel();
        }
        self.inner.dispatch_now();
    }

    /// Drop pending changes without dispatching them.
    pub fn cancel_and_clear(&self) {
        let mut buffer = self.inner.buffer.lock().expect("coalescer lock poisoned");
        if let Some(handle) = buffer.scheduled.take() {
            handle.cancel();
        }
        buffer.changes = PendingChanges::default();
    }

    /// Number of distinct paths waiting for dispatch.
    pub fn pending_len(&self) -> usize {
        self.inner
            .buffer
            .lock()
            .expect("coalescer lock poisoned")
            .changes
            .paths
            .len()
    }
}
