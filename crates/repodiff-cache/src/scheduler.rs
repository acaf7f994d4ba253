//! Delayed task execution.
//!
//! Recomputes are blocking work (the engine may shell out or walk the work
//! tree), so the cache never runs them on the caller's thread. It hands
//! them to a [`Scheduler`] together with a delay and keeps the returned
//! [`TaskHandle`] to supersede work that has not started yet.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::trace;

/// A unit of blocking work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared lifecycle of one scheduled task.
///
/// A task moves from pending to either started or cancelled, exactly once.
/// Schedulers call [`try_start`](Self::try_start) right before running the
/// task and skip it when that fails.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<AtomicU8>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    /// Prevent the task from starting. Returns `false` if it already began
    /// (or was already cancelled); a running task is never interrupted.
    pub fn cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    /// Claim the task for execution.
    pub fn try_start(&self) -> bool {
        self.transition(STARTED)
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) == STARTED
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.load(Ordering::Acquire) {
            PENDING => "pending",
            STARTED => "started",
            _ => "cancelled",
        };
        f.debug_tuple("TaskHandle").field(&state).finish()
    }
}

/// Runs tasks after a delay, off the calling thread.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed, unless the returned handle is
    /// cancelled first.
    fn schedule(&self, task: Task, delay: Duration) -> TaskHandle;
}

/// [`Scheduler`] backed by a tokio runtime.
///
/// The delay is awaited on the runtime; the task itself runs on the
/// blocking pool so long diffs never stall async workers.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> TaskHandle {
        let handle = TaskHandle::new();
        let claim = handle.clone();
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if !claim.try_start() {
                trace!("scheduled task cancelled before start");
                return;
            }
            if let Err(e) = tokio::task::spawn_blocking(task).await {
                tracing::error!(error = %e, "scheduled task panicked");
            }
        });
        handle
    }
}

struct Queued {
    task: Task,
    delay: Duration,
    handle: TaskHandle,
}

/// [`Scheduler`] that runs nothing until told to.
///
/// Delays are recorded but not waited for. Tests drive it with
/// [`run_pending`](Self::run_pending), which makes debounce and supersession
/// behaviour deterministic.
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<VecDeque<Queued>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tasks that have not been cancelled.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .expect("scheduler queue poisoned")
            .iter()
            .filter(|q| q.handle.is_pending())
            .count()
    }

    /// Delays of the queued, non-cancelled tasks in scheduling order.
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.queue
            .lock()
            .expect("scheduler queue poisoned")
            .iter()
            .filter(|q| q.handle.is_pending())
            .map(|q| q.delay)
            .collect()
    }

    /// Run every task queued so far on the calling thread. Tasks they
    /// schedule are left for the next call. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<Queued> = self
            .queue
            .lock()
            .expect("scheduler queue poisoned")
            .drain(..)
            .collect();
        let mut ran = 0;
        for queued in batch {
            if queued.handle.try_start() {
                (queued.task)();
                ran += 1;
            }
        }
        ran
    }

    /// Keep running until the queue is empty. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let n = self.run_pending();
            ran += n;
            if n == 0 && self.queue.lock().expect("scheduler queue poisoned").is_empty() {
                return ran;
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> TaskHandle {
        let handle = TaskHandle::new();
        self.queue
            .lock()
            .expect("scheduler queue poisoned")
            .push_back(Queued {
                task,
                delay,
                handle: handle.clone(),
            });
        handle
    }
}
