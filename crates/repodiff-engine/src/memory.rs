//! Scripted in-memory engine.
//!
//! [`InMemoryEngine`] serves diffs from a per-repository [`RawDiff`] that
//! callers set directly. Failures, cancellations and latency can be queued
//! per repository, and every call is recorded, which makes it the engine of
//! choice for exercising the cache's concurrency behaviour.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::thread;
use std::time::Duration;

use repodiff_snapshot::RawDiff;
use repodiff_types::{Repository, RepositoryId};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::signals::{IndexCallback, IndexSignals, Subscription};
use crate::traits::VcsEngine;

/// One recorded call to [`InMemoryEngine::diff`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffCall {
    pub repository: RepositoryId,
    pub filter: Option<BTreeSet<String>>,
}

impl DiffCall {
    pub fn is_full(&self) -> bool {
        self.filter.is_none()
    }
}

/// An in-memory implementation of [`VcsEngine`].
///
/// The state a call reports is read when the call starts. Any configured
/// latency is spent afterwards, so a slow call returns data that may already
/// be stale by the time it completes.
#[derive(Default)]
pub struct InMemoryEngine {
    states: RwLock<HashMap<RepositoryId, RawDiff>>,
    scripted: Mutex<HashMap<RepositoryId, VecDeque<EngineError>>>,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<DiffCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    signals: IndexSignals,
}

/// Decrements the in-flight counter on every exit path.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full status reported for `repo`.
    pub fn set_state(&self, repo: &RepositoryId, state: RawDiff) {
        self.states
            .write()
            .expect("engine state lock poisoned")
            .insert(repo.clone(), state);
    }

    /// Apply `f` to the status reported for `repo`.
    pub fn update_state(&self, repo: &RepositoryId, f: impl FnOnce(&mut RawDiff)) {
        let mut states = self.states.write().expect("engine state lock poisoned");
        f(states.entry(repo.clone()).or_default());
    }

    /// Make the next diff of `repo` fail with `error`. Queued errors are
    /// consumed in order.
    pub fn fail_next(&self, repo: &RepositoryId, error: EngineError) {
        self.scripted
            .lock()
            .expect("engine script lock poisoned")
            .entry(repo.clone())
            .or_default()
            .push_back(error);
    }

    /// Make the next diff of `repo` report cancellation.
    pub fn cancel_next(&self, repo: &RepositoryId) {
        self.fail_next(repo, EngineError::Cancelled);
    }

    /// Delay every subsequent diff by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().expect("engine latency lock poisoned") = latency;
    }

    /// Fire the index-changed signal for `repo`, as a real engine would after
    /// a commit, checkout or reset.
    pub fn emit_index_changed(&self, repo: &RepositoryId) -> usize {
        self.signals.emit(repo)
    }

    /// All diff calls made so far, in start order.
    pub fn calls(&self) -> Vec<DiffCall> {
        self.calls.lock().expect("engine call log poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("engine call log poisoned").len()
    }

    /// The largest number of diffs that ever ran at the same time.
    pub fn max_concurrent_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn signals(&self) -> &IndexSignals {
        &self.signals
    }
}

impl VcsEngine for InMemoryEngine {
    fn diff(&self, repo: &Repository, filter: Option<&BTreeSet<String>>) -> Result<RawDiff> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let id = repo.id().clone();
        self.calls
            .lock()
            .expect("engine call log poisoned")
            .push(DiffCall {
                repository: id.clone(),
                filter: filter.cloned(),
            });

        let scripted = self
            .scripted
            .lock()
            .expect("engine script lock poisoned")
            .get_mut(&id)
            .and_then(VecDeque::pop_front);

        let state = self
            .states
            .read()
            .expect("engine state lock poisoned")
            .get(&id)
            .cloned()
            .unwrap_or_default();

        let latency = *self.latency.lock().expect("engine latency lock poisoned");
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        if let Some(err) = scripted {
            debug!(repo = %id, error = %err, "scripted diff failure");
            return Err(err);
        }

        Ok(match filter {
            Some(filter) => state.restricted_to(filter),
            None => state,
        })
    }

    fn subscribe_index_changes(&self, repo: &RepositoryId, callback: IndexCallback) -> Subscription {
        self.signals.subscribe(repo, callback)
    }
}
