//! Per-repository snapshot holder and recompute state machine.
//!
//! ```text
//! Uninitialized ──full──▶ Ready ──index changed / refresh──▶ Computing(full) ──▶ Ready
//!                           └────coalesced batch───▶ Computing(incremental) ──▶ Ready
//! ```
//!
//! At most one recompute runs per entry at any time. Readers of
//! [`DiffCacheEntry::snapshot`] never wait on it.

use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use repodiff_engine::{Subscription, VcsEngine};
use repodiff_events::{has_interesting_change, ChangeEvent, ChangeSetExtractor};
use repodiff_snapshot::DiffSnapshot;
use repodiff_types::{Repository, RepositoryId};
use tracing::{debug, trace, warn};

use crate::coalescer::{PendingChanges, UpdateCoalescer};
use crate::config::CacheConfig;
use crate::error::CacheResult;
use crate::scheduler::{Scheduler, TaskHandle};

/// Called with every newly published snapshot.
pub type Listener = Arc<dyn Fn(&RepositoryId, &Arc<DiffSnapshot>) + Send + Sync>;

/// Token returned by [`DiffCacheEntry::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// The two ways a snapshot gets rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecomputeKind {
    /// Unrestricted diff replacing the whole snapshot.
    Full,
    /// Diff restricted to changed paths, merged into the current snapshot.
    Incremental,
}

impl fmt::Display for RecomputeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// Observable lifecycle state of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// No snapshot has been published yet and nothing is computing.
    Uninitialized,
    Computing(RecomputeKind),
    /// A snapshot is published and nothing is computing.
    Ready,
}

const IDLE: u8 = 0;
const FULL: u8 = 1;
const INCREMENTAL: u8 = 2;

/// Marks the entry as computing for the lifetime of the guard.
struct Computing<'a>(&'a AtomicU8);

impl<'a> Computing<'a> {
    fn enter(flag: &'a AtomicU8, kind: RecomputeKind) -> Self {
        let code = match kind {
            RecomputeKind::Full => FULL,
            RecomputeKind::Incremental => INCREMENTAL,
        };
        flag.store(code, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for Computing<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::SeqCst);
    }
}

/// Cached diff state for one repository.
///
/// Created through [`DiffCacheRegistry::get_or_create`](crate::DiffCacheRegistry::get_or_create),
/// which wires the entry to the engine's index-changed signal and to the
/// change-event source. Construction schedules the first full recompute.
pub struct DiffCacheEntry {
    repository: Repository,
    engine: Arc<dyn VcsEngine>,
    scheduler: Arc<dyn Scheduler>,
    extractor: ChangeSetExtractor,
    debounce: Duration,

    snapshot: RwLock<Option<Arc<DiffSnapshot>>>,
    recompute_lock: Mutex<()>,
    computing: AtomicU8,
    recomputes: AtomicUsize,
    pending_full: Mutex<Option<TaskHandle>>,
    coalescer: UpdateCoalescer,

    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,

    disposed: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
    this: Weak<DiffCacheEntry>,
}

impl DiffCacheEntry {
    /// Create an entry and schedule its first full recompute after
    /// [`CacheConfig::initial_full_delay`].
    pub fn new(
        repository: Repository,
        engine: Arc<dyn VcsEngine>,
        scheduler: Arc<dyn Scheduler>,
        config: &CacheConfig,
    ) -> Arc<Self> {
        let entry = Arc::new_cyclic(|this: &Weak<Self>| {
            let weak = this.clone();
            let coalescer = UpdateCoalescer::new(
                Arc::clone(&scheduler),
                config.debounce(),
                Arc::new(move |changes: PendingChanges| {
                    if let Some(entry) = weak.upgrade() {
                        entry.run_incremental(changes);
                    }
                }),
            );
            Self {
                repository,
                engine,
                scheduler,
                extractor: ChangeSetExtractor::new(config.ignore_file_name.clone()),
                debounce: config.debounce(),
                snapshot: RwLock::new(None),
                recompute_lock: Mutex::new(()),
                computing: AtomicU8::new(IDLE),
                recomputes: AtomicUsize::new(0),
                pending_full: Mutex::new(None),
                coalescer,
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
                this: this.clone(),
            }
        });
        entry.schedule_full_recompute(config.initial_full_delay());
        entry
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn id(&self) -> &RepositoryId {
        self.repository.id()
    }

    /// The latest published snapshot, if any. Never blocks on a recompute.
    pub fn snapshot(&self) -> Option<Arc<DiffSnapshot>> {
        self.snapshot.read().expect("snapshot lock poisoned").clone()
    }

    pub fn state(&self) -> EntryState {
        match self.computing.load(Ordering::SeqCst) {
            FULL => EntryState::Computing(RecomputeKind::Full),
            INCREMENTAL => EntryState::Computing(RecomputeKind::Incremental),
            _ if self.snapshot.read().expect("snapshot lock poisoned").is_some() => {
                EntryState::Ready
            }
            _ => EntryState::Uninitialized,
        }
    }

    /// Number of snapshots published so far.
    pub fn recompute_count(&self) -> usize {
        self.recomputes.load(Ordering::SeqCst)
    }

    /// Number of changed paths waiting for the debounce window to close.
    pub fn pending_paths(&self) -> usize {
        self.coalescer.pending_len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Request a full recompute as soon as a worker is free.
    pub fn refresh(&self) {
        self.schedule_full_recompute(Duration::ZERO);
    }

    /// React to the engine's coarse index-changed signal.
    pub fn on_index_changed(&self) {
        debug!(repo = %self.id(), "index changed, scheduling full recompute");
        self.schedule_full_recompute(Duration::ZERO);
    }

    /// Schedule a full recompute after `delay`.
    ///
    /// A previously scheduled full recompute that has not started yet is
    /// cancelled; one that is already running is left alone, and this
    /// request runs after it.
    pub fn schedule_full_recompute(&self, delay: Duration) {
        if self.is_disposed() {
            return;
        }
        let mut pending = self.pending_full.lock().expect("pending full lock poisoned");
        if let Some(previous) = pending.take() {
            if previous.cancel() {
                trace!(repo = %self.id(), "superseded scheduled full recompute");
            }
        }
        let weak = self.this.clone();
        let handle = self.scheduler.schedule(
            Box::new(move || {
                if let Some(entry) = weak.upgrade() {
                    entry.run_full();
                }
            }),
            delay,
        );
        *pending = Some(handle);
    }

    /// Feed a change-event tree through the quick check, the extractor and
    /// the coalescer.
    pub fn handle_event_tree(&self, tree: &ChangeEvent) {
        if self.is_disposed() {
            return;
        }
        if !has_interesting_change(tree) {
            trace!(repo = %self.id(), "uninteresting event tree");
            return;
        }
        let prior = self.snapshot();
        match self.extractor.extract(tree, &self.repository, prior.as_deref()) {
            Ok(changes) if changes.gitignore_changed => {
                // Ignore rules moved: any path may have changed ignored state.
                debug!(repo = %self.id(), "ignore rules changed, scheduling full recompute");
                self.schedule_full_recompute(self.debounce);
            }
            Ok(changes) if changes.paths.is_empty() => {}
            Ok(changes) => {
                debug!(repo = %self.id(), paths = changes.paths.len(), "queueing changed paths");
                self.coalescer.add_changes(changes.paths, changes.resources);
            }
            Err(e) => {
                warn!(repo = %self.id(), error = %e, "cannot extract changes, dropping event tree");
            }
        }
    }

    /// Recompute the whole snapshot now, on the calling thread.
    ///
    /// Returns the published snapshot, or `None` if the engine cancelled the
    /// diff or the entry was disposed meanwhile. On error the previous
    /// snapshot stays published.
    pub fn full_recompute(&self) -> CacheResult<Option<Arc<DiffSnapshot>>> {
        if self.is_disposed() {
            return Ok(None);
        }
        let guard = self.lock_recompute();
        let published = self.compute_full_locked()?;
        drop(guard);
        Ok(published.inspect(|snapshot| self.notify(snapshot)))
    }

    /// Re-diff `paths` now, on the calling thread, and merge the result into
    /// the current snapshot. Falls back to a full recompute when nothing has
    /// been published yet.
    ///
    /// Paths inside a folder the current snapshot reports as untracked or
    /// ignored are re-diffed through that folder's entry.
    pub fn incremental_recompute(
        &self,
        paths: &BTreeSet<String>,
    ) -> CacheResult<Option<Arc<DiffSnapshot>>> {
        if self.is_disposed() || paths.is_empty() {
            return Ok(None);
        }
        let guard = self.lock_recompute();
        let published = match self.snapshot() {
            None => {
                debug!(repo = %self.id(), "no snapshot yet, incremental recompute falls back to full");
                self.compute_full_locked()?
            }
            Some(current) => {
                let _computing = Computing::enter(&self.computing, RecomputeKind::Incremental);
                let keys = current.widen(paths);
                if keys != *paths {
                    trace!(repo = %self.id(), requested = paths.len(), keys = keys.len(), "widened changed paths");
                }
                match self.engine.diff(&self.repository, Some(&keys)) {
                    Ok(partial) => {
                        partial.validate()?;
                        self.publish(current.merge(&keys, &partial), RecomputeKind::Incremental)
                    }
                    Err(e) if e.is_cancelled() => {
                        debug!(repo = %self.id(), "incremental recompute cancelled");
                        None
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };
        drop(guard);
        Ok(published.inspect(|snapshot| self.notify(snapshot)))
    }

    /// Register `listener` for every future snapshot.
    pub fn add_listener(
        &self,
        listener: impl Fn(&RepositoryId, &Arc<DiffSnapshot>) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("listener lock poisoned");
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().expect("listener lock poisoned").len()
    }

    /// Stop all scheduled work and unhook from event sources. Recomputes
    /// already running finish, but their results are discarded.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.pending_full.lock().expect("pending full lock poisoned").take() {
            handle.cancel();
        }
        self.coalescer.cancel_and_clear();
        let subscriptions = mem::take(&mut *self.subscriptions.lock().expect("subscription lock poisoned"));
        drop(subscriptions);
        debug!(repo = %self.id(), "entry disposed");
    }

    pub(crate) fn attach(&self, subscription: Subscription) {
        if self.is_disposed() {
            return;
        }
        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .push(subscription);
    }

    /// The guarded data is `()`, so a recompute that panicked leaves nothing
    /// to repair and the lock stays usable.
    fn lock_recompute(&self) -> MutexGuard<'_, ()> {
        self.recompute_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_full(&self) {
        if let Err(e) = self.full_recompute() {
            warn!(repo = %self.id(), error = %e, "full recompute failed, keeping previous snapshot");
        }
    }

    fn run_incremental(&self, changes: PendingChanges) {
        if let Err(e) = self.incremental_recompute(&changes.paths) {
            warn!(
                repo = %self.id(),
                paths = changes.paths.len(),
                error = %e,
                "incremental recompute failed, keeping previous snapshot"
            );
        }
    }

    /// Caller holds `recompute_lock`.
    fn compute_full_locked(&self) -> CacheResult<Option<Arc<DiffSnapshot>>> {
        let _computing = Computing::enter(&self.computing, RecomputeKind::Full);
        let raw = match self.engine.diff(&self.repository, None) {
            Ok(raw) => raw,
            Err(e) if e.is_cancelled() => {
                debug!(repo = %self.id(), "full recompute cancelled");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        raw.validate()?;
        Ok(self.publish(DiffSnapshot::full_compute(raw), RecomputeKind::Full))
    }

    fn publish(&self, snapshot: DiffSnapshot, kind: RecomputeKind) -> Option<Arc<DiffSnapshot>> {
        if self.is_disposed() {
            debug!(repo = %self.id(), %kind, "entry disposed, discarding result");
            return None;
        }
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().expect("snapshot lock poisoned") = Some(Arc::clone(&snapshot));
        self.recomputes.fetch_add(1, Ordering::SeqCst);
        debug!(repo = %self.id(), %kind, entries = snapshot.total_entries(), "snapshot published");
        Some(snapshot)
    }

    fn notify(&self, snapshot: &Arc<DiffSnapshot>) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .expect("listener lock poisoned")
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(self.id(), snapshot);
        }
    }
}

impl fmt::Debug for DiffCacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffCacheEntry")
            .field("repository", &self.repository)
            .field("state", &self.state())
            .field("recomputes", &self.recompute_count())
            .finish()
    }
}
