//! Registry of diff cache entries, one per repository.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use repodiff_engine::VcsEngine;
use repodiff_events::ChangeEvent;
use repodiff_types::{Repository, RepositoryId};
use tracing::info;

use crate::config::CacheConfig;
use crate::entry::DiffCacheEntry;
use crate::scheduler::Scheduler;
use crate::source::EventSource;

/// Owns every [`DiffCacheEntry`] and wires new ones to their inputs.
///
/// Callers hold the registry explicitly (typically as an
/// `Arc<DiffCacheRegistry>`); there is no global instance.
pub struct DiffCacheRegistry {
    engine: Arc<dyn VcsEngine>,
    scheduler: Arc<dyn Scheduler>,
    events: Option<Arc<dyn EventSource>>,
    config: CacheConfig,
    entries: RwLock<HashMap<RepositoryId, Arc<DiffCacheEntry>>>,
}

impl DiffCacheRegistry {
    pub fn new(engine: Arc<dyn VcsEngine>, scheduler: Arc<dyn Scheduler>, config: CacheConfig) -> Self {
        Self {
            engine,
            scheduler,
            events: None,
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe every entry created from now on to `source`.
    pub fn with_event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.events = Some(source);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The entry for `repository`, created on first request.
    ///
    /// Creation happens exactly once per identity even under concurrent
    /// calls. A new entry is subscribed to the engine's index-changed signal
    /// and to the event source, and schedules its first full recompute.
    pub fn get_or_create(&self, repository: &Repository) -> Arc<DiffCacheEntry> {
        if let Some(entry) = self.get(repository.id()) {
            return entry;
        }

        let mut entries = self.entries.write().expect("registry lock poisoned");
        if let Some(entry) = entries.get(repository.id()) {
            return Arc::clone(entry);
        }

        let entry = DiffCacheEntry::new(
            repository.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.scheduler),
            &self.config,
        );

        let weak = Arc::downgrade(&entry);
        entry.attach(self.engine.subscribe_index_changes(
            repository.id(),
            Arc::new(move |_: &RepositoryId| {
                if let Some(entry) = weak.upgrade() {
                    entry.on_index_changed();
                }
            }),
        ));
        if let Some(source) = &self.events {
            let weak = Arc::downgrade(&entry);
            entry.attach(source.subscribe(Arc::new(move |tree: &ChangeEvent| {
                if let Some(entry) = weak.upgrade() {
                    entry.handle_event_tree(tree);
                }
            })));
        }

        info!(
            repo = %repository.id(),
            work_tree = %repository.work_tree().display(),
            "tracking repository"
        );
        entries.insert(repository.id().clone(), Arc::clone(&entry));
        entry
    }

    pub fn get(&self, id: &RepositoryId) -> Option<Arc<DiffCacheEntry>> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(id)
            .cloned()
    }

    /// Stop tracking `id`. Returns `false` if it was not tracked.
    pub fn remove(&self, id: &RepositoryId) -> bool {
        let removed = self.entries.write().expect("registry lock poisoned").remove(id);
        match removed {
            Some(entry) => {
                entry.dispose();
                info!(repo = %id, "stopped tracking repository");
                true
            }
            None => false,
        }
    }

    /// Stop tracking every repository.
    pub fn clear(&self) {
        let drained: Vec<Arc<DiffCacheEntry>> = self
            .entries
            .write()
            .expect("registry lock poisoned")
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in drained {
            entry.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities of every tracked repository, sorted.
    pub fn repositories(&self) -> Vec<RepositoryId> {
        let mut ids: Vec<RepositoryId> = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
