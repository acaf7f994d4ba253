//! Filesystem watcher feeding the diff cache.
//!
//! Raw `notify` events for the work tree become flat [`ChangeEvent`] trees
//! published into an [`EventHub`]. Events inside the control directory are
//! not published; the ones that can move the index or HEAD fire the git
//! engine's index-changed signal instead.

use std::path::Path;

use anyhow::Context;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use repodiff_cache::EventHub;
use repodiff_engine::{is_index_change, GitCliEngine};
use repodiff_events::{ChangeEvent, ChangeFlags, ChangeKind, ResourceKind};
use repodiff_types::Repository;
use tracing::{debug, warn};

/// What one raw event means for the cache.
#[derive(Debug, Default, PartialEq)]
pub struct Translated {
    pub tree: Option<ChangeEvent>,
    pub index_changed: bool,
}

/// Keeps a recursive watch on a work tree alive.
pub struct RepoWatcher {
    _watcher: RecommendedWatcher,
}

impl RepoWatcher {
    pub fn start(repo: Repository, hub: EventHub, engine: GitCliEngine) -> anyhow::Result<Self> {
        let work_tree = repo.work_tree().to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let translated = translate(&repo, &event);
                if translated.index_changed {
                    engine.notify_index_changed(repo.id());
                }
                if let Some(tree) = translated.tree {
                    hub.publish(&tree);
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        })
        .context("cannot create file watcher")?;

        watcher
            .watch(&work_tree, RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", work_tree.display()))?;
        debug!(work_tree = %work_tree.display(), "watching");
        Ok(Self { _watcher: watcher })
    }
}

/// Turn one `notify` event into a change-event tree rooted at the work tree.
pub fn translate(repo: &Repository, event: &Event) -> Translated {
    let mut out = Translated::default();
    let mut children = Vec::new();

    let renamed_pair = matches!(event.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
        && event.paths.len() == 2;
    // The source of a rename is gone, so its type comes from the target.
    let renamed_folder = renamed_pair && event.paths[1].is_dir();

    for (i, path) in event.paths.iter().enumerate() {
        if let Ok(inside) = path.strip_prefix(repo.control_dir()) {
            out.index_changed |= is_index_change(inside);
            continue;
        }
        if !repo.contains(path) {
            continue;
        }
        let node = if renamed_pair {
            if i == 0 && renamed_folder {
                ChangeEvent::new(path, ResourceKind::Container, ChangeKind::Moved)
                    .with_flags(ChangeFlags::MOVED_TO)
            } else if i == 0 {
                moved_away(path)
            } else {
                moved_here(path)
            }
        } else {
            match node_for(&event.kind, path) {
                Some(node) => node,
                None => continue,
            }
        };
        children.push(node);
    }

    if !children.is_empty() {
        out.tree = Some(ChangeEvent::container(repo.work_tree()).with_children(children));
    }
    out
}

fn node_for(kind: &EventKind, path: &Path) -> Option<ChangeEvent> {
    let node = match kind {
        EventKind::Access(_) => return None,
        EventKind::Create(CreateKind::Folder) => ChangeEvent::added_container(path),
        EventKind::Create(CreateKind::File) => ChangeEvent::leaf(path, ChangeKind::Added),
        EventKind::Create(_) if path.is_dir() => ChangeEvent::added_container(path),
        EventKind::Create(_) => ChangeEvent::leaf(path, ChangeKind::Added),
        EventKind::Remove(RemoveKind::Folder) => ChangeEvent::removed_container(path),
        EventKind::Remove(_) => ChangeEvent::leaf(path, ChangeKind::Removed),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => moved_away(path),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => moved_here(path),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                moved_here(path)
            } else {
                moved_away(path)
            }
        }
        // Permission and timestamp churn does not change status by itself.
        EventKind::Modify(ModifyKind::Metadata(_)) => ChangeEvent::leaf(path, ChangeKind::Changed),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => ChangeEvent::content_changed(path),
    };
    Some(node)
}

fn moved_away(path: &Path) -> ChangeEvent {
    ChangeEvent::leaf(path, ChangeKind::Moved).with_flags(ChangeFlags::MOVED_TO)
}

fn moved_here(path: &Path) -> ChangeEvent {
    if path.is_dir() {
        ChangeEvent::added_container(path).with_flags(ChangeFlags::MOVED_FROM)
    } else {
        ChangeEvent::leaf(path, ChangeKind::Added).with_flags(ChangeFlags::MOVED_FROM)
    }
}
