//! End-to-end behaviour of the cache driven by a manual scheduler.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use repodiff_cache::{CacheConfig, DiffCacheEntry, DiffCacheRegistry, EventHub, ManualScheduler};
use repodiff_engine::{InMemoryEngine, VcsEngine};
use repodiff_events::{ChangeEvent, ChangeFlags, ChangeKind, ResourceKind};
use repodiff_snapshot::{Category, ChangeScope, RawDiff};
use repodiff_types::Repository;

struct Harness {
    engine: Arc<InMemoryEngine>,
    sched: Arc<ManualScheduler>,
    hub: EventHub,
    registry: Arc<DiffCacheRegistry>,
}

fn harness() -> Harness {
    let engine = Arc::new(InMemoryEngine::new());
    let sched = Arc::new(ManualScheduler::new());
    let hub = EventHub::new();
    let registry = Arc::new(
        DiffCacheRegistry::new(engine.clone(), sched.clone(), CacheConfig::default())
            .with_event_source(Arc::new(hub.clone())),
    );
    Harness {
        engine,
        sched,
        hub,
        registry,
    }
}

fn set(paths: &[&str]) -> BTreeSet<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

/// Publish `children` under the work tree, let the debounce fire, and check
/// that the snapshot matches an unrestricted diff.
fn publish_and_settle(h: &Harness, repo: &Repository, entry: &DiffCacheEntry, children: Vec<ChangeEvent>) {
    h.hub.publish(&ChangeEvent::container(repo.work_tree()).with_children(children));
    h.sched.run_until_idle();
    let full = h.engine.diff(repo, None).unwrap();
    assert_eq!(entry.snapshot().unwrap().as_raw(), &full);
}

#[test]
fn new_untracked_file_appears_after_debounce() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Modified, "src/lib.rs"));
    h.sched.run_pending();

    h.engine.update_state(repo.id(), |s| s.insert(Category::Untracked, "a.txt"));
    h.hub.publish(&ChangeEvent::container("/w").with_child(ChangeEvent::leaf("/w/a.txt", ChangeKind::Added)));

    // Nothing changes until the debounce window closes.
    assert_eq!(entry.snapshot().unwrap().untracked().len(), 0);
    assert_eq!(h.sched.pending_delays(), vec![Duration::from_millis(200)]);

    h.sched.run_pending();
    let snap = entry.snapshot().unwrap();
    assert_eq!(snap.untracked(), &set(&["a.txt"]));
    assert_eq!(snap.modified(), &set(&["src/lib.rs"]));
    assert_eq!(snap.scope(), &ChangeScope::Paths(set(&["a.txt"])));
    assert_eq!(h.engine.calls().last().unwrap().filter, Some(set(&["a.txt"])));
}

#[test]
fn burst_of_trees_becomes_one_incremental_diff() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.sched.run_pending();

    for name in ["a.rs", "b.rs", "c.rs"] {
        h.hub.publish(&ChangeEvent::container("/w").with_child(ChangeEvent::content_changed(format!("/w/{name}"))));
    }
    assert_eq!(entry.pending_paths(), 3);
    assert_eq!(h.sched.pending(), 1);

    h.sched.run_pending();
    assert_eq!(h.engine.call_count(), 2);
    assert_eq!(h.engine.calls()[1].filter, Some(set(&["a.rs", "b.rs", "c.rs"])));
}

#[test]
fn edited_ignore_rules_re_evaluate_ignored_file() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(repo.id(), RawDiff::new().with_ignored("build.log"));
    h.sched.run_pending();
    assert!(entry.snapshot().unwrap().is_ignored("build.log"));

    // The rule covering build.log is deleted; the ignored file is visited
    // before the rules file in this tree.
    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Untracked, "build.log"));
    h.hub.publish(&ChangeEvent::container("/w").with_children([
        ChangeEvent::content_changed("/w/build.log"),
        ChangeEvent::content_changed("/w/.gitignore"),
    ]));
    h.sched.run_pending();

    let snap = entry.snapshot().unwrap();
    assert!(!snap.is_ignored("build.log"));
    assert_eq!(snap.untracked(), &set(&["build.log"]));
}

#[test]
fn hard_reset_during_incremental_ends_with_full_diff() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(
        repo.id(),
        RawDiff::new()
            .with(Category::Modified, "a.rs")
            .with(Category::Added, "new.rs"),
    );
    h.sched.run_pending();

    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    entry.add_listener(move |_, snap| sink.lock().unwrap().push(snap.scope().clone()));

    h.engine.set_latency(Duration::from_millis(150));
    h.hub.publish(&ChangeEvent::container("/w").with_child(ChangeEvent::content_changed("/w/a.rs")));
    let sched = Arc::clone(&h.sched);
    let incremental = thread::spawn(move || sched.run_pending());
    thread::sleep(Duration::from_millis(40));

    // `git reset --hard` while the incremental diff is still running.
    h.engine.set_state(repo.id(), RawDiff::new());
    h.engine.emit_index_changed(repo.id());
    let sched = Arc::clone(&h.sched);
    let full = thread::spawn(move || sched.run_pending());

    incremental.join().unwrap();
    full.join().unwrap();

    let snap = entry.snapshot().unwrap();
    assert!(snap.is_clean());
    assert_eq!(snap.scope(), &ChangeScope::Full);
    assert_eq!(h.engine.max_concurrent_calls(), 1);
    let published = published.lock().unwrap();
    assert_eq!(published.len(), 2);
    assert_eq!(published[1], ChangeScope::Full);
}

#[test]
fn recomputes_of_one_repository_never_overlap() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.sched.run_pending();
    h.engine.set_latency(Duration::from_millis(20));

    let barrier = Arc::new(Barrier::new(6));
    let workers: Vec<_> = (0..6)
        .map(|i| {
            let entry = Arc::clone(&entry);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if i % 2 == 0 {
                    entry.full_recompute().unwrap();
                } else {
                    entry.incremental_recompute(&set(&["x.rs"])).unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(h.engine.max_concurrent_calls(), 1);
    assert_eq!(entry.recompute_count(), 7);
}

#[test]
fn different_repositories_recompute_in_parallel() {
    let h = harness();
    let a = h.registry.get_or_create(&Repository::open("/a"));
    let b = h.registry.get_or_create(&Repository::open("/b"));
    h.sched.run_pending();
    h.engine.set_latency(Duration::from_millis(150));

    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = [a, b]
        .into_iter()
        .map(|entry| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                entry.full_recompute().unwrap();
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(h.engine.max_concurrent_calls(), 2);
}

#[test]
fn engine_failure_then_next_trigger_recovers() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Modified, "a.rs"));
    h.sched.run_pending();
    let good = entry.snapshot().unwrap();

    h.engine.fail_next(repo.id(), repodiff_engine::EngineError::Corrupt("lock held".into()));
    h.engine.set_state(repo.id(), RawDiff::new());
    entry.refresh();
    h.sched.run_pending();
    assert!(Arc::ptr_eq(&good, &entry.snapshot().unwrap()));

    entry.refresh();
    h.sched.run_pending();
    assert!(entry.snapshot().unwrap().is_clean());
}

#[test]
fn events_outside_the_repository_are_ignored() {
    let h = harness();
    let entry = h.registry.get_or_create(&Repository::open("/w"));
    h.sched.run_pending();

    h.hub.publish(&ChangeEvent::container("/elsewhere").with_child(ChangeEvent::content_changed("/elsewhere/x.rs")));
    h.hub.publish(
        &ChangeEvent::container("/w").with_child(
            ChangeEvent::container("/w/.git").with_child(ChangeEvent::content_changed("/w/.git/index")),
        ),
    );
    assert_eq!(entry.pending_paths(), 0);
    assert_eq!(h.sched.pending(), 0);
}

#[test]
fn deleting_untracked_folder_clears_its_entry() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(
        repo.id(),
        RawDiff::new()
            .with(Category::Untracked, "scratch/")
            .with(Category::Modified, "a.rs"),
    );
    h.sched.run_pending();

    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Modified, "a.rs"));
    publish_and_settle(
        &h,
        &repo,
        &entry,
        vec![
            ChangeEvent::leaf("/w/scratch/x.txt", ChangeKind::Removed),
            ChangeEvent::leaf("/w/scratch", ChangeKind::Removed),
        ],
    );
    assert!(entry.snapshot().unwrap().untracked().is_empty());
}

#[test]
fn deleting_tracked_folder_reports_its_files_missing() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.sched.run_pending();

    h.engine.set_state(
        repo.id(),
        RawDiff::new()
            .with(Category::Missing, "src/lib.rs")
            .with(Category::Missing, "src/util/mod.rs"),
    );
    publish_and_settle(&h, &repo, &entry, vec![ChangeEvent::removed_container("/w/src")]);
    assert_eq!(h.engine.calls().last().unwrap().filter, Some(set(&["src/"])));
}

#[test]
fn new_file_in_untracked_folder_is_diffed_through_the_folder() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Untracked, "scratch/"));
    h.sched.run_pending();

    publish_and_settle(&h, &repo, &entry, vec![ChangeEvent::leaf("/w/scratch/b.txt", ChangeKind::Added)]);
    assert_eq!(entry.snapshot().unwrap().untracked(), &set(&["scratch/"]));
    assert_eq!(h.engine.calls().last().unwrap().filter, Some(set(&["scratch/"])));
}

#[test]
fn new_folder_with_files_is_keyed_by_the_folder() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.sched.run_pending();

    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Untracked, "gen/"));
    publish_and_settle(
        &h,
        &repo,
        &entry,
        vec![ChangeEvent::added_container("/w/gen").with_children([
            ChangeEvent::leaf("/w/gen/a.txt", ChangeKind::Added),
            ChangeEvent::leaf("/w/gen/b.txt", ChangeKind::Added),
        ])],
    );
    assert_eq!(h.engine.calls().last().unwrap().filter, Some(set(&["gen/"])));
}

#[test]
fn renamed_folders_move_their_entries() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Untracked, "scratch/"));
    h.sched.run_pending();

    // An untracked folder renamed.
    h.engine.set_state(repo.id(), RawDiff::new().with(Category::Untracked, "notes/"));
    publish_and_settle(
        &h,
        &repo,
        &entry,
        vec![
            ChangeEvent::new("/w/scratch", ResourceKind::Container, ChangeKind::Moved)
                .with_flags(ChangeFlags::MOVED_TO),
            ChangeEvent::added_container("/w/notes").with_flags(ChangeFlags::MOVED_FROM),
        ],
    );

    // A tracked folder renamed.
    h.engine.update_state(repo.id(), |s| {
        s.insert(Category::Missing, "src/a.rs");
        s.insert(Category::Missing, "src/b.rs");
        s.insert(Category::Untracked, "core/");
    });
    publish_and_settle(
        &h,
        &repo,
        &entry,
        vec![
            ChangeEvent::new("/w/src", ResourceKind::Container, ChangeKind::Moved)
                .with_flags(ChangeFlags::MOVED_TO),
            ChangeEvent::added_container("/w/core").with_flags(ChangeFlags::MOVED_FROM),
        ],
    );
    let snap = entry.snapshot().unwrap();
    assert_eq!(snap.untracked(), &set(&["core/", "notes/"]));
    assert_eq!(snap.missing(), &set(&["src/a.rs", "src/b.rs"]));
}

#[test]
fn deleting_ignored_folder_clears_its_entry() {
    let h = harness();
    let repo = Repository::open("/w");
    let entry = h.registry.get_or_create(&repo);
    h.engine.set_state(repo.id(), RawDiff::new().with_ignored("target/"));
    h.sched.run_pending();

    h.engine.set_state(repo.id(), RawDiff::new());
    publish_and_settle(
        &h,
        &repo,
        &entry,
        vec![ChangeEvent::removed_container("/w/target")
            .with_child(ChangeEvent::leaf("/w/target/debug.log", ChangeKind::Removed))],
    );
    assert!(entry.snapshot().unwrap().is_clean());
}
