//! The published, immutable status snapshot and its incremental merge.

use std::collections::BTreeSet;

use repodiff_types::path;
use serde::Serialize;

use crate::category::{Category, PathStatus};
use crate::raw::RawDiff;

/// Which part of the repository a snapshot recomputed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeScope {
    /// Produced by an unrestricted diff; every path may have changed.
    Full,
    /// Produced by merging a diff restricted to these paths. Folder entries
    /// cover everything beneath them.
    Paths(BTreeSet<String>),
}

impl ChangeScope {
    /// Returns `true` if `path` may have changed classification.
    pub fn covers(&self, path: &str) -> bool {
        match self {
            Self::Full => true,
            Self::Paths(paths) => path::is_covered(path, paths),
        }
    }
}

/// Classification of every differing path in a repository at one instant.
///
/// Snapshots are never mutated after construction. A recompute builds a
/// new snapshot and the owner swaps it in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiffSnapshot {
    #[serde(flatten)]
    entries: RawDiff,
    scope: ChangeScope,
}

impl DiffSnapshot {
    /// Build a snapshot from an unrestricted diff.
    pub fn full_compute(raw: RawDiff) -> Self {
        Self {
            entries: raw,
            scope: ChangeScope::Full,
        }
    }

    /// Fold a diff restricted to `changed_paths` into this snapshot.
    ///
    /// The merge scope is `changed_paths` plus every untracked or ignored
    /// folder entry of `partial` that encloses one of them, since that is
    /// how the engine reports a path inside a wholly untracked or ignored
    /// folder. In every category, a path selected by the scope is present
    /// iff `partial` reports it; every other path keeps its baseline
    /// classification.
    ///
    /// `changed_paths` should come from [`widen`](Self::widen) so that no
    /// baseline folder entry encloses a changed path.
    pub fn merge(&self, changed_paths: &BTreeSet<String>, partial: &RawDiff) -> Self {
        let mut scope = changed_paths.clone();
        scope.extend(partial.enclosing_folders(changed_paths).cloned());

        let mut entries = self.entries.clone();
        for category in Category::ALL {
            merge_set(entries.paths_mut(category), &scope, partial.paths(category));
        }
        merge_set(
            &mut entries.ignored_not_in_index,
            &scope,
            &partial.ignored_not_in_index,
        );

        Self {
            entries,
            scope: ChangeScope::Paths(scope),
        }
    }

    /// Rewrite `changed_paths` into the keys to re-diff against this
    /// snapshot.
    ///
    /// A path inside an untracked or ignored folder entry is replaced by the
    /// outermost such entry: an unrestricted diff only ever reports the
    /// folder, so the folder is what has to be re-diffed. Paths selected by
    /// another folder entry of the result are dropped.
    pub fn widen(&self, changed_paths: &BTreeSet<String>) -> BTreeSet<String> {
        let collapsed = |f: &str| {
            self.entries.untracked.contains(f) || self.entries.ignored_not_in_index.contains(f)
        };
        let widened = changed_paths
            .iter()
            .map(|p| match path::ancestor_folders(p).find(|&f| collapsed(f)) {
                Some(folder) => folder.to_string(),
                None => p.clone(),
            })
            .collect();
        path::collapse(&widened)
    }

    pub fn added(&self) -> &BTreeSet<String> {
        &self.entries.added
    }

    pub fn changed(&self) -> &BTreeSet<String> {
        &self.entries.changed
    }

    pub fn removed(&self) -> &BTreeSet<String> {
        &self.entries.removed
    }

    pub fn missing(&self) -> &BTreeSet<String> {
        &self.entries.missing
    }

    pub fn modified(&self) -> &BTreeSet<String> {
        &self.entries.modified
    }

    pub fn untracked(&self) -> &BTreeSet<String> {
        &self.entries.untracked
    }

    pub fn conflicting(&self) -> &BTreeSet<String> {
        &self.entries.conflicting
    }

    pub fn ignored_not_in_index(&self) -> &BTreeSet<String> {
        &self.entries.ignored_not_in_index
    }

    /// The path set for one category.
    pub fn paths(&self, category: Category) -> &BTreeSet<String> {
        self.entries.paths(category)
    }

    pub fn contains(&self, category: Category, path: &str) -> bool {
        self.paths(category).contains(path)
    }

    /// All categories `path` belongs to.
    pub fn status_of(&self, path: &str) -> PathStatus {
        Category::ALL
            .into_iter()
            .filter(|c| self.contains(*c, path))
            .collect()
    }

    /// Returns `true` if `path`, or a folder enclosing it, is ignored and
    /// not tracked.
    pub fn is_ignored(&self, path: &str) -> bool {
        let ignored = &self.entries.ignored_not_in_index;
        ignored.contains(path) || path::ancestor_folders(path).any(|f| ignored.contains(f))
    }

    pub fn scope(&self) -> &ChangeScope {
        &self.scope
    }

    /// Returns `true` if no category has any entry. Ignored paths do not
    /// count as changes.
    pub fn is_clean(&self) -> bool {
        Category::ALL.iter().all(|c| self.paths(*c).is_empty())
    }

    pub fn has_conflicts(&self) -> bool {
        !self.entries.conflicting.is_empty()
    }

    /// Total number of entries across all seven categories.
    pub fn total_entries(&self) -> usize {
        Category::ALL.iter().map(|c| self.paths(*c).len()).sum()
    }

    /// The underlying path sets.
    pub fn as_raw(&self) -> &RawDiff {
        &self.entries
    }
}

fn merge_set(target: &mut BTreeSet<String>, scope: &BTreeSet<String>, fresh: &BTreeSet<String>) {
    target.retain(|p| !path::is_covered(p, scope));
    target.extend(fresh.iter().filter(|p| path::is_covered(p, scope)).cloned());
}
