//! Uninterpreted diff results as reported by a version-control engine.

use std::collections::BTreeSet;
use std::ops::Bound;

use repodiff_types::path;
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::{SnapshotError, SnapshotResult};

/// Category pairs that no single path may occupy together.
const EXCLUSIVE: [(Category, Category); 8] = [
    (Category::Added, Category::Changed),
    (Category::Added, Category::Removed),
    (Category::Changed, Category::Removed),
    (Category::Missing, Category::Modified),
    (Category::Missing, Category::Untracked),
    (Category::Modified, Category::Untracked),
    (Category::Added, Category::Untracked),
    (Category::Changed, Category::Untracked),
];

/// The path sets produced by one diff between HEAD, index and work tree.
///
/// When the diff was restricted by a path filter, only paths matching the
/// filter are present.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDiff {
    pub added: BTreeSet<String>,
    pub changed: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub missing: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
    pub conflicting: BTreeSet<String>,
    /// Ignored paths that are not tracked by the index. Folder entries end
    /// with `/` and cover everything beneath them.
    pub ignored_not_in_index: BTreeSet<String>,
}

impl RawDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// The path set for one category.
    pub fn paths(&self, category: Category) -> &BTreeSet<String> {
        match category {
            Category::Added => &self.added,
            Category::Changed => &self.changed,
            Category::Removed => &self.removed,
            Category::Missing => &self.missing,
            Category::Modified => &self.modified,
            Category::Untracked => &self.untracked,
            Category::Conflicting => &self.conflicting,
        }
    }

    pub fn paths_mut(&mut self, category: Category) -> &mut BTreeSet<String> {
        match category {
            Category::Added => &mut self.added,
            Category::Changed => &mut self.changed,
            Category::Removed => &mut self.removed,
            Category::Missing => &mut self.missing,
            Category::Modified => &mut self.modified,
            Category::Untracked => &mut self.untracked,
            Category::Conflicting => &mut self.conflicting,
        }
    }

    /// Record `path` under `category`.
    pub fn insert(&mut self, category: Category, path: impl Into<String>) {
        self.paths_mut(category).insert(path.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, category: Category, path: impl Into<String>) -> Self {
        self.insert(category, path);
        self
    }

    /// Builder-style insertion into the ignored set.
    pub fn with_ignored(mut self, path: impl Into<String>) -> Self {
        self.ignored_not_in_index.insert(path.into());
        self
    }

    /// Returns `true` if no category and no ignored entry is populated.
    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.paths(*c).is_empty())
            && self.ignored_not_in_index.is_empty()
    }

    /// Check that every path occupies a combination of categories that a
    /// single version-control status can produce.
    pub fn validate(&self) -> SnapshotResult<()> {
        for (first, second) in EXCLUSIVE {
            let (small, large) = if self.paths(first).len() <= self.paths(second).len() {
                (self.paths(first), self.paths(second))
            } else {
                (self.paths(second), self.paths(first))
            };
            if let Some(path) = small.iter().find(|p| large.contains(*p)) {
                return Err(SnapshotError::InconsistentStatus {
                    path: path.clone(),
                    first,
                    second,
                });
            }
        }
        Ok(())
    }

    /// Keep only the entries a diff restricted to `filter` reports.
    ///
    /// A filter entry selects itself and, when it is a folder entry,
    /// everything beneath it. Untracked and ignored folder entries that
    /// enclose a filter path are kept too: they are the form an unrestricted
    /// diff gives that path.
    pub fn restricted_to(&self, filter: &BTreeSet<String>) -> RawDiff {
        let mut out = RawDiff::new();
        for category in Category::ALL {
            *out.paths_mut(category) = self
                .paths(category)
                .iter()
                .filter(|p| path::is_covered(p, filter))
                .cloned()
                .collect();
        }
        let keep_collapsed = |p: &str| path::is_covered(p, filter) || encloses_any(p, filter);
        out.untracked = self
            .untracked
            .iter()
            .filter(|p| keep_collapsed(p.as_str()))
            .cloned()
            .collect();
        out.ignored_not_in_index = self
            .ignored_not_in_index
            .iter()
            .filter(|p| keep_collapsed(p.as_str()))
            .cloned()
            .collect();
        out
    }

    /// Untracked and ignored folder entries enclosing at least one of `paths`.
    pub fn enclosing_folders<'a>(
        &'a self,
        paths: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a String> + 'a {
        self.untracked
            .iter()
            .chain(&self.ignored_not_in_index)
            .filter(move |p| encloses_any(p, paths))
    }
}

fn encloses_any(folder: &str, paths: &BTreeSet<String>) -> bool {
    path::is_folder(folder)
        && paths
            .range::<str, _>((Bound::Excluded(folder), Bound::Unbounded))
            .next()
            .is_some_and(|p| path::is_within(p, folder))
}
