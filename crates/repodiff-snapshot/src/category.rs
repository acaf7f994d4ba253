//! Status categories and per-path status lookups.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;

/// One of the seven ways a path can differ between HEAD, index and work tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// In the index but not in HEAD.
    Added,
    /// In both, with different content in the index.
    Changed,
    /// In HEAD but removed from the index.
    Removed,
    /// In the index but missing from the work tree.
    Missing,
    /// In the index, with different content in the work tree.
    Modified,
    /// In the work tree only, and not ignored.
    Untracked,
    /// Unmerged entries in the index.
    Conflicting,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 7] = [
        Category::Added,
        Category::Changed,
        Category::Removed,
        Category::Missing,
        Category::Modified,
        Category::Untracked,
        Category::Conflicting,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
            Self::Missing => "missing",
            Self::Modified => "modified",
            Self::Untracked => "untracked",
            Self::Conflicting => "conflicting",
        }
    }

    /// Returns `true` for categories describing the index relative to HEAD.
    pub fn is_staged(self) -> bool {
        matches!(self, Self::Added | Self::Changed | Self::Removed)
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SnapshotError::UnknownCategory(s.to_string()))
    }
}

/// The set of categories a single path belongs to.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PathStatus(u8);

impl PathStatus {
    /// A status with no categories: the path is clean (or unknown).
    pub const CLEAN: PathStatus = PathStatus(0);

    pub fn insert(&mut self, category: Category) {
        self.0 |= category.bit();
    }

    pub fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn is_clean(self) -> bool {
        self.0 == 0
    }

    /// The categories in this status, in [`Category::ALL`] order.
    pub fn categories(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }

    /// Returns `true` if the index differs from HEAD for this path.
    pub fn has_staged_change(self) -> bool {
        self.categories().any(Category::is_staged)
    }
}

impl FromIterator<Category> for PathStatus {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        let mut status = PathStatus::CLEAN;
        for c in iter {
            status.insert(c);
        }
        status
    }
}

impl fmt::Debug for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.categories()).finish()
    }
}
