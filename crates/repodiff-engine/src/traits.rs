//! The [`VcsEngine`] trait defining the engine interface.

use std::collections::BTreeSet;

use repodiff_snapshot::RawDiff;
use repodiff_types::{Repository, RepositoryId};

use crate::error::Result;
use crate::signals::{IndexCallback, Subscription};

/// A version-control backend able to classify working-tree paths.
///
/// Implementations must be thread-safe (`Send + Sync`): the cache calls
/// `diff` from worker threads, one repository at a time per repository but
/// several repositories in parallel.
pub trait VcsEngine: Send + Sync {
    /// Compute the status of `repo`.
    ///
    /// With `filter == None` the diff covers the whole repository. With a
    /// filter, only paths equal to a filter entry or beneath a folder entry
    /// are reported, each in the form the unrestricted diff uses: a path
    /// inside a wholly untracked or ignored folder comes back as that
    /// folder's entry. An empty filter reports nothing.
    ///
    /// [`RawDiff::restricted_to`] applied to the unrestricted diff gives the
    /// expected answer.
    fn diff(&self, repo: &Repository, filter: Option<&BTreeSet<String>>) -> Result<RawDiff>;

    /// Register `callback` to run whenever the index or HEAD of `repo` may
    /// have changed. Dropping the returned handle unregisters it.
    fn subscribe_index_changes(&self, repo: &RepositoryId, callback: IndexCallback) -> Subscription;
}
