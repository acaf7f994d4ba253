//! Filesystem change-event trees.
//!
//! The workspace layer reports filesystem activity as a tree of
//! [`ChangeEvent`]s rooted at the top-most changed container. This crate
//! decides whether such a tree matters to a repository at all
//! ([`has_interesting_change`]) and, if so, which repository-relative paths
//! need to be re-diffed ([`ChangeSetExtractor`]).

pub mod error;
pub mod event;
pub mod extract;
pub mod interest;

pub use error::{ExtractError, ExtractResult};
pub use event::{ChangeEvent, ChangeFlags, ChangeKind, ResourceKind};
pub use extract::{ChangeSetExtractor, ExtractedChanges, DEFAULT_IGNORE_FILE};
pub use interest::has_interesting_change;
