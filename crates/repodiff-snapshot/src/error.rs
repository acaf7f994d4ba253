//! Error types for the snapshot crate.

use crate::category::Category;

/// Errors that can occur while building or interpreting snapshots.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// A path was reported in two categories that no single status allows.
    #[error("path {path} cannot be both {first} and {second}")]
    InconsistentStatus {
        path: String,
        first: Category,
        second: Category,
    },

    /// A category name could not be parsed.
    #[error("unknown status category: {0}")]
    UnknownCategory(String),
}

/// Convenience alias for snapshot results.
pub type SnapshotResult<T> = Result<T, SnapshotError>;
