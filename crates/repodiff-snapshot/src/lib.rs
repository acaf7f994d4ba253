//! Working-tree status snapshots.
//!
//! A snapshot classifies repository-relative paths into the seven status
//! categories that describe how the working tree and the staged index differ
//! from the last committed tree. Snapshots are immutable values; an
//! incremental recompute produces a new snapshot by merging a path-filtered
//! diff into the previous one.
//!
//! # Key Types
//!
//! - [`RawDiff`] -- Uninterpreted result of a (possibly path-filtered) diff
//! - [`DiffSnapshot`] -- Published, immutable classification with merge
//! - [`Category`] / [`PathStatus`] -- Status categories and per-path lookup
//! - [`ChangeScope`] -- Which paths a snapshot recomputed

pub mod category;
pub mod error;
pub mod raw;
pub mod snapshot;

pub use category::{Category, PathStatus};
pub use error::{SnapshotError, SnapshotResult};
pub use raw::RawDiff;
pub use snapshot::{ChangeScope, DiffSnapshot};
