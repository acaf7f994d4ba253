//! Foundation types for repodiff.
//!
//! Every other repodiff crate depends on `repodiff-types` for the identity
//! of a repository and for the repository-relative path conventions shared
//! by snapshots, change-event extraction and the diff engines.
//!
//! # Key Types
//!
//! - [`RepositoryId`] — Stable key for one repository (its control directory)
//! - [`Repository`] — Handle pairing the identity with its work tree
//! - [`path`] — Helpers for `/`-separated repository-relative paths

pub mod error;
pub mod path;
pub mod repository;

pub use error::TypeError;
pub use repository::{Repository, RepositoryId, DEFAULT_CONTROL_DIR};
