//! Version-control engine interface for repodiff.
//!
//! The cache never computes status itself. It asks a [`VcsEngine`] for a
//! diff between HEAD, index and work tree, optionally restricted to a set
//! of repository-relative paths, and listens to the engine's coarse
//! "index or HEAD changed" signal.
//!
//! # Modules
//!
//! - [`error`] — Error types for engine operations
//! - [`traits`] — The [`VcsEngine`] trait
//! - [`signals`] — [`IndexSignals`] fan-out and [`Subscription`] handles
//! - [`memory`] — Scripted [`InMemoryEngine`] for tests and embedding
//! - [`git`] — [`GitCliEngine`] backed by `git status --porcelain`

pub mod error;
pub mod git;
pub mod memory;
pub mod signals;
pub mod traits;

pub use error::{EngineError, Result};
pub use git::{is_index_change, parse_porcelain, GitCliEngine};
pub use memory::{DiffCall, InMemoryEngine};
pub use signals::{IndexCallback, IndexSignals, Subscription};
pub use traits::VcsEngine;
