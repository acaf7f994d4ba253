//! Error types for cache operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by recomputes and configuration loading.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The version-control engine failed to produce a diff.
    #[error("engine error: {0}")]
    Engine(#[from] repodiff_engine::EngineError),

    /// The engine's diff describes an impossible status combination.
    #[error("inconsistent diff: {0}")]
    Snapshot(#[from] repodiff_snapshot::SnapshotError),

    /// A configuration file could not be read.
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid TOML for [`CacheConfig`](crate::CacheConfig).
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
