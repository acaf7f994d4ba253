//! Error types for engine operations.

use thiserror::Error;

/// Errors that can occur while querying a version-control engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The computation was cancelled before it produced a result.
    #[error("diff cancelled")]
    Cancelled,

    /// The engine could not be started or its output could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine ran but reported failure.
    #[error("{program} exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The engine's output was not in the expected format.
    #[error("malformed engine output: {0}")]
    Parse(String),

    /// The repository is in a state the engine cannot diff.
    #[error("corrupt repository state: {0}")]
    Corrupt(String),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
