use repodiff_types::TypeError;

/// Errors raised while walking a change-event tree.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// An event carried a path that cannot be mapped into the repository.
    #[error("malformed event path: {0}")]
    InvalidPath(#[from] TypeError),
}

/// Convenience alias used throughout the events crate.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;
