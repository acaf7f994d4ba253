use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while resolving repository paths.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("path is not absolute: {0}")]
    RelativePath(PathBuf),

    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// The path carries `.` or `..` components below the work tree.
    #[error("path is not normalized: {0}")]
    NotNormalized(PathBuf),
}
