use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::path::SEPARATOR;

/// Name of the control directory created by `git init`.
pub const DEFAULT_CONTROL_DIR: &str = ".git";

/// Stable identity of one version-controlled tree.
///
/// The identity is the path of the repository's control directory, which
/// stays fixed for the life of the process even when the same work tree is
/// reached through different workspace paths.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryId {
    control_dir: PathBuf,
}

impl RepositoryId {
    /// Create an identity from a control-directory path.
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self {
            control_dir: control_dir.into(),
        }
    }

    /// The control-directory path this identity wraps.
    pub fn control_dir(&self) -> &Path {
        &self.control_dir
    }
}

impl fmt::Debug for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepositoryId({})", self.control_dir.display())
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.control_dir.display())
    }
}

/// Handle on a repository: its identity plus the work tree it describes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Repository {
    id: RepositoryId,
    work_tree: PathBuf,
}

impl Repository {
    /// Create a handle from an explicit work tree and control directory.
    pub fn new(work_tree: impl Into<PathBuf>, control_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: RepositoryId::new(control_dir),
            work_tree: work_tree.into(),
        }
    }

    /// Create a handle for a non-bare repository whose control directory is
    /// `<work_tree>/.git`.
    pub fn open(work_tree: impl Into<PathBuf>) -> Self {
        let work_tree = work_tree.into();
        let control_dir = work_tree.join(DEFAULT_CONTROL_DIR);
        Self::new(work_tree, control_dir)
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    pub fn control_dir(&self) -> &Path {
        self.id.control_dir()
    }

    /// Returns `true` if `path` is inside the work tree and outside the
    /// control directory.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.work_tree) && !path.starts_with(self.control_dir())
    }

    /// Resolve an absolute filesystem path to its repository-relative form.
    ///
    /// Returns `Ok(None)` when the path does not belong to this repository
    /// (outside the work tree, or inside the control directory). The work
    /// tree root itself resolves to the empty string. A `..` component
    /// below the work tree is an error rather than being resolved.
    pub fn relative_path(&self, path: &Path) -> Result<Option<String>, TypeError> {
        if !path.is_absolute() {
            return Err(TypeError::RelativePath(path.to_path_buf()));
        }
        if !self.contains(path) {
            return Ok(None);
        }
        let Ok(rest) = path.strip_prefix(&self.work_tree) else {
            return Ok(None);
        };

        let mut out = String::new();
        for component in rest.components() {
            let Component::Normal(part) = component else {
                return Err(TypeError::NotNormalized(path.to_path_buf()));
            };
            let part = part
                .to_str()
                .ok_or_else(|| TypeError::NonUtf8Path(path.to_path_buf()))?;
            if !out.is_empty() {
                out.push(SEPARATOR);
            }
            out.push_str(part);
        }
        Ok(Some(out))
    }
}
