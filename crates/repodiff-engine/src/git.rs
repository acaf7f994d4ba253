//! Engine backed by the `git` command-line tool.
//!
//! Status comes from `git status --porcelain=v1 -z`, which reports one
//! `XY path` record per path: `X` is the index column (HEAD vs index) and
//! `Y` the work-tree column (index vs work tree).
//!
//! | Record          | Category                      |
//! |-----------------|-------------------------------|
//! | `A?`            | added                         |
//! | `M?`, `T?`      | changed                       |
//! | `D?`            | removed                       |
//! | `?M`, `?T`      | modified                      |
//! | `?D`            | missing                       |
//! | `??`            | untracked                     |
//! | `!!`            | ignored, not in index         |
//! | `DD AU UD UA DU AA UU` | conflicting            |
//!
//! A filtered diff reports every untracked path in the form an unrestricted
//! status would, collapsing it into the enclosing untracked folder when
//! there is one. `git` already does this for ignored folders.
//!
//! `git` writes nothing about index changes, so [`GitCliEngine`] only owns
//! the signal fan-out; a file watcher calls
//! [`notify_index_changed`](GitCliEngine::notify_index_changed) when
//! [`is_index_change`] says a control-directory path matters.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use repodiff_snapshot::{Category, RawDiff};
use repodiff_types::{path, Repository, RepositoryId};
use tracing::{debug, trace, warn};

use crate::error::{EngineError, Result};
use crate::signals::{IndexCallback, IndexSignals, Subscription};
use crate::traits::VcsEngine;

/// Filters longer than this are applied locally to a full status instead
/// of being passed as pathspecs.
const MAX_PATHSPECS: usize = 512;

const UNMERGED: [&[u8; 2]; 7] = [b"DD", b"AU", b"UD", b"UA", b"DU", b"AA", b"UU"];

/// [`VcsEngine`] that shells out to `git`.
#[derive(Clone)]
pub struct GitCliEngine {
    program: PathBuf,
    signals: IndexSignals,
}

impl Default for GitCliEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCliEngine {
    /// Use the `git` found on `PATH`.
    pub fn new() -> Self {
        Self::with_program("git")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            signals: IndexSignals::new(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Announce that the index or HEAD of `repo` changed.
    pub fn notify_index_changed(&self, repo: &RepositoryId) -> usize {
        self.signals.emit(repo)
    }

    fn status_command(&self, repo: &Repository, pathspecs: Option<&BTreeSet<String>>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(repo.work_tree())
            // Keep `git status` from refreshing the index, which would
            // itself look like an index change to a watcher.
            .env("GIT_OPTIONAL_LOCKS", "0")
            .arg("--git-dir")
            .arg(repo.control_dir())
            .arg("--work-tree")
            .arg(repo.work_tree())
            .args([
                "status",
                "--porcelain=v1",
                "-z",
                "--untracked-files=normal",
                "--ignored=matching",
                "--no-renames",
            ]);
        if let Some(paths) = pathspecs {
            cmd.arg("--");
            cmd.args(paths.iter().map(|p| format!(":(literal){p}")));
        }
        cmd
    }
}

impl GitCliEngine {
    fn run_status(&self, repo: &Repository, pathspecs: Option<&BTreeSet<String>>) -> Result<RawDiff> {
        let output = self.status_command(repo, pathspecs).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(repo = %repo.id(), code = ?output.status.code(), %stderr, "git status failed");
            return Err(EngineError::CommandFailed {
                program: self.program.display().to_string(),
                code: output.status.code(),
                stderr,
            });
        }
        debug!(
            repo = %repo.id(),
            pathspecs = pathspecs.map_or(0, BTreeSet::len),
            bytes = output.stdout.len(),
            "git status"
        );
        parse_porcelain(&output.stdout)
    }

    /// Rewrite untracked entries into the form an unrestricted status gives.
    ///
    /// Under a file pathspec `git` reports `?? dir/file` even when the whole
    /// of `dir/` is untracked, where an unrestricted status reports `?? dir/`.
    /// Each enclosing folder not already selected by `filter` is asked about
    /// directly, one level at a time, until one does not collapse.
    fn collapse_untracked(
        &self,
        repo: &Repository,
        filter: &BTreeSet<String>,
        diff: &mut RawDiff,
    ) -> Result<()> {
        let mut pending: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &diff.untracked {
            push_parent(&mut pending, entry, filter);
        }

        while !pending.is_empty() {
            let folders: BTreeSet<String> = pending.keys().cloned().collect();
            let folder_status = self.run_status(repo, Some(&folders))?;
            let mut next = BTreeMap::new();
            for (folder, entries) in pending {
                if !folder_status.untracked.contains(&folder) {
                    continue;
                }
                trace!(repo = %repo.id(), %folder, entries = entries.len(), "untracked folder collapses");
                for entry in &entries {
                    diff.untracked.remove(entry);
                }
                push_parent(&mut next, &folder, filter);
                diff.untracked.insert(folder);
            }
            pending = next;
        }
        diff.untracked = path::collapse(&diff.untracked);
        Ok(())
    }
}

fn push_parent(pending: &mut BTreeMap<String, Vec<String>>, entry: &str, filter: &BTreeSet<String>) {
    if let Some(parent) = path::parent_folder(entry) {
        if !path::is_covered(parent, filter) {
            pending.entry(parent.to_string()).or_default().push(entry.to_string());
        }
    }
}

impl VcsEngine for GitCliEngine {
    fn diff(&self, repo: &Repository, filter: Option<&BTreeSet<String>>) -> Result<RawDiff> {
        match filter {
            None => self.run_status(repo, None),
            Some(filter) if filter.is_empty() => Ok(RawDiff::new()),
            Some(filter) if filter.len() > MAX_PATHSPECS => {
                Ok(self.run_status(repo, None)?.restricted_to(filter))
            }
            Some(filter) => {
                let mut diff = self.run_status(repo, Some(filter))?;
                self.collapse_untracked(repo, filter, &mut diff)?;
                Ok(diff)
            }
        }
    }

    fn subscribe_index_changes(&self, repo: &RepositoryId, callback: IndexCallback) -> Subscription {
        self.signals.subscribe(repo, callback)
    }
}

/// Parse `git status --porcelain=v1 -z` output.
pub fn parse_porcelain(output: &[u8]) -> Result<RawDiff> {
    let mut diff = RawDiff::new();
    let mut records = output.split(|b| *b == 0).filter(|r| !r.is_empty());

    while let Some(record) = records.next() {
        if record.len() < 4 || record[2] != b' ' {
            return Err(EngineError::Parse(format!(
                "bad status record {:?}",
                String::from_utf8_lossy(record)
            )));
        }
        let (x, y) = (record[0], record[1]);
        let path = std::str::from_utf8(&record[3..])
            .map_err(|_| {
                EngineError::Parse(format!(
                    "non-UTF-8 path {:?}",
                    String::from_utf8_lossy(&record[3..])
                ))
            })?
            .to_string();

        // Rename and copy records carry the source path as the next record.
        if matches!(x, b'R' | b'C') || matches!(y, b'R' | b'C') {
            let source = records
                .next()
                .ok_or_else(|| EngineError::Parse(format!("rename of {path} has no source")))?;
            if x == b'R' {
                let source = String::from_utf8_lossy(source).into_owned();
                diff.insert(Category::Removed, source);
            }
        }

        match (x, y) {
            (b'?', b'?') => diff.insert(Category::Untracked, path),
            (b'!', b'!') => {
                diff.ignored_not_in_index.insert(path);
            }
            _ if UNMERGED.iter().any(|code| code[0] == x && code[1] == y) => {
                diff.insert(Category::Conflicting, path)
            }
            _ => {
                match x {
                    b'A' | b'R' | b'C' => diff.insert(Category::Added, path.clone()),
                    b'M' | b'T' => diff.insert(Category::Changed, path.clone()),
                    b'D' => diff.insert(Category::Removed, path.clone()),
                    b' ' => {}
                    other => {
                        return Err(EngineError::Parse(format!(
                            "unknown index status {:?} for {path}",
                            other as char
                        )))
                    }
                }
                match y {
                    b'M' | b'T' => diff.insert(Category::Modified, path),
                    b'D' => diff.insert(Category::Missing, path),
                    // Intent-to-add and work-tree rename columns carry no
                    // category of their own.
                    b' ' | b'A' | b'R' | b'C' => {}
                    other => {
                        return Err(EngineError::Parse(format!(
                            "unknown work-tree status {:?} for {path}",
                            other as char
                        )))
                    }
                }
            }
        }
    }
    Ok(diff)
}

/// Returns `true` if a change to `relative` (a path inside the control
/// directory) can move the index or HEAD.
pub fn is_index_change(relative: &Path) -> bool {
    let Some(first) = relative.components().next() else {
        return false;
    };
    if relative.extension().is_some_and(|e| e == "lock") {
        return false;
    }
    match first.as_os_str().to_str() {
        Some("index" | "HEAD" | "ORIG_HEAD" | "MERGE_HEAD" | "packed-refs" | "refs") => true,
        _ => false,
    }
}
