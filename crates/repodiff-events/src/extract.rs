//! Extraction of the paths a change-event tree forces a repository to
//! re-diff.
//!
//! Extraction runs in two passes over the tree. The first pass only looks
//! for changes to ignore-rule files. The second pass collects paths, and
//! skips paths the previous snapshot already knows to be ignored unless the
//! first pass found an ignore-rule change anywhere in the batch. Running the
//! detection first makes the skip decision independent of traversal order.

use std::collections::BTreeSet;
use std::path::PathBuf;

use repodiff_snapshot::DiffSnapshot;
use repodiff_types::{path, Repository};
use tracing::trace;

use crate::error::ExtractResult;
use crate::event::{ChangeEvent, ChangeKind, ResourceKind};

/// File name of git's per-directory ignore rules.
pub const DEFAULT_IGNORE_FILE: &str = ".gitignore";

/// Result of extracting one change-event tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedChanges {
    /// Repository-relative paths to re-diff. Folder entries end with `/`.
    pub paths: BTreeSet<String>,
    /// Absolute paths of the events that contributed to `paths`.
    pub resources: Vec<PathBuf>,
    /// An ignore-rule file was created, removed or edited.
    pub gitignore_changed: bool,
}

impl ExtractedChanges {
    /// Returns `true` if nothing in the tree requires a recompute.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && !self.gitignore_changed
    }
}

/// How a single node relates to the target repository.
enum Placement {
    /// Not part of the repository; skip the subtree.
    Outside,
    /// Encloses the work tree; descend without recording anything.
    Above,
    /// Inside the work tree at this relative path (`""` for the root).
    Inside(String),
}

/// Extracts re-diff candidates for one repository from change-event trees.
#[derive(Clone, Debug)]
pub struct ChangeSetExtractor {
    ignore_file_name: String,
}

impl Default for ChangeSetExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_FILE)
    }
}

impl ChangeSetExtractor {
    pub fn new(ignore_file_name: impl Into<String>) -> Self {
        Self {
            ignore_file_name: ignore_file_name.into(),
        }
    }

    pub fn ignore_file_name(&self) -> &str {
        &self.ignore_file_name
    }

    /// Extract the paths in `tree` that belong to `repo` and may have
    /// changed status.
    ///
    /// `prior` is the repository's current snapshot, if any; its ignored set
    /// lets extraction drop changes to paths that stay ignored.
    pub fn extract(
        &self,
        tree: &ChangeEvent,
        repo: &Repository,
        prior: Option<&DiffSnapshot>,
    ) -> ExtractResult<ExtractedChanges> {
        let gitignore_changed = self.touches_ignore_rules(tree, repo)?;
        let skip = if gitignore_changed { None } else { prior };

        let mut out = ExtractedChanges {
            gitignore_changed,
            ..Default::default()
        };
        self.collect(tree, repo, skip, &mut out)?;

        trace!(
            repo = %repo.id(),
            paths = out.paths.len(),
            gitignore_changed,
            "extracted change set"
        );
        Ok(out)
    }

    fn placement(&self, node: &ChangeEvent, repo: &Repository) -> ExtractResult<Placement> {
        if node.resource == ResourceKind::Container {
            if node.linked {
                return Ok(Placement::Outside);
            }
            if node.path != repo.work_tree() && repo.work_tree().starts_with(&node.path) {
                return Ok(Placement::Above);
            }
        }
        Ok(match repo.relative_path(&node.path)? {
            Some(rel) => Placement::Inside(rel),
            None => Placement::Outside,
        })
    }

    fn is_ignore_rules(&self, rel: &str) -> bool {
        path::file_name(rel) == self.ignore_file_name
    }

    /// First pass: does any relevant leaf edit an ignore-rule file?
    fn touches_ignore_rules(&self, node: &ChangeEvent, repo: &Repository) -> ExtractResult<bool> {
        match (node.resource, self.placement(node, repo)?) {
            (_, Placement::Outside) => Ok(false),
            (ResourceKind::Container, _) => {
                for child in &node.children {
                    if self.touches_ignore_rules(child, repo)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            (ResourceKind::Leaf, Placement::Above) => Ok(false),
            (ResourceKind::Leaf, Placement::Inside(rel)) => {
                Ok(node.is_interesting() && self.is_ignore_rules(&rel))
            }
        }
    }

    /// Second pass: collect paths, skipping known-ignored ones when `skip`
    /// carries a snapshot.
    fn collect(
        &self,
        node: &ChangeEvent,
        repo: &Repository,
        skip: Option<&DiffSnapshot>,
        out: &mut ExtractedChanges,
    ) -> ExtractResult<()> {
        let rel = match self.placement(node, repo)? {
            Placement::Outside => return Ok(()),
            Placement::Above => {
                for child in &node.children {
                    self.collect(child, repo, skip, out)?;
                }
                return Ok(());
            }
            Placement::Inside(rel) => rel,
        };

        match node.resource {
            ResourceKind::Container => {
                if node.kind != ChangeKind::Changed && !rel.is_empty() {
                    let entry = path::folder(&rel);
                    if !known_ignored(skip, &entry, node.kind) {
                        out.paths.insert(entry);
                        out.resources.push(node.path.clone());
                    }
                }
                for child in &node.children {
                    self.collect(child, repo, skip, out)?;
                }
            }
            ResourceKind::Leaf => {
                if !node.is_interesting() || self.is_ignore_rules(&rel) {
                    return Ok(());
                }
                if known_ignored(skip, &rel, node.kind) {
                    return Ok(());
                }
                // A vanished path may have been a folder reported as `rel/`.
                if node.may_be_vanished_folder() {
                    out.paths.insert(path::folder(&rel));
                }
                out.paths.insert(rel);
                out.resources.push(node.path.clone());
            }
        }
        Ok(())
    }
}

/// Returns `true` if `key` can be left out because the snapshot already
/// reports it as ignored. In-place changes are skipped for ignored paths;
/// creations and deletions only inside an ignored folder, since they add or
/// drop the ignored entry itself.
fn known_ignored(skip: Option<&DiffSnapshot>, key: &str, kind: ChangeKind) -> bool {
    let Some(snapshot) = skip else {
        return false;
    };
    if kind == ChangeKind::Changed {
        return snapshot.is_ignored(key);
    }
    let ignored = snapshot.ignored_not_in_index();
    path::ancestor_folders(key).any(|f| ignored.contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::event::ChangeFlags;
    use repodiff_snapshot::{Category, RawDiff};

    fn repo() -> Repository {
        Repository::open("/ws/project")
    }

    fn prior_with_ignored(ignored: &[&str]) -> DiffSnapshot {
        let mut raw = RawDiff::new();
        for p in ignored {
            raw.ignored_not_in_index.insert(p.to_string());
        }
        DiffSnapshot::full_compute(raw)
    }

    fn paths(out: &ExtractedChanges) -> Vec<&str> {
        out.paths.iter().map(String::as_str).collect()
    }

    #[test]
    fn single_added_file() {
        let tree = ChangeEvent::container("/ws/project")
            .with_child(ChangeEvent::leaf("/ws/project/a.txt", ChangeKind::Added));
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert_eq!(paths(&out), vec!["a.txt"]);
        assert_eq!(out.resources, vec![PathBuf::from("/ws/project/a.txt")]);
        assert!(!out.gitignore_changed);
    }

    #[test]
    fn descends_from_workspace_root_above_work_tree() {
        let tree = ChangeEvent::container("/ws").with_children([
            ChangeEvent::container("/ws/project")
                .with_child(ChangeEvent::content_changed("/ws/project/src/lib.rs")),
            ChangeEvent::container("/ws/other")
                .with_child(ChangeEvent::content_changed("/ws/other/lib.rs")),
        ]);
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert_eq!(paths(&out), vec!["src/lib.rs"]);
    }

    #[test]
    fn control_directory_is_pruned() {
        let tree = ChangeEvent::container("/ws/project").with_child(
            ChangeEvent::container("/ws/project/.git")
                .with_child(ChangeEvent::content_changed("/ws/project/.git/index")),
        );
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn linked_container_is_pruned() {
        let tree = ChangeEvent::container("/ws/project").with_child(
            ChangeEvent::added_container("/ws/project/linked")
                .linked()
                .with_child(ChangeEvent::leaf("/ws/project/linked/x", ChangeKind::Added)),
        );
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn new_folder_is_recorded_and_descended() {
        let tree = ChangeEvent::container("/ws/project").with_child(
            ChangeEvent::added_container("/ws/project/docs")
                .with_child(ChangeEvent::leaf("/ws/project/docs/guide.md", ChangeKind::Added)),
        );
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert_eq!(paths(&out), vec!["docs/", "docs/guide.md"]);
    }

    #[test]
    fn marker_only_leaf_is_pruned() {
        let tree = ChangeEvent::container("/ws/project").with_child(
            ChangeEvent::leaf("/ws/project/a.rs", ChangeKind::Changed).with_flags(ChangeFlags::MARKERS),
        );
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn known_ignored_paths_are_skipped() {
        let prior = prior_with_ignored(&["target/", "debug.log"]);
        let tree = ChangeEvent::container("/ws/project").with_children([
            ChangeEvent::container("/ws/project/target")
                .with_child(ChangeEvent::content_changed("/ws/project/target/out.o")),
            ChangeEvent::content_changed("/ws/project/debug.log"),
            ChangeEvent::content_changed("/ws/project/src.rs"),
        ]);
        let out = ChangeSetExtractor::default()
            .extract(&tree, &repo(), Some(&prior))
            .unwrap();
        assert_eq!(paths(&out), vec!["src.rs"]);
    }

    #[test]
    fn new_folder_inside_ignored_folder_is_not_recorded() {
        let prior = prior_with_ignored(&["target/"]);
        let tree = ChangeEvent::container("/ws/project").with_child(
            ChangeEvent::container("/ws/project/target")
                .with_child(ChangeEvent::added_container("/ws/project/target/release")),
        );
        let out = ChangeSetExtractor::default()
            .extract(&tree, &repo(), Some(&prior))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn removed_folder_is_recorded_as_folder_entry() {
        let tree = ChangeEvent::container("/ws/project").with_child(
            ChangeEvent::removed_container("/ws/project/scratch")
                .with_child(ChangeEvent::leaf("/ws/project/scratch/x.txt", ChangeKind::Removed)),
        );
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert!(out.paths.contains("scratch/"));
        assert!(out.paths.contains("scratch/x.txt"));
    }

    #[test]
    fn vanished_leaf_of_unknown_type_records_both_forms() {
        let tree = ChangeEvent::container("/ws/project").with_children([
            ChangeEvent::leaf("/ws/project/scratch", ChangeKind::Removed),
            ChangeEvent::leaf("/ws/project/docs", ChangeKind::Moved).with_flags(ChangeFlags::MOVED_TO),
            ChangeEvent::leaf("/ws/project/new.rs", ChangeKind::Added),
        ]);
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert_eq!(paths(&out), vec!["docs", "docs/", "new.rs", "scratch", "scratch/"]);
        assert_eq!(out.resources.len(), 3);
    }

    #[test]
    fn deleting_an_ignored_folder_is_not_skipped() {
        let prior = prior_with_ignored(&["target/", "debug.log"]);
        let tree = ChangeEvent::container("/ws/project").with_children([
            ChangeEvent::removed_container("/ws/project/target"),
            ChangeEvent::leaf("/ws/project/debug.log", ChangeKind::Removed),
        ]);
        let out = ChangeSetExtractor::default()
            .extract(&tree, &repo(), Some(&prior))
            .unwrap();
        assert_eq!(paths(&out), vec!["debug.log", "debug.log/", "target/"]);
    }

    #[test]
    fn ignore_rule_change_disables_skip_for_whole_batch() {
        // The ignored file is visited before the ignore-rule file.
        let prior = prior_with_ignored(&["build/"]);
        let tree = ChangeEvent::container("/ws/project").with_children([
            ChangeEvent::container("/ws/project/build")
                .with_child(ChangeEvent::content_changed("/ws/project/build/keep.txt")),
            ChangeEvent::content_changed("/ws/project/.gitignore"),
        ]);
        let out = ChangeSetExtractor::default()
            .extract(&tree, &repo(), Some(&prior))
            .unwrap();
        assert!(out.gitignore_changed);
        assert_eq!(paths(&out), vec!["build/keep.txt"]);
    }

    #[test]
    fn nested_ignore_rule_file_is_detected() {
        let tree = ChangeEvent::container("/ws/project").with_child(
            ChangeEvent::container("/ws/project/sub")
                .with_child(ChangeEvent::leaf("/ws/project/sub/.gitignore", ChangeKind::Added)),
        );
        let out = ChangeSetExtractor::default().extract(&tree, &repo(), None).unwrap();
        assert!(out.gitignore_changed);
        assert!(out.paths.is_empty());
        assert!(!out.is_empty());
    }

    #[test]
    fn custom_ignore_file_name() {
        let tree = ChangeEvent::container("/ws/project")
            .with_child(ChangeEvent::content_changed("/ws/project/.hgignore"));
        let out = ChangeSetExtractor::new(".hgignore")
            .extract(&tree, &repo(), None)
            .unwrap();
        assert!(out.gitignore_changed);
    }

    #[test]
    fn non_ignored_prior_entries_are_not_skipped() {
        let prior = DiffSnapshot::full_compute(RawDiff::new().with(Category::Modified, "a.rs"));
        let tree = ChangeEvent::container("/ws/project")
            .with_child(ChangeEvent::content_changed("/ws/project/a.rs"));
        let out = ChangeSetExtractor::default()
            .extract(&tree, &repo(), Some(&prior))
            .unwrap();
        assert_eq!(paths(&out), vec!["a.rs"]);
    }

    #[test]
    fn relative_event_path_is_an_error() {
        let tree = ChangeEvent::container("/ws/project")
            .with_child(ChangeEvent::content_changed("relative/a.rs"));
        let err = ChangeSetExtractor::default()
            .extract(&tree, &repo(), None)
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidPath(_)));
    }
}
