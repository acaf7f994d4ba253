//! Repository-relative path conventions.
//!
//! Paths are `/`-separated and relative to the work tree root. An entry that
//! represents a folder always ends with `/`; file entries never do.
//!
//! A set of paths used as a filter *selects* each of its members and, for
//! folder entries, everything beneath them.

use std::collections::BTreeSet;

/// Separator used in repository-relative paths regardless of platform.
pub const SEPARATOR: char = '/';

/// Returns `true` if the path denotes a folder entry.
pub fn is_folder(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Normalize `path` into a folder entry by appending the trailing separator.
pub fn folder(path: &str) -> String {
    if is_folder(path) {
        path.to_string()
    } else {
        format!("{path}{SEPARATOR}")
    }
}

/// The last component of `path`, without any trailing separator.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    match trimmed.rfind(SEPARATOR) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Iterate over the folder entries enclosing `path`, outermost first.
///
/// `"a/b/c.txt"` yields `"a/"` then `"a/b/"`. A folder entry does not yield
/// itself: `"a/b/"` yields only `"a/"`.
pub fn ancestor_folders(path: &str) -> impl Iterator<Item = &str> {
    let last = path.len().saturating_sub(1);
    path.char_indices()
        .filter(move |&(idx, c)| c == SEPARATOR && idx < last)
        .map(move |(idx, _)| &path[..=idx])
}

/// The folder entry directly enclosing `path`, if it is not top-level.
pub fn parent_folder(path: &str) -> Option<&str> {
    ancestor_folders(path).last()
}

/// Returns `true` if `path` lies inside the folder entry `folder`.
pub fn is_within(path: &str, folder: &str) -> bool {
    is_folder(folder) && path.len() > folder.len() && path.starts_with(folder)
}

/// Returns `true` if `selectors` selects `path`: it holds `path` itself or
/// a folder entry enclosing it.
pub fn is_covered(path: &str, selectors: &BTreeSet<String>) -> bool {
    selectors.contains(path) || ancestor_folders(path).any(|f| selectors.contains(f))
}

/// Drop every path already selected by an enclosing folder entry of the
/// same set.
pub fn collapse(paths: &BTreeSet<String>) -> BTreeSet<String> {
    paths
        .iter()
        .filter(|p| !ancestor_folders(p).any(|f| paths.contains(f)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_appends_separator_once() {
        assert_eq!(folder("src"), "src/");
        assert_eq!(folder("src/"), "src/");
        assert!(is_folder("src/"));
        assert!(!is_folder("src/lib.rs"));
    }

    #[test]
    fn file_name_of_file_and_folder() {
        assert_eq!(file_name("a/b/.gitignore"), ".gitignore");
        assert_eq!(file_name("a/b/"), "b");
        assert_eq!(file_name("top.txt"), "top.txt");
    }

    #[test]
    fn ancestors_of_nested_file() {
        let got: Vec<&str> = ancestor_folders("a/b/c.txt").collect();
        assert_eq!(got, vec!["a/", "a/b/"]);
    }

    #[test]
    fn ancestors_of_folder_exclude_itself() {
        let got: Vec<&str> = ancestor_folders("a/b/").collect();
        assert_eq!(got, vec!["a/"]);
        assert_eq!(ancestor_folders("top.txt").count(), 0);
    }

    #[test]
    fn within_requires_folder_prefix() {
        assert!(is_within("target/debug/x", "target/"));
        assert!(!is_within("target/", "target/"));
        assert!(!is_within("targets/x", "target/"));
        assert!(!is_within("target/x", "target"));
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn parent_folder_of_nested_and_top_level() {
        assert_eq!(parent_folder("a/b/c.txt"), Some("a/b/"));
        assert_eq!(parent_folder("a/b/"), Some("a/"));
        assert_eq!(parent_folder("a/"), None);
        assert_eq!(parent_folder("top.txt"), None);
    }

    #[test]
    fn coverage_by_exact_entry_or_enclosing_folder() {
        let selectors = set(&["scratch/", "a.rs"]);
        assert!(is_covered("scratch/", &selectors));
        assert!(is_covered("scratch/deep/b.txt", &selectors));
        assert!(is_covered("a.rs", &selectors));
        assert!(!is_covered("scratch", &selectors));
        assert!(!is_covered("a.rs/x", &selectors));
        assert!(!is_covered("src/a.rs", &selectors));
    }

    #[test]
    fn collapse_keeps_outermost_entries() {
        let got = collapse(&set(&["docs/", "docs/guide.md", "docs/img/", "docs", "src/lib.rs"]));
        assert_eq!(got, set(&["docs", "docs/", "src/lib.rs"]));
    }
}
