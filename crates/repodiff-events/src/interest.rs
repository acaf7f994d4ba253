//! Cheap pre-pass deciding whether a change-event tree is worth extracting.
//!
//! Most event trees in a busy work tree carry only marker or metadata churn.
//! This check answers "is anything here worth reacting to?" without
//! resolving paths against a repository or building path lists. It accepts
//! a superset of what [`ChangeSetExtractor`](crate::ChangeSetExtractor)
//! would extract: a `false` answer means extraction would find nothing.

use crate::event::{ChangeEvent, ChangeKind, ResourceKind};

/// Returns `true` as soon as one node in `tree` could change a path's
/// version-control status.
pub fn has_interesting_change(tree: &ChangeEvent) -> bool {
    let mut stack = vec![tree];
    while let Some(node) = stack.pop() {
        match node.resource {
            ResourceKind::Container => {
                if node.linked {
                    continue;
                }
                // Created, deleted or moved folders change status on their
                // own, with or without children.
                if node.kind != ChangeKind::Changed {
                    return true;
                }
                stack.extend(node.children.iter());
            }
            ResourceKind::Leaf => {
                if node.is_interesting() {
                    return true;
                }
            }
        }
    }
    false
}
