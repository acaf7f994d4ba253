use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

/// Whether an event node describes a folder-like resource or a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Container,
    Leaf,
}

/// The primary kind of change recorded for a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Removed,
    /// The resource still exists; `flags` say what changed about it.
    Changed,
    Moved,
    Replaced,
    TypeChanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
            Self::Moved => "moved",
            Self::Replaced => "replaced",
            Self::TypeChanged => "type-changed",
        };
        f.write_str(s)
    }
}

/// Bitset of change sub-kinds attached to an event.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeFlags(u32);

impl ChangeFlags {
    pub const CONTENT: ChangeFlags = ChangeFlags(1 << 0);
    pub const MOVED_FROM: ChangeFlags = ChangeFlags(1 << 1);
    pub const MOVED_TO: ChangeFlags = ChangeFlags(1 << 2);
    pub const OPEN: ChangeFlags = ChangeFlags(1 << 3);
    pub const REPLACED: ChangeFlags = ChangeFlags(1 << 4);
    pub const TYPE: ChangeFlags = ChangeFlags(1 << 5);
    /// Marker or annotation churn only.
    pub const MARKERS: ChangeFlags = ChangeFlags(1 << 6);
    pub const SYNC: ChangeFlags = ChangeFlags(1 << 7);
    pub const ENCODING: ChangeFlags = ChangeFlags(1 << 8);
    pub const DESCRIPTION: ChangeFlags = ChangeFlags(1 << 9);
    pub const LOCAL_CHANGED: ChangeFlags = ChangeFlags(1 << 10);

    /// Sub-kinds that can alter a path's version-control status.
    pub const INTERESTING: ChangeFlags = ChangeFlags(
        Self::CONTENT.0
            | Self::MOVED_FROM.0
            | Self::MOVED_TO.0
            | Self::OPEN.0
            | Self::REPLACED.0
            | Self::TYPE.0,
    );

    pub const fn empty() -> Self {
        ChangeFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        ChangeFlags(bits)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ChangeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: ChangeFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ChangeFlags {
    type Output = ChangeFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ChangeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ChangeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeFlags({:#x})", self.0)
    }
}

/// One node of a change-event tree.
///
/// Paths are absolute filesystem paths. A container's `children` describe
/// changes beneath it; leaves have no children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub resource: ResourceKind,
    pub kind: ChangeKind,
    pub flags: ChangeFlags,
    /// Linked or virtual resources live outside the physical work tree.
    pub linked: bool,
    pub children: Vec<ChangeEvent>,
}

impl ChangeEvent {
    /// A container node that only groups changed children.
    pub fn container(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ResourceKind::Container, ChangeKind::Changed)
    }

    /// A container node created by this change.
    pub fn added_container(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ResourceKind::Container, ChangeKind::Added)
    }

    /// A container node deleted by this change.
    pub fn removed_container(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ResourceKind::Container, ChangeKind::Removed)
    }

    /// A leaf node with the given change kind.
    pub fn leaf(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self::new(path, ResourceKind::Leaf, kind)
    }

    /// A leaf whose content changed in place.
    pub fn content_changed(path: impl Into<PathBuf>) -> Self {
        Self::leaf(path, ChangeKind::Changed).with_flags(ChangeFlags::CONTENT)
    }

    pub fn new(path: impl Into<PathBuf>, resource: ResourceKind, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            resource,
            kind,
            flags: ChangeFlags::empty(),
            linked: false,
            children: Vec::new(),
        }
    }

    pub fn with_flags(mut self, flags: ChangeFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn linked(mut self) -> Self {
        self.linked = true;
        self
    }

    pub fn with_child(mut self, child: ChangeEvent) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = ChangeEvent>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn is_container(&self) -> bool {
        self.resource == ResourceKind::Container
    }

    /// Returns `true` if this node's own change can affect version-control
    /// status: anything other than an in-place change, or an in-place change
    /// carrying an interesting flag.
    pub fn is_interesting(&self) -> bool {
        self.kind != ChangeKind::Changed || self.flags.intersects(ChangeFlags::INTERESTING)
    }

    /// Returns `true` if this node may be a folder that disappeared: a
    /// removed or moved-away container, or a leaf whose type can no longer
    /// be determined because it is gone.
    pub fn may_be_vanished_folder(&self) -> bool {
        matches!(self.kind, ChangeKind::Removed | ChangeKind::Moved)
    }

    /// Number of nodes in this tree, including the root.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(ChangeEvent::node_count).sum::<usize>()
    }
}
