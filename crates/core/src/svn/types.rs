//! Value types exchanged with an SVN connector.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::resource::Revision;

// ---------------------------------------------------------------------------
// Status kinds
// ---------------------------------------------------------------------------

/// Per-entry status reported by SVN for the text or property column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    None,
    Normal,
    Added,
    Missing,
    Incomplete,
    Deleted,
    Replaced,
    Modified,
    Merged,
    Conflicted,
    Ignored,
    Obstructed,
    External,
    Unversioned,
}

impl EntryStatus {
    /// Parse the `item`/`props` attribute values of `svn --xml` output.
    /// Unknown values map to `None`.
    pub fn from_item(item: &str) -> EntryStatus {
        match item {
            "normal" => EntryStatus::Normal,
            "added" => EntryStatus::Added,
            "missing" => EntryStatus::Missing,
            "incomplete" => EntryStatus::Incomplete,
            "deleted" => EntryStatus::Deleted,
            "replaced" => EntryStatus::Replaced,
            "modified" => EntryStatus::Modified,
            "merged" => EntryStatus::Merged,
            "conflicted" => EntryStatus::Conflicted,
            "ignored" => EntryStatus::Ignored,
            "obstructed" => EntryStatus::Obstructed,
            "external" => EntryStatus::External,
            "unversioned" => EntryStatus::Unversioned,
            _ => EntryStatus::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::None => "none",
            EntryStatus::Normal => "normal",
            EntryStatus::Added => "added",
            EntryStatus::Missing => "missing",
            EntryStatus::Incomplete => "incomplete",
            EntryStatus::Deleted => "deleted",
            EntryStatus::Replaced => "replaced",
            EntryStatus::Modified => "modified",
            EntryStatus::Merged => "merged",
            EntryStatus::Conflicted => "conflicted",
            EntryStatus::Ignored => "ignored",
            EntryStatus::Obstructed => "obstructed",
            EntryStatus::External => "external",
            EntryStatus::Unversioned => "unversioned",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node kind as reported by SVN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    None,
    File,
    Dir,
    Symlink,
    Unknown,
}

impl NodeKind {
    pub fn from_attr(kind: &str) -> NodeKind {
        match kind {
            "file" => NodeKind::File,
            "dir" => NodeKind::Dir,
            "symlink" => NodeKind::Symlink,
            "none" => NodeKind::None,
            _ => NodeKind::Unknown,
        }
    }
}

/// Recursion depth of a connector call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
    Empty,
    Files,
    Immediates,
    Infinity,
}

impl Depth {
    pub fn as_arg(self) -> &'static str {
        match self {
            Depth::Empty => "empty",
            Depth::Files => "files",
            Depth::Immediates => "immediates",
            Depth::Infinity => "infinity",
        }
    }
}

/// Flags modifying connector calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorOptions {
    /// Skip `svn:externals` definitions.
    pub ignore_externals: bool,
    /// Contact the repository to report incoming changes.
    pub server_side: bool,
}

// ---------------------------------------------------------------------------
// References and records
// ---------------------------------------------------------------------------

/// A URL or working-copy path with optional peg and operative revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    pub target: String,
    pub peg: Option<Revision>,
    pub revision: Option<Revision>,
}

impl EntryRef {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            peg: None,
            revision: None,
        }
    }

    pub fn at(target: impl Into<String>, revision: Revision) -> Self {
        Self {
            target: target.into(),
            peg: None,
            revision: Some(revision),
        }
    }

    pub fn with_peg(mut self, peg: Option<Revision>) -> Self {
        self.peg = peg;
        self
    }

    pub fn is_url(&self) -> bool {
        self.target.contains("://") || self.target.starts_with("^/")
    }
}

/// One reported change between two revisions of a tree.
///
/// Repository URLs in `path_prev`/`path_next` are percent-decoded; a
/// connector decodes what the server reports exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStatusRecord {
    /// Path or decoded URL on the previous side.
    pub path_prev: String,
    /// Path or decoded URL on the next side.
    pub path_next: String,
    pub node_kind: NodeKind,
    pub text_status: EntryStatus,
    pub prop_status: EntryStatus,
    pub copy_source_url: Option<String>,
    pub copy_source_revision: Option<i64>,
    /// Last-changed revision of the next side, when the connector knows it.
    pub revision: Option<i64>,
}

impl DiffStatusRecord {
    pub fn new(
        path_prev: impl Into<String>,
        path_next: impl Into<String>,
        node_kind: NodeKind,
        text_status: EntryStatus,
        prop_status: EntryStatus,
    ) -> Self {
        Self {
            path_prev: path_prev.into(),
            path_next: path_next.into(),
            node_kind,
            text_status,
            prop_status,
            copy_source_url: None,
            copy_source_revision: None,
            revision: None,
        }
    }

    /// Text status, or the property status when the text is unchanged.
    pub fn effective_status(&self) -> EntryStatus {
        if self.text_status == EntryStatus::Normal {
            self.prop_status
        } else {
            self.text_status
        }
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }
}

/// One entry of `svn status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub path: PathBuf,
    pub node_kind: NodeKind,
    pub text_status: EntryStatus,
    pub prop_status: EntryStatus,
    /// Working (checked-out) revision.
    pub revision: Option<i64>,
    pub last_changed: Option<i64>,
    pub copied: bool,
    pub switched: bool,
    pub locked: bool,
    pub tree_conflicted: bool,
    pub repos_text_status: EntryStatus,
    pub repos_prop_status: EntryStatus,
}

impl StatusEntry {
    pub fn new(path: impl Into<PathBuf>, text_status: EntryStatus, prop_status: EntryStatus) -> Self {
        Self {
            path: path.into(),
            node_kind: NodeKind::Unknown,
            text_status,
            prop_status,
            revision: None,
            last_changed: None,
            copied: false,
            switched: false,
            locked: false,
            tree_conflicted: false,
            repos_text_status: EntryStatus::None,
            repos_prop_status: EntryStatus::None,
        }
    }
}

/// One entry of `svn info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoEntry {
    pub path: String,
    pub url: String,
    pub root_url: String,
    pub kind: NodeKind,
    pub revision: Option<i64>,
    pub last_changed: Option<i64>,
    pub copy_from_url: Option<String>,
    pub copy_from_rev: Option<i64>,
}

/// A versioned property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub name: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_status_from_item() {
        assert_eq!(EntryStatus::from_item("modified"), EntryStatus::Modified);
        assert_eq!(EntryStatus::from_item("unversioned"), EntryStatus::Unversioned);
        assert_eq!(EntryStatus::from_item("bogus"), EntryStatus::None);
        for status in [EntryStatus::Added, EntryStatus::Conflicted, EntryStatus::External] {
            assert_eq!(EntryStatus::from_item(status.as_str()), status);
        }
    }

    #[test]
    fn test_effective_status_prefers_text() {
        let rec = DiffStatusRecord::new("a", "a", NodeKind::File, EntryStatus::Normal, EntryStatus::Modified);
        assert_eq!(rec.effective_status(), EntryStatus::Modified);
        let rec = DiffStatusRecord::new("a", "a", NodeKind::File, EntryStatus::Deleted, EntryStatus::Modified);
        assert_eq!(rec.effective_status(), EntryStatus::Deleted);
    }

    #[test]
    fn test_entry_ref_kind() {
        assert!(EntryRef::new("https://svn.example.com/repo").is_url());
        assert!(!EntryRef::at("/work/proj", Revision::Base).is_url());
    }
}
