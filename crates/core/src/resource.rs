//! Resource descriptors shared by the filter engine and the compare engine.
//!
//! A [`LocalResource`] is the resolved view of one working-copy item: its
//! lifecycle [`ResourceState`], orthogonal [`ChangeMask`] flags, revisions
//! and copy/tree-conflict details. A [`RepositoryResource`] addresses one
//! repository item at a selected revision.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::svn::EntryStatus;

// ---------------------------------------------------------------------------
// Resource state
// ---------------------------------------------------------------------------

/// Lifecycle tag of a working-copy item. Exactly one applies at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Normal,
    Added,
    Deleted,
    Modified,
    Missing,
    Replaced,
    Merged,
    Conflicting,
    Obstructed,
    Ignored,
    Incomplete,
    External,
    /// Present below an unversioned folder.
    Unversioned,
    /// Present locally, not yet under version control, parent versioned.
    New,
    /// Unversioned item standing where a deleted versioned item was.
    Prereplaced,
    /// Linked resource living outside the working copy.
    Linked,
    /// No local item and no version-control entry.
    NotExists,
    /// Descriptor could not be resolved; every filter rejects it.
    InternalInvalid,
}

impl ResourceState {
    pub const ALL: [ResourceState; 18] = [
        ResourceState::Normal,
        ResourceState::Added,
        ResourceState::Deleted,
        ResourceState::Modified,
        ResourceState::Missing,
        ResourceState::Replaced,
        ResourceState::Merged,
        ResourceState::Conflicting,
        ResourceState::Obstructed,
        ResourceState::Ignored,
        ResourceState::Incomplete,
        ResourceState::External,
        ResourceState::Unversioned,
        ResourceState::New,
        ResourceState::Prereplaced,
        ResourceState::Linked,
        ResourceState::NotExists,
        ResourceState::InternalInvalid,
    ];

    /// Fold the informational tags onto the tag filters reason about:
    /// `Merged` behaves as `Modified`, `Incomplete` and `External` as
    /// `Normal`, and `Unversioned` as `New`.
    pub fn canonical(self) -> ResourceState {
        match self {
            ResourceState::Merged => ResourceState::Modified,
            ResourceState::Incomplete | ResourceState::External => ResourceState::Normal,
            ResourceState::Unversioned => ResourceState::New,
            other => other,
        }
    }

    /// Map an SVN text/property status pair onto a state.
    ///
    /// `remote` selects the interpretation used for repository-side status
    /// columns, where an unversioned entry simply does not exist and a
    /// conflict is only a modification.
    pub fn from_status(text: EntryStatus, prop: EntryStatus, remote: bool) -> ResourceState {
        match text {
            EntryStatus::Ignored => ResourceState::Ignored,
            EntryStatus::Unversioned if remote => ResourceState::NotExists,
            EntryStatus::Unversioned => ResourceState::New,
            EntryStatus::Added => ResourceState::Added,
            EntryStatus::Deleted => ResourceState::Deleted,
            EntryStatus::Missing => ResourceState::Missing,
            EntryStatus::Conflicted if remote => ResourceState::Modified,
            EntryStatus::Conflicted => ResourceState::Conflicting,
            EntryStatus::Merged => ResourceState::Merged,
            EntryStatus::Modified => ResourceState::Modified,
            EntryStatus::Obstructed => ResourceState::Obstructed,
            EntryStatus::Replaced => ResourceState::Replaced,
            EntryStatus::Incomplete => ResourceState::Incomplete,
            EntryStatus::External => ResourceState::External,
            EntryStatus::None if !remote && prop == EntryStatus::None => ResourceState::NotExists,
            EntryStatus::None | EntryStatus::Normal => match prop {
                EntryStatus::Conflicted if !remote => ResourceState::Conflicting,
                EntryStatus::Modified | EntryStatus::Conflicted => ResourceState::Modified,
                _ => ResourceState::Normal,
            },
        }
    }

    /// State of a property column (`Normal`, `Modified` or `Conflicting`).
    pub fn from_prop_status(prop: EntryStatus) -> ResourceState {
        match prop {
            EntryStatus::Conflicted => ResourceState::Conflicting,
            EntryStatus::Modified => ResourceState::Modified,
            _ => ResourceState::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceState::Normal => "normal",
            ResourceState::Added => "added",
            ResourceState::Deleted => "deleted",
            ResourceState::Modified => "modified",
            ResourceState::Missing => "missing",
            ResourceState::Replaced => "replaced",
            ResourceState::Merged => "merged",
            ResourceState::Conflicting => "conflicting",
            ResourceState::Obstructed => "obstructed",
            ResourceState::Ignored => "ignored",
            ResourceState::Incomplete => "incomplete",
            ResourceState::External => "external",
            ResourceState::Unversioned => "unversioned",
            ResourceState::New => "new",
            ResourceState::Prereplaced => "prereplaced",
            ResourceState::Linked => "linked",
            ResourceState::NotExists => "not_exists",
            ResourceState::InternalInvalid => "internal_invalid",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown resource state '{}'", s))
    }
}

// ---------------------------------------------------------------------------
// Change mask
// ---------------------------------------------------------------------------

/// Orthogonal flags augmenting a [`ResourceState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeMask(u32);

impl ChangeMask {
    pub const NONE: ChangeMask = ChangeMask(0);
    pub const COPIED: ChangeMask = ChangeMask(0x01);
    pub const SWITCHED: ChangeMask = ChangeMask(0x02);
    pub const LOCKED: ChangeMask = ChangeMask(0x04);
    pub const SVN_EXTERNALS: ChangeMask = ChangeMask(0x08);
    pub const FORBIDDEN: ChangeMask = ChangeMask(0x10);
    pub const UNVERSIONED_EXTERNAL: ChangeMask = ChangeMask(0x20);
    pub const TREE_CONFLICT: ChangeMask = ChangeMask(0x40);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ChangeMask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for ChangeMask {
    type Output = ChangeMask;

    fn bitor(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: ChangeMask) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Kinds, revisions, tree conflicts
// ---------------------------------------------------------------------------

/// Local resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    File,
    Folder,
}

impl ResourceKind {
    pub fn is_container(self) -> bool {
        self == ResourceKind::Folder
    }
}

/// A revision selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Revision {
    /// The working copy including local modifications.
    Working,
    /// The pristine checked-out revision.
    Base,
    /// The youngest repository revision.
    Head,
    Number(i64),
    /// Placeholder for "no content on this side".
    Invalid,
}

impl Revision {
    pub fn number(self) -> Option<i64> {
        match self {
            Revision::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Working => f.write_str("WORKING"),
            Revision::Base => f.write_str("BASE"),
            Revision::Head => f.write_str("HEAD"),
            Revision::Number(n) => write!(f, "{}", n),
            Revision::Invalid => f.write_str("INVALID"),
        }
    }
}

impl FromStr for Revision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WORKING" => Ok(Revision::Working),
            "BASE" => Ok(Revision::Base),
            "HEAD" => Ok(Revision::Head),
            other => other
                .trim_start_matches('R')
                .parse::<i64>()
                .map(Revision::Number)
                .map_err(|_| format!("invalid revision '{}'", s)),
        }
    }
}

/// Operation that produced a tree conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictOperation {
    Update,
    Switch,
    Merge,
    None,
}

/// Incoming action of a tree conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    Modify,
    Add,
    Delete,
    Replace,
}

/// Local reason of a tree conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    Modified,
    Obstructed,
    Deleted,
    Missing,
    Unversioned,
    Added,
    Replaced,
    MovedAway,
    MovedHere,
}

/// Description of a structural conflict on a working-copy item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConflict {
    pub operation: ConflictOperation,
    pub action: ConflictAction,
    pub reason: ConflictReason,
}

impl TreeConflict {
    /// Whether the conflicted item still exists in the repository.
    ///
    /// Updates and switches keep the item unless it was deleted there or
    /// both sides added it. Merges can only be judged by a local
    /// modification of an item that was not deleted.
    pub fn repository_exists(&self) -> bool {
        match self.operation {
            ConflictOperation::Update | ConflictOperation::Switch => {
                self.action != ConflictAction::Delete
                    && !(self.action == ConflictAction::Add && self.reason == ConflictReason::Added)
            }
            ConflictOperation::Merge => {
                self.action != ConflictAction::Delete && self.reason == ConflictReason::Modified
            }
            ConflictOperation::None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Local resource
// ---------------------------------------------------------------------------

/// Repository location an added item was copied from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySource {
    pub url: String,
    pub revision: i64,
}

/// Resolved descriptor of one working-copy item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalResource {
    pub path: PathBuf,
    /// Decoded repository URL, when the item is versioned.
    pub url: Option<String>,
    pub kind: ResourceKind,
    pub state: ResourceState,
    /// State of the text column alone.
    pub text_state: ResourceState,
    /// State of the property column alone.
    pub prop_state: ResourceState,
    pub mask: ChangeMask,
    /// Last-changed revision.
    pub revision: Option<i64>,
    /// Checked-out (base) revision.
    pub base_revision: Option<i64>,
    pub copied_from: Option<CopySource>,
    pub tree_conflict: Option<TreeConflict>,
}

impl LocalResource {
    /// Descriptor built from a bare state and mask, with no revisions.
    pub fn from_state(
        path: impl Into<PathBuf>,
        kind: ResourceKind,
        state: ResourceState,
        mask: ChangeMask,
    ) -> Self {
        Self {
            path: path.into(),
            url: None,
            kind,
            state,
            text_state: state,
            prop_state: ResourceState::Normal,
            mask,
            revision: None,
            base_revision: None,
            copied_from: None,
            tree_conflict: None,
        }
    }

    /// Descriptor for an item that is not under version control.
    pub fn unversioned(path: impl Into<PathBuf>, kind: ResourceKind) -> Self {
        Self::from_state(path, kind, ResourceState::NotExists, ChangeMask::NONE)
    }

    /// Descriptor for an item that could not be resolved at all.
    pub fn invalid(path: impl Into<PathBuf>, kind: ResourceKind) -> Self {
        Self::from_state(path, kind, ResourceState::InternalInvalid, ChangeMask::NONE)
    }

    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    pub fn is_copied(&self) -> bool {
        self.mask.contains(ChangeMask::COPIED)
    }

    pub fn is_switched(&self) -> bool {
        self.mask.contains(ChangeMask::SWITCHED)
    }

    pub fn is_locked(&self) -> bool {
        self.mask.contains(ChangeMask::LOCKED)
    }

    pub fn has_tree_conflict(&self) -> bool {
        self.tree_conflict.is_some() || self.mask.contains(ChangeMask::TREE_CONFLICT)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self.base_revision.get_or_insert(revision);
        self
    }

    pub fn with_prop_state(mut self, prop_state: ResourceState) -> Self {
        self.prop_state = prop_state;
        self
    }

    pub fn with_copied_from(mut self, url: impl Into<String>, revision: i64) -> Self {
        self.copied_from = Some(CopySource {
            url: url.into(),
            revision,
        });
        self.mask |= ChangeMask::COPIED;
        self
    }

    pub fn with_tree_conflict(mut self, conflict: TreeConflict) -> Self {
        self.tree_conflict = Some(conflict);
        self.mask |= ChangeMask::TREE_CONFLICT;
        self
    }

    /// Whether `path` designates this resource.
    pub fn is_at(&self, path: &Path) -> bool {
        self.path == path
    }
}

// ---------------------------------------------------------------------------
// Repository resource
// ---------------------------------------------------------------------------

/// Addressing data of one repository item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Decoded URL.
    pub url: String,
    pub selected: Revision,
    pub peg: Option<Revision>,
    /// Last-changed revision at `selected`, when known.
    pub last_changed: Option<i64>,
}

/// A repository file or folder at a selected revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RepositoryResource {
    File(RepositoryEntry),
    Folder(RepositoryEntry),
}

impl RepositoryResource {
    pub fn new(kind: ResourceKind, url: impl Into<String>, selected: Revision) -> Self {
        let entry = RepositoryEntry {
            url: url.into(),
            selected,
            peg: None,
            last_changed: None,
        };
        match kind {
            ResourceKind::File => RepositoryResource::File(entry),
            ResourceKind::Folder => RepositoryResource::Folder(entry),
        }
    }

    pub fn entry(&self) -> &RepositoryEntry {
        match self {
            RepositoryResource::File(e) | RepositoryResource::Folder(e) => e,
        }
    }

    pub fn entry_mut(&mut self) -> &mut RepositoryEntry {
        match self {
            RepositoryResource::File(e) | RepositoryResource::Folder(e) => e,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            RepositoryResource::File(_) => ResourceKind::File,
            RepositoryResource::Folder(_) => ResourceKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, RepositoryResource::File(_))
    }

    pub fn url(&self) -> &str {
        &self.entry().url
    }

    pub fn name(&self) -> &str {
        crate::path::url_name(self.url())
    }

    pub fn selected(&self) -> Revision {
        self.entry().selected
    }

    pub fn set_selected(&mut self, revision: Revision) {
        self.entry_mut().selected = revision;
    }

    pub fn peg(&self) -> Option<Revision> {
        self.entry().peg
    }

    pub fn set_peg(&mut self, peg: Option<Revision>) {
        self.entry_mut().peg = peg;
    }

    pub fn last_changed(&self) -> Option<i64> {
        self.entry().last_changed
    }

    /// Same entry with a different kind.
    pub fn with_kind(self, kind: ResourceKind) -> Self {
        let entry = match self {
            RepositoryResource::File(e) | RepositoryResource::Folder(e) => e,
        };
        match kind {
            ResourceKind::File => RepositoryResource::File(entry),
            ResourceKind::Folder => RepositoryResource::Folder(entry),
        }
    }
}
