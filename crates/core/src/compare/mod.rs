//! Comparison engine.
//!
//! Diff status records reported for the local side (working copy against
//! its base) and the remote side (base against a repository revision) are
//! folded into one [`CompareTree`]. [`three_way`] compares a working copy,
//! [`two_way`] compares two repository trees, and [`session`] wires either
//! of them to a connector.

pub mod element;
pub mod kind;
pub mod record;
pub mod session;
pub mod three_way;
pub mod tree;
pub mod two_way;

use crate::errors::CompareError;
use crate::resource::{RepositoryResource, ResourceKind, Revision};

pub use element::{ContentState, ResourceElement};
pub use kind::{combine, diff_kind, DiffKind};
pub use record::{reorder, resolve_node_kind, DiffStatusRecord, EntryStatus, NodeKind};
pub use session::{CompareSession, PropertyDiff};
pub use three_way::ThreeWayCompare;
pub use tree::{CompareNode, CompareTree, CopyDirection, NodeError, NodeId, Side, TreeEvent};
pub use two_way::TwoWayCompare;

/// The three repository resources a comparison is anchored on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRoots {
    /// Working copy (three-way) or the next revision (two-way).
    pub left: RepositoryResource,
    pub ancestor: RepositoryResource,
    /// Remote revision (three-way) or the previous revision (two-way).
    pub right: RepositoryResource,
}

impl CompareRoots {
    /// Roots for comparing the working copy checked out from `root_url`
    /// with `remote_url` (the same URL when `None`) at `revision`.
    pub fn for_working_copy(
        root_url: Option<&str>,
        remote_url: Option<&str>,
        revision: Revision,
    ) -> Result<Self, CompareError> {
        let root_url = root_url.or(remote_url).ok_or_else(|| {
            CompareError::RootNotFound("working copy root has no repository URL".into())
        })?;
        let remote_url = remote_url.unwrap_or(root_url);
        let mut right = RepositoryResource::new(ResourceKind::Folder, remote_url, revision);
        if remote_url != root_url {
            right.set_peg(Some(revision));
        }
        Ok(Self {
            left: RepositoryResource::new(ResourceKind::Folder, root_url, Revision::Working),
            ancestor: RepositoryResource::new(ResourceKind::Folder, root_url, Revision::Base),
            right,
        })
    }

    /// Roots for comparing `next` against `prev`, both repository folders.
    pub fn for_urls(next: RepositoryResource, prev: RepositoryResource) -> Self {
        Self {
            ancestor: prev.clone(),
            left: next,
            right: prev,
        }
    }
}

/// Result of a tree build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub tree: CompareTree,
    /// The monitor was cancelled; `tree` holds what was built until then.
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_for_working_copy() {
        let roots = CompareRoots::for_working_copy(Some("http://h/r/trunk"), None, Revision::Head).unwrap();
        assert_eq!(roots.left.selected(), Revision::Working);
        assert_eq!(roots.ancestor.selected(), Revision::Base);
        assert_eq!(roots.right.url(), "http://h/r/trunk");
        assert_eq!(roots.right.peg(), None);

        let roots = CompareRoots::for_working_copy(
            Some("http://h/r/trunk"),
            Some("http://h/r/branches/b1"),
            Revision::Number(12),
        )
        .unwrap();
        assert_eq!(roots.right.peg(), Some(Revision::Number(12)));
    }

    #[test]
    fn test_roots_need_a_url() {
        let err = CompareRoots::for_working_copy(None, None, Revision::Head).unwrap_err();
        assert!(matches!(err, CompareError::RootNotFound(_)));
    }
}
