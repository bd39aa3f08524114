//! Two-way comparison of two repository trees.
//!
//! Records describe how the previous tree (right side) turns into the next
//! one (left side). Additions and deletions are inverted so the tree reads
//! like a comparison of the two sides with each other. Nodes are indexed
//! by their previous URL and carry their single change type in
//! `local_change`.

use tracing::{info, instrument, warn};

use super::element::ResourceElement;
use super::kind::{diff_kind, DiffKind};
use super::record::{reorder, resolve_node_kind, resource_kind, DiffStatusRecord, EntryStatus};
use super::tree::{CompareNode, CompareTree, NodeId};
use super::{BuildOutcome, CompareRoots};
use crate::errors::CompareError;
use crate::monitor::ProgressMonitor;
use crate::path::{join_url, normalize_url, parent_url, relative_suffix, url_key};
use crate::resource::{RepositoryResource, ResourceKind, Revision};

/// Inputs of a repository-to-repository comparison.
#[derive(Debug, Clone)]
pub struct TwoWayCompare {
    roots: CompareRoots,
    changes: Vec<DiffStatusRecord>,
}

impl TwoWayCompare {
    pub fn new(roots: CompareRoots, changes: Vec<DiffStatusRecord>) -> Self {
        Self { roots, changes }
    }

    #[instrument(skip_all, fields(next = %self.roots.left.url(), prev = %self.roots.right.url(), changes = self.changes.len()))]
    pub fn build(self, monitor: &dyn ProgressMonitor) -> Result<BuildOutcome, CompareError> {
        let Self { roots, mut changes } = self;
        if roots.right.url().is_empty() {
            return Err(CompareError::RootNotFound("previous tree has no URL".into()));
        }
        reorder(&mut changes, true);

        let mut builder = Builder {
            roots: &roots,
            tree: CompareTree::new(),
        };
        let total = changes.len() as u64;
        let mut cancelled = false;
        for (i, record) in changes.iter().enumerate() {
            if monitor.is_cancelled() {
                cancelled = true;
                break;
            }
            monitor.sub_task(&record.path_prev);
            if let Err(err) = builder.make_node(record) {
                warn!(path = %record.path_prev, error = %err, "could not build compare node");
                builder.tree.push_error(record.path_prev.clone(), err.to_string());
            }
            monitor.report_progress(i as u64 + 1, total);
        }

        builder.find_root_node();
        let tree = builder.tree;
        info!(nodes = tree.len(), errors = tree.errors().len(), cancelled, "two-way tree built");
        Ok(BuildOutcome { tree, cancelled })
    }
}

struct Builder<'a> {
    roots: &'a CompareRoots,
    tree: CompareTree,
}

impl Builder<'_> {
    fn make_node(&mut self, record: &DiffStatusRecord) -> Result<NodeId, CompareError> {
        let url_next = normalize_url(&record.path_next);
        let url_prev = normalize_url(&record.path_prev);
        let node_kind = resolve_node_kind(record, false, |_| None)?;
        let kind = resource_kind(node_kind).unwrap_or(ResourceKind::Folder);

        let next = self.at_left(kind, &url_next);
        let prev = self.at_right(kind, &url_prev);
        let parent = self.parent_node(&url_prev);

        let diff = diff_kind(record.text_status, record.prop_status).invert_two_way();
        let node = compose(next, prev, diff, record.effective_status());
        Ok(self.tree.insert(node, parent))
    }

    fn at_left(&self, kind: ResourceKind, url: &str) -> RepositoryResource {
        let mut resource = RepositoryResource::new(kind, url, self.roots.left.selected());
        resource.set_peg(self.roots.left.peg());
        resource
    }

    fn at_right(&self, kind: ResourceKind, url: &str) -> RepositoryResource {
        let mut resource = RepositoryResource::new(kind, url, self.roots.right.selected());
        resource.set_peg(self.roots.right.peg());
        resource
    }

    fn make_stub_node(&self, prev_url: &str) -> CompareNode {
        let prev = self.at_right(ResourceKind::Folder, prev_url);
        let next = match relative_suffix(prev_url, self.roots.right.url()) {
            Some(delta) if !delta.is_empty() => {
                self.at_left(ResourceKind::Folder, &join_url(self.roots.left.url(), delta))
            }
            _ => prev.clone(),
        };
        compose(next, prev, DiffKind::NO_CHANGE, EntryStatus::Normal)
    }

    fn parent_node(&mut self, url: &str) -> Option<NodeId> {
        let root_key = url_key(self.roots.right.url());
        if url_key(url) == root_key {
            return None;
        }
        let parent = parent_url(url)?;
        relative_suffix(&url_key(&parent), &root_key)?;
        if let Some(id) = self.tree.find(&parent) {
            return Some(id);
        }
        let grand_parent = self.parent_node(&parent);
        let stub = self.make_stub_node(&parent);
        Some(self.tree.insert_stub(stub, grand_parent))
    }

    fn find_root_node(&mut self) {
        let found = self
            .tree
            .find(self.roots.right.url())
            .or_else(|| self.tree.find(self.roots.left.url()));
        let id = match found {
            Some(id) => id,
            None => {
                let stub = self.make_stub_node(self.roots.right.url());
                self.tree.insert_stub(stub, None)
            }
        };
        self.tree.set_root(id);
    }
}

fn compose(
    mut next: RepositoryResource,
    mut prev: RepositoryResource,
    kind: DiffKind,
    change: EntryStatus,
) -> CompareNode {
    if change == EntryStatus::Added {
        prev.set_selected(Revision::Invalid);
    }
    if change == EntryStatus::Deleted {
        next.set_selected(Revision::Invalid);
    }
    let mut ancestor = prev.clone();
    ancestor.set_selected(Revision::Invalid);
    let key = prev.url().to_string();
    CompareNode::new(
        ResourceElement::new(next, None, false),
        ResourceElement::new(ancestor, None, false),
        ResourceElement::new(prev, None, false),
        kind,
        change,
        EntryStatus::None,
    )
    .keyed(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{CancelFlag, NullMonitor};
    use crate::svn::NodeKind;

    const NEXT: &str = "http://h/repo/branches/b1";
    const PREV: &str = "http://h/repo/trunk";

    fn roots() -> CompareRoots {
        CompareRoots::for_urls(
            RepositoryResource::new(ResourceKind::Folder, NEXT, Revision::Head),
            RepositoryResource::new(ResourceKind::Folder, PREV, Revision::Number(10)),
        )
    }

    fn record(rel: &str, kind: NodeKind, text: EntryStatus) -> DiffStatusRecord {
        DiffStatusRecord::new(format!("{}/{}", PREV, rel), format!("{}/{}", NEXT, rel), kind, text, EntryStatus::None)
    }

    #[test]
    fn test_additions_and_deletions_inverted() {
        let outcome = TwoWayCompare::new(
            roots(),
            vec![
                record("new.txt", NodeKind::File, EntryStatus::Added),
                record("old.txt", NodeKind::File, EntryStatus::Deleted),
                record("mod.txt", NodeKind::File, EntryStatus::Modified),
            ],
        )
        .build(&NullMonitor)
        .unwrap();
        let tree = &outcome.tree;

        let added = tree.node(tree.find(&format!("{}/new.txt", PREV)).unwrap());
        assert_eq!(added.kind, DiffKind::DELETION);
        assert!(!added.right.is_shown());
        assert!(added.left.is_shown());

        let deleted = tree.node(tree.find(&format!("{}/old.txt", PREV)).unwrap());
        assert_eq!(deleted.kind, DiffKind::ADDITION);
        assert!(!deleted.left.is_shown());

        let modified = tree.node(tree.find(&format!("{}/mod.txt", PREV)).unwrap());
        assert_eq!(modified.kind, DiffKind::CHANGE);
        assert_eq!(modified.left.url(), format!("{}/mod.txt", NEXT));
        assert_eq!(modified.right.selected(), Revision::Number(10));
        assert_eq!(tree.parent(tree.find(&format!("{}/mod.txt", PREV)).unwrap()), tree.root());
    }

    #[test]
    fn test_stub_maps_next_url() {
        let outcome = TwoWayCompare::new(roots(), vec![record("src/lib.rs", NodeKind::File, EntryStatus::Modified)])
            .build(&NullMonitor)
            .unwrap();
        let tree = &outcome.tree;
        let src = tree.find(&format!("{}/src", PREV)).unwrap();
        assert!(tree.is_stub(src));
        assert_eq!(tree.node(src).left.url(), format!("{}/src", NEXT));
        assert_eq!(tree.parent(src), tree.root());
        assert_eq!(tree.node(tree.root().unwrap()).key, PREV);
    }

    #[test]
    fn test_cancelled_build_still_has_root() {
        let flag = CancelFlag::new();
        flag.cancel();
        let outcome = TwoWayCompare::new(roots(), vec![record("a.txt", NodeKind::File, EntryStatus::Modified)])
            .build(&flag)
            .unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.tree.len(), 1);
        assert!(outcome.tree.root().is_some());
    }

    #[test]
    fn test_escaped_looking_name_is_taken_literally() {
        let outcome = TwoWayCompare::new(roots(), vec![record("x%41.txt", NodeKind::File, EntryStatus::Modified)])
            .build(&NullMonitor)
            .unwrap();
        let tree = &outcome.tree;
        let id = tree.find(&format!("{}/x%41.txt", PREV)).unwrap();
        assert_eq!(tree.node(id).left.url(), format!("{}/x%41.txt", NEXT));
        assert!(tree.find(&format!("{}/xA.txt", PREV)).is_none());
    }

    #[test]
    fn test_unknown_kind_is_node_error() {
        let outcome = TwoWayCompare::new(roots(), vec![record("x", NodeKind::Unknown, EntryStatus::Modified)])
            .build(&NullMonitor)
            .unwrap();
        assert_eq!(outcome.tree.errors().len(), 1);
    }
}
