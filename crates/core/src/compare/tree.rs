//! Arena-backed compare tree.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]. A node is
//! never mutated through a shared reference: [`CompareTree::replace_node`]
//! swaps in a new value and [`CompareTree::update_element`] edits one side,
//! and both announce the change on a broadcast channel so viewers can
//! re-render without holding callbacks into the tree.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use super::element::{ContentState, ResourceElement};
use super::kind::DiffKind;
use crate::errors::CompareError;
use crate::path::url_key;
use crate::resource::ResourceKind;
use crate::svn::EntryStatus;

const EVENT_CAPACITY: usize = 64;

/// Index of a node inside its [`CompareTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which element of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Ancestor,
    Right,
}

/// Direction of a content copy between the two outer sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    RightToLeft,
    LeftToRight,
}

/// Change notification emitted by the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    NodeReplaced(NodeId),
    ElementChanged(NodeId, Side),
    Saved(NodeId),
}

/// A record that could not be turned into a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeError {
    pub path: String,
    pub message: String,
}

/// One entry of the merged tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompareNode {
    /// Normalised URL this node is indexed under.
    pub key: String,
    pub name: String,
    pub kind: DiffKind,
    pub left: ResourceElement,
    pub ancestor: ResourceElement,
    pub right: ResourceElement,
    pub local_change: EntryStatus,
    pub remote_change: EntryStatus,
    /// Set when fetching content for this node failed.
    pub error: Option<String>,
}

impl CompareNode {
    pub fn new(
        left: ResourceElement,
        ancestor: ResourceElement,
        right: ResourceElement,
        kind: DiffKind,
        local_change: EntryStatus,
        remote_change: EntryStatus,
    ) -> Self {
        Self {
            key: url_key(left.url()),
            name: left.resource.name().to_string(),
            kind,
            left,
            ancestor,
            right,
            local_change,
            remote_change,
            error: None,
        }
    }

    /// Index key override, used when a node is looked up by a URL other
    /// than its left one.
    pub fn keyed(mut self, url: &str) -> Self {
        self.key = url_key(url);
        self
    }

    pub fn element(&self, side: Side) -> &ResourceElement {
        match side {
            Side::Left => &self.left,
            Side::Ancestor => &self.ancestor,
            Side::Right => &self.right,
        }
    }

    pub fn element_mut(&mut self, side: Side) -> &mut ResourceElement {
        match side {
            Side::Left => &mut self.left,
            Side::Ancestor => &mut self.ancestor,
            Side::Right => &mut self.right,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.left.kind() == ResourceKind::Folder
    }

    /// Deleted and re-created on either side.
    pub fn is_replaced(&self) -> bool {
        self.local_change == EntryStatus::Replaced || self.remote_change == EntryStatus::Replaced
    }
}

#[derive(Debug)]
struct Slot {
    node: CompareNode,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    stub: bool,
}

/// The merged tree of one comparison.
#[derive(Debug)]
pub struct CompareTree {
    slots: Vec<Slot>,
    index: HashMap<String, NodeId>,
    root: Option<NodeId>,
    errors: Vec<NodeError>,
    events: broadcast::Sender<TreeEvent>,
}

impl Default for CompareTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CompareTree {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            root: None,
            errors: Vec::new(),
            events,
        }
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Add `node` below `parent` and index it under its key.
    ///
    /// A stub already indexed under the same key is upgraded in place and
    /// keeps its children. Any other node with that key stays in the tree
    /// (a file deleted and re-created as a folder shows up twice) and only
    /// loses the index entry.
    pub fn insert(&mut self, node: CompareNode, parent: Option<NodeId>) -> NodeId {
        if let Some(&existing) = self.index.get(&node.key) {
            let slot = &mut self.slots[existing.0];
            if slot.stub {
                debug!(key = %node.key, "upgrading stub node");
                slot.node = node;
                slot.stub = false;
                return existing;
            }
        }
        self.push(node, parent, false)
    }

    /// Add a connecting folder with no change of its own.
    pub fn insert_stub(&mut self, node: CompareNode, parent: Option<NodeId>) -> NodeId {
        self.push(node, parent, true)
    }

    fn push(&mut self, node: CompareNode, parent: Option<NodeId>, stub: bool) -> NodeId {
        let id = NodeId(self.slots.len());
        self.index.insert(node.key.clone(), id);
        self.slots.push(Slot {
            node,
            parent,
            children: Vec::new(),
            stub,
        });
        if let Some(parent) = parent {
            self.slots[parent.0].children.push(id);
        }
        id
    }

    pub fn is_stub(&self, id: NodeId) -> bool {
        self.slots.get(id.0).is_some_and(|s| s.stub)
    }

    /// Forget the index entry for `url`; the node itself stays attached.
    pub fn unindex(&mut self, url: &str) {
        self.index.remove(&url_key(url));
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn push_error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(NodeError {
            path: path.into(),
            message: message.into(),
        });
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Node indexed under `url`, after normalisation.
    pub fn find(&self, url: &str) -> Option<NodeId> {
        self.index.get(&url_key(url)).copied()
    }

    pub fn get(&self, id: NodeId) -> Option<&CompareNode> {
        self.slots.get(id.0).map(|s| &s.node)
    }

    /// Node behind an id minted by this tree.
    pub fn node(&self, id: NodeId) -> &CompareNode {
        &self.slots[id.0].node
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slots.get(id.0).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    pub fn errors(&self) -> &[NodeError] {
        &self.errors
    }

    /// Depth of a node below the root (the root is 0).
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent(id);
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// Every node reachable from the root in pre-order, folders before
    /// files and siblings by name.
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.slots.len());
        let Some(root) = self.root else {
            return order;
        };
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            let mut children = self.children(id).to_vec();
            children.sort_by(|a, b| {
                let (a, b) = (self.node(*a), self.node(*b));
                b.is_folder().cmp(&a.is_folder()).then_with(|| a.name.cmp(&b.name))
            });
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Nodes whose editable left buffer holds unsaved edits.
    pub fn dirty_nodes(&self) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| self.node(*id).left.dirty)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Receive change events for this tree. The channel closes when the
    /// tree is dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.events.subscribe()
    }

    pub fn replace_node(&mut self, id: NodeId, node: CompareNode) -> Result<(), CompareError> {
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or_else(|| CompareError::NodeNotFound(format!("#{}", id.0)))?;
        if slot.node.key != node.key {
            self.index.remove(&slot.node.key);
            self.index.insert(node.key.clone(), id);
        }
        slot.node = node;
        let _ = self.events.send(TreeEvent::NodeReplaced(id));
        Ok(())
    }

    pub fn update_element<F>(&mut self, id: NodeId, side: Side, update: F) -> Result<(), CompareError>
    where
        F: FnOnce(&mut ResourceElement),
    {
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or_else(|| CompareError::NodeNotFound(format!("#{}", id.0)))?;
        update(slot.node.element_mut(side));
        let _ = self.events.send(TreeEvent::ElementChanged(id, side));
        Ok(())
    }

    pub fn set_error(&mut self, id: NodeId, message: Option<String>) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.node.error = message;
        }
    }

    pub fn mark_saved(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.node.left.dirty = false;
            let _ = self.events.send(TreeEvent::Saved(id));
        }
    }

    /// Copy the content of one outer side onto the other.
    ///
    /// Only the left side is backed by the working copy; the right side is
    /// a committed revision and never accepts content.
    pub fn copy(&mut self, id: NodeId, direction: CopyDirection) -> Result<(), CompareError> {
        let node = self
            .get(id)
            .ok_or_else(|| CompareError::NodeNotFound(format!("#{}", id.0)))?;
        match direction {
            CopyDirection::LeftToRight => Err(CompareError::ReadOnly {
                path: node.key.clone(),
                side: "right".into(),
            }),
            CopyDirection::RightToLeft => {
                if !node.left.is_editable() {
                    return Err(CompareError::ReadOnly {
                        path: node.key.clone(),
                        side: "left".into(),
                    });
                }
                let bytes = match &node.right.content {
                    ContentState::Fetched(bytes) => bytes.clone(),
                    _ => return Err(CompareError::ContentUnavailable(node.right.url().to_string())),
                };
                self.update_element(id, Side::Left, |left| left.edit(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ChangeMask, LocalResource, RepositoryResource, ResourceState, Revision};

    fn element(url: &str, kind: ResourceKind, selected: Revision) -> ResourceElement {
        ResourceElement::new(RepositoryResource::new(kind, url, selected), None, false)
    }

    fn node(url: &str, kind: ResourceKind) -> CompareNode {
        CompareNode::new(
            element(url, kind, Revision::Working),
            element(url, kind, Revision::Base),
            element(url, kind, Revision::Head),
            DiffKind::NO_CHANGE,
            EntryStatus::Normal,
            EntryStatus::Normal,
        )
    }

    fn editable(url: &str) -> CompareNode {
        let mut n = node(url, ResourceKind::File);
        n.left.editable = true;
        n.left.local = Some(LocalResource::from_state(
            "/wc/a.txt",
            ResourceKind::File,
            ResourceState::Modified,
            ChangeMask::NONE,
        ));
        n
    }

    fn sample() -> (CompareTree, NodeId) {
        let mut tree = CompareTree::new();
        let root = tree.insert(node("http://h/r/proj", ResourceKind::Folder), None);
        tree.set_root(root);
        tree.insert(node("http://h/r/proj/b.txt", ResourceKind::File), Some(root));
        let sub = tree.insert(node("http://h/r/proj/sub", ResourceKind::Folder), Some(root));
        tree.insert(node("http://h/r/proj/sub/c.txt", ResourceKind::File), Some(sub));
        tree.insert(node("http://h/r/proj/a.txt", ResourceKind::File), Some(root));
        (tree, root)
    }

    #[test]
    fn test_walk_pre_order_folders_first() {
        let (tree, _) = sample();
        let names: Vec<_> = tree.walk().into_iter().map(|id| tree.node(id).name.clone()).collect();
        assert_eq!(names, vec!["proj", "sub", "c.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_find_normalises_url() {
        let (tree, _) = sample();
        let id = tree.find("http://h/r//proj/sub/").unwrap();
        assert_eq!(tree.node(id).name, "sub");
        assert_eq!(tree.depth(id), 1);
        assert!(tree.find("http://h/r/proj/zzz").is_none());
    }

    #[test]
    fn test_insert_upgrades_stub_keeping_children() {
        let mut tree = CompareTree::new();
        let root = tree.insert(node("http://h/r/proj", ResourceKind::Folder), None);
        let sub = tree.insert_stub(node("http://h/r/proj/sub", ResourceKind::Folder), Some(root));
        tree.insert(node("http://h/r/proj/sub/c.txt", ResourceKind::File), Some(sub));
        assert!(tree.is_stub(sub));

        let mut changed = node("http://h/r/proj/sub", ResourceKind::Folder);
        changed.kind = DiffKind::CHANGE | DiffKind::LEFT;
        let again = tree.insert(changed, Some(root));
        assert_eq!(again, sub);
        assert!(!tree.is_stub(sub));
        assert_eq!(tree.children(sub).len(), 1);
        assert_eq!(tree.children(root).len(), 1);
        assert_eq!(tree.node(sub).kind, DiffKind::CHANGE | DiffKind::LEFT);
    }

    #[test]
    fn test_insert_same_key_twice_keeps_both() {
        let (mut tree, root) = sample();
        let old = tree.find("http://h/r/proj/a.txt").unwrap();
        let again = tree.insert(node("http://h/r/proj/a.txt", ResourceKind::Folder), Some(root));
        assert_ne!(again, old);
        assert_eq!(tree.find("http://h/r/proj/a.txt"), Some(again));
        assert_eq!(tree.children(root).len(), 4);
    }

    #[test]
    fn test_copy_right_to_left() {
        let mut tree = CompareTree::new();
        let id = tree.insert(editable("http://h/r/proj/a.txt"), None);
        assert!(matches!(
            tree.copy(id, CopyDirection::RightToLeft),
            Err(CompareError::ContentUnavailable(_))
        ));

        let mut events = tree.subscribe();
        tree.update_element(id, Side::Right, |r| r.set_content(b"remote".to_vec())).unwrap();
        tree.copy(id, CopyDirection::RightToLeft).unwrap();
        assert_eq!(tree.node(id).left.bytes(), Some(&b"remote"[..]));
        assert_eq!(tree.dirty_nodes(), Vec::<NodeId>::new());

        tree.set_root(id);
        assert_eq!(tree.dirty_nodes(), vec![id]);
        assert_eq!(events.try_recv().unwrap(), TreeEvent::ElementChanged(id, Side::Right));
        assert_eq!(events.try_recv().unwrap(), TreeEvent::ElementChanged(id, Side::Left));
    }

    #[test]
    fn test_copy_left_to_right_is_read_only() {
        let mut tree = CompareTree::new();
        let id = tree.insert(editable("http://h/r/proj/a.txt"), None);
        let err = tree.copy(id, CopyDirection::LeftToRight).unwrap_err();
        assert!(matches!(err, CompareError::ReadOnly { ref side, .. } if side == "right"));

        let plain = tree.insert(node("http://h/r/proj/b.txt", ResourceKind::File), None);
        let err = tree.copy(plain, CopyDirection::RightToLeft).unwrap_err();
        assert!(matches!(err, CompareError::ReadOnly { ref side, .. } if side == "left"));
    }

    #[test]
    fn test_replace_node_reindexes() {
        let (mut tree, _) = sample();
        let id = tree.find("http://h/r/proj/a.txt").unwrap();
        let renamed = node("http://h/r/proj/a2.txt", ResourceKind::File);
        tree.replace_node(id, renamed).unwrap();
        assert!(tree.find("http://h/r/proj/a.txt").is_none());
        assert_eq!(tree.find("http://h/r/proj/a2.txt"), Some(id));
    }

    #[test]
    fn test_mark_saved_clears_dirty() {
        let mut tree = CompareTree::new();
        let id = tree.insert(editable("http://h/r/proj/a.txt"), None);
        tree.set_root(id);
        tree.update_element(id, Side::Left, |l| l.edit(b"x".to_vec())).unwrap();
        let mut events = tree.subscribe();
        tree.mark_saved(id);
        assert!(tree.dirty_nodes().is_empty());
        assert_eq!(events.try_recv().unwrap(), TreeEvent::Saved(id));
    }
}
