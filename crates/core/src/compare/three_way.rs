//! Three-way comparison of a working copy against a repository revision.
//!
//! The left side is the working copy, the ancestor its base revision and
//! the right side the selected repository revision. Remote records are
//! processed parent-first, then every local change without a remote
//! counterpart, and finally the compare root is located or synthesised.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use super::element::ResourceElement;
use super::kind::{combine, diff_kind, DiffKind};
use super::record::{reorder, resolve_node_kind, resource_kind, DiffStatusRecord, EntryStatus, NodeKind};
use super::tree::{CompareNode, CompareTree, NodeId};
use super::{BuildOutcome, CompareRoots};
use crate::errors::{CompareError, PathError};
use crate::filter::builtin::{ADDED, DELETED, IGNORED, INTERNAL_INVALID, NOT_EXISTS, ON_REPOSITORY};
use crate::filter::{resources_recursive, PresenceDepth, StateFilter};
use crate::monitor::ProgressMonitor;
use crate::path::{join_url, local_path, normalize_url, parent_url, relative_suffix, url_for_path, url_key};
use crate::resource::{LocalResource, RepositoryResource, ResourceKind, Revision};
use crate::working_copy::WorkingCopy;

/// Inputs of a working-copy comparison.
#[derive(Debug, Clone)]
pub struct ThreeWayCompare {
    roots: CompareRoots,
    local_changes: Vec<DiffStatusRecord>,
    remote_changes: Vec<DiffStatusRecord>,
}

impl ThreeWayCompare {
    /// `local_changes` carry working-copy paths; `remote_changes` carry
    /// decoded ancestor URLs in `path_prev` and decoded remote URLs in
    /// `path_next`.
    pub fn new(
        roots: CompareRoots,
        local_changes: Vec<DiffStatusRecord>,
        remote_changes: Vec<DiffStatusRecord>,
    ) -> Self {
        Self {
            roots,
            local_changes,
            remote_changes,
        }
    }

    pub fn roots(&self) -> &CompareRoots {
        &self.roots
    }

    /// Fold both record sets into a tree.
    ///
    /// Records that cannot be resolved are collected as node errors. Only
    /// a missing root URL fails the whole build.
    #[instrument(skip_all, fields(root = %self.roots.left.url(), local = self.local_changes.len(), remote = self.remote_changes.len()))]
    pub fn build<W>(self, wc: &W, monitor: &dyn ProgressMonitor) -> Result<BuildOutcome, CompareError>
    where
        W: WorkingCopy + ?Sized,
    {
        let Self {
            roots,
            local_changes,
            mut remote_changes,
        } = self;
        if roots.left.url().is_empty() {
            return Err(CompareError::RootNotFound(wc.root_path().display().to_string()));
        }

        let mut builder = Builder {
            wc,
            roots: &roots,
            root_local: wc.root_resource(),
            tree: CompareTree::new(),
        };

        let mut local_by_path = HashMap::new();
        let mut local_only = BTreeSet::new();
        for record in local_changes {
            let path = PathBuf::from(&record.path_prev);
            local_only.insert(path.clone());
            local_by_path.insert(path, record);
        }
        reorder(&mut remote_changes, true);

        let total = (remote_changes.len() + local_only.len()) as u64;
        let mut done = 0;
        let mut cancelled = false;

        for record in &remote_changes {
            if monitor.is_cancelled() {
                cancelled = true;
                break;
            }
            done += 1;
            let path = match builder.local_path_of(record) {
                Ok(path) => path,
                Err(err) => {
                    warn!(path = %record.path_prev, error = %err, "remote record outside the compare root");
                    builder.tree.push_error(record.path_prev.clone(), err.to_string());
                    continue;
                }
            };
            local_only.remove(&path);
            monitor.sub_task(&path.display().to_string());
            builder.branch(&path, local_by_path.get(&path), Some(record), monitor);
            monitor.report_progress(done, total);
        }

        if !cancelled {
            for path in &local_only {
                if monitor.is_cancelled() {
                    cancelled = true;
                    break;
                }
                done += 1;
                builder.branch(path, local_by_path.get(path), None, monitor);
                monitor.report_progress(done, total);
            }
        }

        builder.find_root_node();
        let cancelled = cancelled || monitor.is_cancelled();
        let tree = builder.tree;
        info!(
            nodes = tree.len(),
            errors = tree.errors().len(),
            cancelled,
            "three-way tree built"
        );
        Ok(BuildOutcome { tree, cancelled })
    }
}

struct Builder<'a, W: WorkingCopy + ?Sized> {
    wc: &'a W,
    roots: &'a CompareRoots,
    root_local: LocalResource,
    tree: CompareTree,
}

impl<W: WorkingCopy + ?Sized> Builder<'_, W> {
    fn local_path_of(&self, record: &DiffStatusRecord) -> Result<PathBuf, CompareError> {
        let url = normalize_url(&record.path_prev);
        let ancestor = self.roots.ancestor.url();
        local_path(&url, ancestor, self.wc.root_path()).ok_or_else(|| {
            PathError::OutsideRoot {
                url: url.clone(),
                root: ancestor.to_string(),
            }
            .into()
        })
    }

    fn url_of(&self, local: &LocalResource) -> Option<String> {
        url_for_path(&local.path, self.wc.root_path(), self.roots.left.url()).or_else(|| local.url.clone())
    }

    fn branch(
        &mut self,
        path: &Path,
        st_local: Option<&DiffStatusRecord>,
        st_remote: Option<&DiffStatusRecord>,
        monitor: &dyn ProgressMonitor,
    ) {
        if let Err(err) = self.make_branch(path, st_local, st_remote, monitor) {
            warn!(path = %path.display(), error = %err, "could not build compare node");
            self.tree.push_error(path.display().to_string(), err.to_string());
        }
    }

    fn make_branch(
        &mut self,
        path: &Path,
        st_local: Option<&DiffStatusRecord>,
        st_remote: Option<&DiffStatusRecord>,
        monitor: &dyn ProgressMonitor,
    ) -> Result<(), CompareError> {
        let wc = self.wc;
        let on_disk = |p: &str| wc.kind_on_disk(Path::new(p));
        let local_kind = match st_local {
            Some(record) => resolve_node_kind(record, true, on_disk)?,
            None => NodeKind::None,
        };
        let node_kind = match st_remote {
            Some(record) if local_kind == NodeKind::None => resolve_node_kind(record, false, on_disk)?,
            _ => local_kind,
        };
        let kind = match resource_kind(node_kind) {
            Some(ResourceKind::File) => ResourceKind::File,
            _ => ResourceKind::Folder,
        };
        let local = wc.local_resource_of_kind(path, kind);

        if st_remote.is_none() && IGNORED.accept(&local) {
            debug!(path = %path.display(), "ignored item without incoming change");
            return Ok(());
        }
        if local.is_copied() && ADDED.accept(&local) && local.path != self.root_local.path {
            self.make_copied_subtree(&local, monitor);
            return Ok(());
        }
        self.make_node(&local, st_local, st_remote)?;
        Ok(())
    }

    /// A copy is shown as a fresh addition of its whole subtree.
    fn make_copied_subtree(&mut self, top: &LocalResource, monitor: &dyn ProgressMonitor) {
        let mut walker = StateFilter::new(
            "copied subtree",
            |_: &LocalResource| true,
            |r: &LocalResource| !IGNORED.accept(r) && !DELETED.accept(r),
        );
        let items = resources_recursive(
            self.wc,
            std::slice::from_ref(&top.path),
            &mut walker,
            PresenceDepth::Infinity,
            monitor,
        );
        debug!(root = %top.path.display(), items = items.len(), "synthesising copied subtree");

        for item in items {
            if DELETED.accept(&item) {
                if let Some(url) = self.url_of(&item) {
                    self.tree.unindex(&url);
                }
                continue;
            }
            let kind = match item.kind {
                ResourceKind::File => NodeKind::File,
                ResourceKind::Folder => NodeKind::Dir,
            };
            let path = item.path.display().to_string();
            let record = DiffStatusRecord::new(path.clone(), path.clone(), kind, EntryStatus::Added, EntryStatus::None);
            if let Err(err) = self.make_node(&item, Some(&record), None) {
                self.tree.push_error(path, err.to_string());
            }
        }
    }

    fn uses_originator(&self, local: &LocalResource, st_local: Option<&DiffStatusRecord>) -> bool {
        self.root_local.is_copied()
            && (st_local.is_some_and(|r| r.text_status != EntryStatus::Added) || local.path == self.root_local.path)
    }

    fn make_node(
        &mut self,
        local: &LocalResource,
        st_local: Option<&DiffStatusRecord>,
        st_remote: Option<&DiffStatusRecord>,
    ) -> Result<Option<NodeId>, CompareError> {
        let wc = self.wc;
        let remote_kind = match st_remote {
            Some(record) => {
                let kind = resolve_node_kind(record, false, |p| wc.kind_on_disk(Path::new(p)))?;
                resource_kind(kind).unwrap_or(local.kind)
            }
            None => local.kind,
        };
        let use_originator = self.uses_originator(local, st_local);
        let (mut left, ancestor, mut right) = self.repository_entries(local, remote_kind, use_originator, st_remote)?;

        let right_exists = match st_remote {
            Some(record) => record.effective_status() != EntryStatus::Deleted,
            None => ON_REPOSITORY.accept(local),
        };
        if right.selected() != Revision::Base && NOT_EXISTS.accept(local) && !right_exists {
            return Ok(None);
        }

        let mut status_left = st_local.map_or(EntryStatus::Normal, DiffStatusRecord::effective_status);
        if status_left == EntryStatus::Deleted && local.is_file() && wc.exists_on_disk(&local.path) {
            status_left = EntryStatus::Replaced;
        }
        let fictive_right = if use_originator
            || !matches!(
                status_left,
                EntryStatus::Added | EntryStatus::Ignored | EntryStatus::None | EntryStatus::Unversioned
            ) {
            EntryStatus::Normal
        } else {
            EntryStatus::None
        };
        let mut st_remote = st_remote;
        let mut status_right = st_remote.map_or(fictive_right, DiffStatusRecord::effective_status);

        // Items already up to date are skipped, but only when both sides
        // track the same URL.
        if st_remote.is_some() && url_key(self.roots.right.url()) == url_key(self.roots.ancestor.url()) {
            let same_revision = local.revision.is_some() && local.revision == right.last_changed();
            match self.roots.right.selected() {
                Revision::Number(n) if self.root_local.base_revision.is_some_and(|base| base >= n) => {
                    let gone = !wc.exists_on_disk(&local.path) && status_right == EntryStatus::Deleted;
                    if gone || (status_right != EntryStatus::Deleted && same_revision) {
                        return Ok(None);
                    }
                }
                _ if same_revision => {
                    if st_local.is_none() {
                        return Ok(None);
                    }
                    st_remote = None;
                    status_right = fictive_right;
                }
                _ => {}
            }
        }

        let kind_left = diff_kind(status_left, st_local.map_or(EntryStatus::None, |r| r.prop_status))
            .towards(DiffKind::LEFT);
        let kind_right = diff_kind(status_right, st_remote.map_or(EntryStatus::None, |r| r.prop_status))
            .towards(DiffKind::RIGHT);
        if kind_left.change_type() == DiffKind::DELETION {
            left.set_selected(Revision::Invalid);
        }
        if kind_right.change_type() == DiffKind::DELETION {
            right.set_selected(Revision::Invalid);
        }

        let parent = self.parent_node(left.url());
        let node = self.compose(
            local,
            (left, ancestor, right),
            combine(kind_left, kind_right),
            status_left,
            status_right,
        );
        Ok(Some(self.tree.insert(node, parent)))
    }

    fn repository_entries(
        &self,
        local: &LocalResource,
        remote_kind: ResourceKind,
        use_originator: bool,
        st_remote: Option<&DiffStatusRecord>,
    ) -> Result<(RepositoryResource, RepositoryResource, RepositoryResource), CompareError> {
        let left_url = self.url_of(local).ok_or_else(|| PathError::OutsideRoot {
            url: local.path.display().to_string(),
            root: self.wc.root_path().display().to_string(),
        })?;
        let left = RepositoryResource::new(local.kind, left_url.as_str(), Revision::Working);

        let originator = local.copied_from.as_ref().filter(|_| use_originator).map(|source| {
            let mut origin = RepositoryResource::new(local.kind, source.url.as_str(), Revision::Number(source.revision));
            origin.set_peg(Some(Revision::Number(source.revision)));
            origin
        });
        let (mut ancestor, mut right) = match originator {
            Some(origin) => (origin.clone(), origin),
            None => (left.clone(), left.clone()),
        };

        if let Some(record) = st_remote {
            ancestor = RepositoryResource::new(remote_kind, normalize_url(&record.path_prev), Revision::Base);
            right = RepositoryResource::new(remote_kind, normalize_url(&record.path_next), Revision::Base);
            right.entry_mut().last_changed = record.revision;
        } else if url_key(self.roots.left.url()) != url_key(self.roots.right.url()) {
            if let Some(delta) = relative_suffix(&left_url, self.roots.left.url()) {
                ancestor = RepositoryResource::new(remote_kind, join_url(self.roots.ancestor.url(), delta), Revision::Base);
                right = RepositoryResource::new(remote_kind, join_url(self.roots.right.url(), delta), Revision::Base);
            }
        }

        ancestor.set_selected(Revision::Base);
        ancestor.set_peg(None);
        right.set_peg(self.roots.right.peg());
        right.set_selected(self.roots.right.selected());
        Ok((left, ancestor, right))
    }

    /// Wrap the resources into elements and hide the sides that have no
    /// content to show.
    fn compose(
        &self,
        local: &LocalResource,
        (mut left, mut ancestor, mut right): (RepositoryResource, RepositoryResource, RepositoryResource),
        kind: DiffKind,
        local_change: EntryStatus,
        remote_change: EntryStatus,
    ) -> CompareNode {
        let originator = self.root_local.is_copied()
            && (local_change != EntryStatus::Added || local.path == self.root_local.path);
        if matches!(local_change, EntryStatus::None | EntryStatus::Deleted) {
            left.set_selected(Revision::Invalid);
        }
        let ancestor_shown = originator
            || (!matches!(local_change, EntryStatus::Unversioned | EntryStatus::Added)
                && remote_change != EntryStatus::Added);
        if !ancestor_shown {
            ancestor.set_selected(Revision::Invalid);
        }
        if matches!(remote_change, EntryStatus::Deleted | EntryStatus::None) {
            right.set_selected(Revision::Invalid);
        }

        CompareNode::new(
            ResourceElement::new(left, Some(local.clone()), local.is_file()),
            ResourceElement::new(ancestor, Some(local.clone()), false),
            ResourceElement::new(right, None, false),
            kind,
            local_change,
            remote_change,
        )
    }

    /// Folder node connecting a change to the root.
    fn make_stub_node(&self, url: &str) -> CompareNode {
        let folder = RepositoryResource::new(ResourceKind::Folder, url, Revision::Working);
        let local = match local_path(url, self.roots.left.url(), self.wc.root_path()) {
            Some(path) => self.wc.local_resource_of_kind(&path, ResourceKind::Folder),
            None => LocalResource::invalid(url, ResourceKind::Folder),
        };
        let entries = if INTERNAL_INVALID.accept(&local) {
            None
        } else {
            let use_originator = self.uses_originator(&local, None);
            self.repository_entries(&local, ResourceKind::Folder, use_originator, None).ok()
        };
        let entries = entries.unwrap_or_else(|| (folder.clone(), folder.clone(), folder.clone()));
        self.compose(
            &local,
            (folder, entries.1, entries.2),
            DiffKind::NO_CHANGE,
            EntryStatus::Normal,
            EntryStatus::Normal,
        )
        .keyed(url)
    }

    /// Node of the folder containing `url`, creating stubs up to the root.
    fn parent_node(&mut self, url: &str) -> Option<NodeId> {
        let root_key = url_key(self.roots.left.url());
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

    fn find_root_node(&mut self) -> NodeId {
        let root_url = self.roots.left.url().to_string();
        let id = match self.tree.find(&root_url) {
            Some(id) => id,
            None => {
                debug!(root = %root_url, "synthesising compare root");
                let stub = self.make_stub_node(&root_url);
                self.tree.insert_stub(stub, None)
            }
        };
        self.tree.set_root(id);
        id
    }
}
