//! Compare sessions.
//!
//! A [`CompareSession`] owns everything one comparison needs: the
//! connector, the working copy, the filter cache for the selection and the
//! tree once it has been built. Statuses are fetched asynchronously, the
//! tree is built on a blocking worker, and contents are fetched per node on
//! demand. Dropping or closing the session drops the tree and with it
//! every [`TreeEvent`](super::TreeEvent) subscriber.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::element::{ContentState, ResourceElement};
use super::record::{DiffStatusRecord, EntryStatus, NodeKind};
use super::tree::{CompareTree, CopyDirection, NodeId, Side, TreeEvent};
use super::{BuildOutcome, CompareRoots, ThreeWayCompare, TwoWayCompare};
use crate::config::{CompareConfig, FilterConfig};
use crate::errors::{CompareError, SvnError};
use crate::filter::builtin::ANY_CHANGE;
use crate::filter::{FilterManager, ResourceStatesChanged};
use crate::monitor::ProgressMonitor;
use crate::path::local_path;
use crate::resource::{ChangeMask, LocalResource, RepositoryResource, ResourceKind, ResourceState, Revision};
use crate::svn::{ConnectorOptions, Depth, EntryRef, StatusEntry, SvnConnector};
use crate::working_copy::WorkingCopy;

/// One property whose value differs between the sides of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDiff {
    pub name: String,
    pub left: Option<String>,
    /// Always `None` in a two-way session.
    pub ancestor: Option<String>,
    pub right: Option<String>,
}

/// Local and remote change records of a working-copy comparison.
#[derive(Debug, Clone, Default)]
pub struct FetchedStatuses {
    pub local: Vec<DiffStatusRecord>,
    pub remote: Vec<DiffStatusRecord>,
}

enum ContentSource {
    Local(PathBuf),
    Repository(EntryRef),
}

pub struct CompareSession {
    id: Uuid,
    connector: Arc<dyn SvnConnector>,
    working_copy: Option<Arc<dyn WorkingCopy>>,
    filters: Option<FilterManager<dyn WorkingCopy>>,
    options: ConnectorOptions,
    fetch_contents: bool,
    three_way: bool,
    tree: Option<CompareTree>,
    cancelled: bool,
}

impl CompareSession {
    /// A session without a working copy, for repository comparisons.
    pub fn new(connector: Arc<dyn SvnConnector>, config: &CompareConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            connector,
            working_copy: None,
            filters: None,
            options: ConnectorOptions {
                ignore_externals: config.ignore_externals,
                server_side: false,
            },
            fetch_contents: config.fetch_contents,
            three_way: false,
            tree: None,
            cancelled: false,
        }
    }

    /// Attach the working copy compared by [`open_three_way`](Self::open_three_way).
    pub fn with_working_copy(mut self, working_copy: Arc<dyn WorkingCopy>, filters: &FilterConfig) -> Self {
        self.filters = Some(FilterManager::new(
            Arc::clone(&working_copy),
            filters.precise_enablements,
        ));
        self.working_copy = Some(working_copy);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn working_copy(&self) -> Option<&Arc<dyn WorkingCopy>> {
        self.working_copy.as_ref()
    }

    /// Filter cache for the compared selection.
    pub fn filters(&self) -> Option<&FilterManager<dyn WorkingCopy>> {
        self.filters.as_ref()
    }

    pub fn is_three_way(&self) -> bool {
        self.three_way
    }

    /// Whether the last build stopped early.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn tree(&self) -> Result<&CompareTree, CompareError> {
        self.tree.as_ref().ok_or(CompareError::NotOpened)
    }

    fn tree_mut(&mut self) -> Result<&mut CompareTree, CompareError> {
        self.tree.as_mut().ok_or(CompareError::NotOpened)
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<TreeEvent>, CompareError> {
        Ok(self.tree()?.subscribe())
    }

    fn require_working_copy(&self) -> Result<Arc<dyn WorkingCopy>, CompareError> {
        self.working_copy
            .clone()
            .ok_or_else(|| CompareError::RootNotFound("session has no working copy".into()))
    }

    /// Whether anything at or below the working-copy root carries a local
    /// change, answered through the filter cache.
    pub fn has_local_changes(&self) -> bool {
        match (&self.working_copy, &self.filters) {
            (Some(wc), Some(filters)) => {
                filters.check_for_resources_presence_recursive(&[wc.root_path().to_path_buf()], &ANY_CHANGE)
            }
            _ => false,
        }
    }

    // -----------------------------------------------------------------------
    // Status collection
    // -----------------------------------------------------------------------

    /// Collect the local and remote change records for `roots`.
    ///
    /// Any connector failure here fails the whole comparison.
    #[instrument(skip_all, fields(session = %self.id, right = %roots.right.url(), revision = %roots.right.selected()))]
    pub async fn fetch_statuses(
        &self,
        roots: &CompareRoots,
        monitor: &dyn ProgressMonitor,
    ) -> Result<FetchedStatuses, CompareError> {
        let wc = self.require_working_copy()?;
        let root = wc.root_path().to_path_buf();
        let root_local = wc.root_resource();
        let unversioned_root = wc.root_url().is_none() || root_local.url.is_none();
        let with_remote = roots.right.selected() != Revision::Base && !unversioned_root;
        let same_head = roots.right.url() == roots.ancestor.url() && roots.right.selected() == Revision::Head;

        monitor.sub_task("collecting local changes");
        let options = ConnectorOptions {
            server_side: with_remote && same_head,
            ..self.options
        };
        let entries = if unversioned_root {
            Vec::new()
        } else {
            self.connector.status(&root, Depth::Infinity, options, monitor).await?
        };

        let mut fetched = FetchedStatuses::default();
        if unversioned_root {
            let path = root.display().to_string();
            fetched.local.push(DiffStatusRecord::new(
                path.clone(),
                path,
                NodeKind::Dir,
                EntryStatus::Unversioned,
                EntryStatus::Normal,
            ));
        } else {
            fetched.local = local_records(wc.as_ref(), &entries);
        }
        debug!(local = fetched.local.len(), "local changes collected");

        if !with_remote {
            return Ok(fetched);
        }

        monitor.sub_task("collecting remote changes");
        let base = root_local
            .base_revision
            .or(root_local.revision)
            .ok_or_else(|| CompareError::RootNotFound(format!("{} has no base revision", root.display())))?;

        // Items already known to be out of date, keyed by working path.
        let mut stale: HashMap<PathBuf, i64> = HashMap::new();
        let mut revisions = BTreeSet::new();
        if same_head {
            for entry in &entries {
                let incoming = ResourceState::from_status(entry.repos_text_status, entry.repos_prop_status, true);
                if ANY_CHANGE.accept_state(&entry.path, ResourceKind::File, incoming, ChangeMask::NONE)
                    || entry.repos_prop_status == EntryStatus::Modified
                {
                    let revision = entry.revision.unwrap_or(base);
                    stale.insert(entry.path.clone(), revision);
                    revisions.insert(revision);
                }
            }
        } else {
            revisions.insert(base);
        }

        let ancestor_url = roots.ancestor.url();
        let next = EntryRef::at(roots.right.url(), roots.right.selected()).with_peg(roots.right.peg());
        for revision in revisions {
            let prev = EntryRef::at(ancestor_url, Revision::Number(revision)).with_peg(Some(Revision::Number(revision)));
            let records = self
                .connector
                .diff_status(&prev, &next, Depth::Infinity, self.options, monitor)
                .await?;
            for record in records {
                let keep = match local_path(&record.path_prev, ancestor_url, &root) {
                    Some(path) => stale.get(&path).map_or(true, |r| *r == revision),
                    None => true,
                };
                if keep {
                    fetched.remote.push(record);
                }
            }
        }
        debug!(remote = fetched.remote.len(), "remote changes collected");
        Ok(fetched)
    }

    // -----------------------------------------------------------------------
    // Opening
    // -----------------------------------------------------------------------

    /// Compare the working copy with `remote_url` (its own URL when `None`)
    /// at `revision` and keep the resulting tree.
    pub async fn open_three_way(
        &mut self,
        remote_url: Option<&str>,
        revision: Revision,
        monitor: Arc<dyn ProgressMonitor>,
    ) -> Result<&CompareTree, CompareError> {
        let wc = self.require_working_copy()?;
        let roots = CompareRoots::for_working_copy(wc.root_url(), remote_url, revision)?;

        let statuses = match self.fetch_statuses(&roots, monitor.as_ref()).await {
            Ok(statuses) => statuses,
            Err(CompareError::Svn(err)) if err.is_cancelled() => {
                info!(session = %self.id, "status collection cancelled");
                FetchedStatuses::default()
            }
            Err(err) => return Err(err),
        };

        let compare = ThreeWayCompare::new(roots, statuses.local, statuses.remote);
        let build_monitor = Arc::clone(&monitor);
        let outcome = tokio::task::spawn_blocking(move || compare.build(wc.as_ref(), build_monitor.as_ref()))
            .await
            .map_err(|e| CompareError::TaskFailed(e.to_string()))??;
        self.three_way = true;
        self.install(outcome, monitor.as_ref()).await
    }

    /// Compare repository folder `next` with `prev`.
    pub async fn open_two_way(
        &mut self,
        next: RepositoryResource,
        prev: RepositoryResource,
        monitor: Arc<dyn ProgressMonitor>,
    ) -> Result<&CompareTree, CompareError> {
        let prev_ref = EntryRef::at(prev.url(), prev.selected()).with_peg(prev.peg());
        let next_ref = EntryRef::at(next.url(), next.selected()).with_peg(next.peg());
        let changes = match self
            .connector
            .diff_status(&prev_ref, &next_ref, Depth::Infinity, self.options, monitor.as_ref())
            .await
        {
            Ok(changes) => changes,
            Err(err) if err.is_cancelled() => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let compare = TwoWayCompare::new(CompareRoots::for_urls(next, prev), changes);
        let build_monitor = Arc::clone(&monitor);
        let outcome = tokio::task::spawn_blocking(move || compare.build(build_monitor.as_ref()))
            .await
            .map_err(|e| CompareError::TaskFailed(e.to_string()))??;
        self.three_way = false;
        self.install(outcome, monitor.as_ref()).await
    }

    async fn install(
        &mut self,
        outcome: BuildOutcome,
        monitor: &dyn ProgressMonitor,
    ) -> Result<&CompareTree, CompareError> {
        let cancelled = outcome.cancelled || monitor.is_cancelled();
        info!(
            session = %self.id,
            nodes = outcome.tree.len(),
            errors = outcome.tree.errors().len(),
            cancelled,
            "compare session opened"
        );
        self.tree = Some(outcome.tree);
        self.cancelled = cancelled;
        if self.fetch_contents && !cancelled {
            self.fetch_all_contents(monitor).await?;
        }
        self.tree()
    }

    // -----------------------------------------------------------------------
    // Contents
    // -----------------------------------------------------------------------

    /// Fetch the bytes of every side of a file node. A failing side marks
    /// the node with an error; the call itself only fails for an unknown
    /// node.
    #[instrument(skip(self, monitor), fields(session = %self.id))]
    pub async fn fetch_contents(&mut self, id: NodeId, monitor: &dyn ProgressMonitor) -> Result<(), CompareError> {
        let plan: Vec<(Side, ContentSource)> = {
            let node = self
                .tree()?
                .get(id)
                .ok_or_else(|| CompareError::NodeNotFound(format!("#{}", id.index())))?;
            [Side::Left, Side::Ancestor, Side::Right]
                .into_iter()
                .filter(|side| self.three_way || *side != Side::Ancestor)
                .filter_map(|side| content_source(node.element(side)).map(|source| (side, source)))
                .collect()
        };
        if plan.is_empty() {
            return Ok(());
        }

        let mut results = Vec::with_capacity(plan.len());
        for (side, source) in plan {
            let result = match source {
                ContentSource::Local(path) => self.read_local(&path),
                ContentSource::Repository(target) => match self.connector.content(&target, monitor).await {
                    Ok(bytes) => Ok(bytes),
                    Err(SvnError::Cancelled) => {
                        debug!("content fetch cancelled");
                        break;
                    }
                    Err(err) => Err(err.to_string()),
                },
            };
            results.push((side, result));
        }

        let tree = self.tree_mut()?;
        let mut failure = None;
        for (side, result) in results {
            match result {
                Ok(bytes) => tree.update_element(id, side, |element| element.set_content(bytes))?,
                Err(message) => {
                    warn!(node = id.index(), ?side, error = %message, "could not fetch content");
                    tree.update_element(id, side, |element| {
                        element.content = ContentState::Failed(message.clone());
                    })?;
                    failure.get_or_insert(message);
                }
            }
        }
        if failure.is_some() {
            tree.set_error(id, failure);
        }
        Ok(())
    }

    /// Fetch contents of every changed file node; returns how many nodes
    /// were visited.
    pub async fn fetch_all_contents(&mut self, monitor: &dyn ProgressMonitor) -> Result<usize, CompareError> {
        let targets: Vec<NodeId> = {
            let tree = self.tree()?;
            tree.walk()
                .into_iter()
                .filter(|id| {
                    let node = tree.node(*id);
                    !node.is_folder() && !node.kind.is_no_change()
                })
                .collect()
        };
        let total = targets.len() as u64;
        let mut visited = 0;
        for id in targets {
            if monitor.is_cancelled() {
                break;
            }
            self.fetch_contents(id, monitor).await?;
            visited += 1;
            monitor.report_progress(visited as u64, total);
        }
        Ok(visited)
    }

    fn read_local(&self, path: &std::path::Path) -> Result<Vec<u8>, String> {
        let Some(wc) = &self.working_copy else {
            return Err(format!("no working copy for {}", path.display()));
        };
        match wc.read_file(path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.to_string()),
        }
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    pub fn copy(&mut self, id: NodeId, direction: CopyDirection) -> Result<(), CompareError> {
        self.tree_mut()?.copy(id, direction)
    }

    /// Write every dirty left buffer back to the working copy. Returns the
    /// number of files written; a failed write marks its node and leaves
    /// the buffer dirty.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn save(&mut self) -> Result<usize, CompareError> {
        let wc = self.require_working_copy()?;
        let tree = self.tree.as_mut().ok_or(CompareError::NotOpened)?;
        let mut written = Vec::new();
        for id in tree.dirty_nodes() {
            let node = tree.node(id);
            let (Some(local), Some(bytes)) = (&node.left.local, node.left.bytes()) else {
                continue;
            };
            let path = local.path.clone();
            match wc.write_file(&path, bytes) {
                Ok(()) => {
                    tree.mark_saved(id);
                    written.push(path);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not save buffer");
                    tree.set_error(id, Some(err.to_string()));
                }
            }
        }
        if !written.is_empty() {
            if let Some(filters) = &self.filters {
                filters.resources_state_changed(&ResourceStatesChanged::new(written.clone()));
            }
        }
        info!(saved = written.len(), "dirty buffers saved");
        Ok(written.len())
    }

    /// End the session. Returns how many unsaved buffers were discarded.
    pub fn close(mut self) -> usize {
        let discarded = self.tree.as_ref().map_or(0, |tree| tree.dirty_nodes().len());
        if discarded > 0 {
            warn!(session = %self.id, discarded, "closing compare session with unsaved changes");
        }
        self.tree = None;
        debug!(session = %self.id, "compare session closed");
        discarded
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    /// Properties whose values differ between the sides of a node.
    pub async fn properties(&self, id: NodeId, monitor: &dyn ProgressMonitor) -> Result<Vec<PropertyDiff>, CompareError> {
        let node = self
            .tree()?
            .get(id)
            .ok_or_else(|| CompareError::NodeNotFound(format!("#{}", id.index())))?;
        if !node.kind.allows_property_compare(self.three_way) {
            return Ok(Vec::new());
        }

        let ancestor = if self.three_way {
            self.side_properties(&node.ancestor, monitor).await?
        } else {
            BTreeMap::new()
        };
        // An unchanged side of a three-way node carries the ancestor's values.
        let left = if self.three_way && node.local_change == EntryStatus::None {
            ancestor.clone()
        } else {
            self.side_properties(&node.left, monitor).await?
        };
        let right = if self.three_way && node.remote_change == EntryStatus::None {
            ancestor.clone()
        } else {
            self.side_properties(&node.right, monitor).await?
        };

        let names: BTreeSet<&String> = left.keys().chain(ancestor.keys()).chain(right.keys()).collect();
        let mut diffs = Vec::new();
        for name in names {
            let row = PropertyDiff {
                name: name.clone(),
                left: left.get(name).cloned(),
                ancestor: ancestor.get(name).cloned(),
                right: right.get(name).cloned(),
            };
            let differs = if self.three_way {
                row.left != row.ancestor || row.right != row.ancestor
            } else {
                row.left != row.right
            };
            if differs {
                diffs.push(row);
            }
        }
        Ok(diffs)
    }

    async fn side_properties(
        &self,
        element: &ResourceElement,
        monitor: &dyn ProgressMonitor,
    ) -> Result<BTreeMap<String, String>, CompareError> {
        let Some(target) = element_ref(element) else {
            return Ok(BTreeMap::new());
        };
        let records = self.connector.properties(&target, monitor).await?;
        Ok(records.into_iter().map(|p| (p.name, p.value)).collect())
    }
}

/// Local changes worth a node: any change filter hit, or modified
/// properties on an otherwise unchanged item.
fn local_records(wc: &dyn WorkingCopy, entries: &[StatusEntry]) -> Vec<DiffStatusRecord> {
    let mut records = Vec::new();
    for entry in entries {
        let state = ResourceState::from_status(entry.text_status, entry.prop_status, false);
        if state == ResourceState::NotExists {
            continue;
        }
        let kind = wc.local_resource(&entry.path).kind;
        let probe = LocalResource::from_state(&entry.path, kind, state, ChangeMask::NONE);
        if !ANY_CHANGE.accept(&probe) && entry.prop_status != EntryStatus::Modified {
            continue;
        }
        let node_kind = match kind {
            ResourceKind::File => NodeKind::File,
            ResourceKind::Folder => NodeKind::Dir,
        };
        let path = entry.path.display().to_string();
        records.push(DiffStatusRecord::new(
            path.clone(),
            path,
            node_kind,
            entry.text_status,
            entry.prop_status,
        ));
    }
    records
}

/// Where the bytes of one side come from.
fn content_source(element: &ResourceElement) -> Option<ContentSource> {
    if element.kind() == ResourceKind::Folder {
        return None;
    }
    match element.selected() {
        Revision::Invalid if element.is_editable() => element.local.as_ref().map(|l| ContentSource::Local(l.path.clone())),
        Revision::Invalid => None,
        Revision::Working => element.local.as_ref().map(|l| ContentSource::Local(l.path.clone())),
        _ => element_ref(element).map(ContentSource::Repository),
    }
}

/// Connector reference for the revision shown on one side.
fn element_ref(element: &ResourceElement) -> Option<EntryRef> {
    match element.selected() {
        Revision::Invalid => None,
        Revision::Working => element
            .local
            .as_ref()
            .map(|l| EntryRef::at(l.path.display().to_string(), Revision::Working)),
        Revision::Base => Some(match &element.local {
            Some(local) => EntryRef::at(local.path.display().to_string(), Revision::Base),
            None => EntryRef::at(element.url(), Revision::Base),
        }),
        selected => Some(EntryRef::at(element.url(), selected).with_peg(element.resource.peg())),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::compare::DiffKind;
    use crate::monitor::{CancelFlag, NullMonitor};
    use crate::svn::{InfoEntry, PropertyRecord};
    use crate::working_copy::MemoryWorkingCopy;

    const URL: &str = "http://svn.example.com/repo/trunk";

    #[derive(Default)]
    struct ScriptedConnector {
        status: Vec<StatusEntry>,
        diffs: Vec<DiffStatusRecord>,
        contents: HashMap<String, Vec<u8>>,
        properties: HashMap<String, Vec<PropertyRecord>>,
        calls: Mutex<Vec<String>>,
    }

    fn key(target: &EntryRef) -> String {
        match target.revision {
            Some(revision) => format!("{}@{}", target.target, revision),
            None => target.target.clone(),
        }
    }

    impl ScriptedConnector {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SvnConnector for ScriptedConnector {
        async fn status(
            &self,
            path: &Path,
            _depth: Depth,
            options: ConnectorOptions,
            monitor: &dyn ProgressMonitor,
        ) -> Result<Vec<StatusEntry>, SvnError> {
            crate::svn::ensure_not_cancelled(monitor)?;
            self.calls
                .lock()
                .unwrap()
                .push(format!("status {} u={}", path.display(), options.server_side));
            Ok(self.status.clone())
        }

        async fn diff_status(
            &self,
            prev: &EntryRef,
            next: &EntryRef,
            _depth: Depth,
            _options: ConnectorOptions,
            monitor: &dyn ProgressMonitor,
        ) -> Result<Vec<DiffStatusRecord>, SvnError> {
            crate::svn::ensure_not_cancelled(monitor)?;
            self.calls.lock().unwrap().push(format!("diff {} {}", key(prev), key(next)));
            Ok(self.diffs.clone())
        }

        async fn properties(
            &self,
            target: &EntryRef,
            _monitor: &dyn ProgressMonitor,
        ) -> Result<Vec<PropertyRecord>, SvnError> {
            Ok(self.properties.get(&key(target)).cloned().unwrap_or_default())
        }

        async fn content(&self, target: &EntryRef, _monitor: &dyn ProgressMonitor) -> Result<Vec<u8>, SvnError> {
            self.contents.get(&key(target)).cloned().ok_or(SvnError::CommandFailed {
                exit_code: 1,
                stderr: format!("E160013: path not found: {}", key(target)),
            })
        }

        async fn info(
            &self,
            _target: &EntryRef,
            _depth: Depth,
            _monitor: &dyn ProgressMonitor,
        ) -> Result<Vec<InfoEntry>, SvnError> {
            Ok(Vec::new())
        }
    }

    fn modified_wc() -> Arc<MemoryWorkingCopy> {
        Arc::new(
            MemoryWorkingCopy::new("/wc", URL, 10)
                .file("a.txt", ResourceState::Modified, "local")
                .file("b.txt", ResourceState::Normal, "base"),
        )
    }

    fn entry(path: &str, text: EntryStatus, revision: i64) -> StatusEntry {
        let mut entry = StatusEntry::new(path, text, EntryStatus::None);
        entry.revision = Some(revision);
        entry
    }

    fn new_session(connector: ScriptedConnector, wc: Arc<MemoryWorkingCopy>) -> (CompareSession, Arc<ScriptedConnector>) {
        let connector = Arc::new(connector);
        let session = CompareSession::new(connector.clone(), &CompareConfig::default())
            .with_working_copy(wc, &FilterConfig::default());
        (session, connector)
    }

    #[tokio::test]
    async fn test_open_three_way_merges_local_and_remote() {
        let mut remote = entry("/wc/b.txt", EntryStatus::Normal, 10);
        remote.repos_text_status = EntryStatus::Modified;
        let connector = ScriptedConnector {
            status: vec![
                entry("/wc", EntryStatus::Normal, 10),
                entry("/wc/a.txt", EntryStatus::Modified, 10),
                remote,
            ],
            diffs: vec![DiffStatusRecord::new(
                format!("{}/b.txt", URL),
                format!("{}/b.txt", URL),
                NodeKind::File,
                EntryStatus::Modified,
                EntryStatus::None,
            )],
            ..Default::default()
        };
        let (mut session, connector) = new_session(connector, modified_wc());
        let tree = session
            .open_three_way(None, Revision::Head, Arc::new(NullMonitor))
            .await
            .unwrap();

        let a = tree.node(tree.find(&format!("{}/a.txt", URL)).unwrap());
        assert_eq!(a.kind, DiffKind::CHANGE | DiffKind::LEFT);
        let b = tree.node(tree.find(&format!("{}/b.txt", URL)).unwrap());
        assert_eq!(b.kind, DiffKind::CHANGE | DiffKind::RIGHT);
        assert!(session.is_three_way());
        assert!(!session.was_cancelled());

        let calls = connector.calls();
        assert_eq!(calls[0], "status /wc u=true");
        assert_eq!(calls[1], format!("diff {}@10 {}@HEAD", URL, URL));
    }

    #[tokio::test]
    async fn test_base_revision_skips_remote_phase() {
        let connector = ScriptedConnector {
            status: vec![entry("/wc/a.txt", EntryStatus::Modified, 10)],
            ..Default::default()
        };
        let (mut session, connector) = new_session(connector, modified_wc());
        session
            .open_three_way(None, Revision::Base, Arc::new(NullMonitor))
            .await
            .unwrap();
        assert_eq!(connector.calls(), vec!["status /wc u=false".to_string()]);
    }

    #[tokio::test]
    async fn test_unversioned_root_yields_single_record() {
        let wc = Arc::new(MemoryWorkingCopy::unversioned("/scratch").file("x.txt", ResourceState::New, "x"));
        let (session, _) = new_session(ScriptedConnector::default(), wc);
        let roots = CompareRoots::for_working_copy(None, Some(URL), Revision::Head).unwrap();
        let fetched = session.fetch_statuses(&roots, &NullMonitor).await.unwrap();
        assert_eq!(fetched.local.len(), 1);
        assert_eq!(fetched.local[0].text_status, EntryStatus::Unversioned);
        assert_eq!(fetched.local[0].path_prev, "/scratch");
        assert!(fetched.remote.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_open_yields_root_only() {
        let (mut session, _) = new_session(ScriptedConnector::default(), modified_wc());
        let flag = CancelFlag::new();
        flag.cancel();
        let tree = session
            .open_three_way(None, Revision::Head, Arc::new(flag))
            .await
            .unwrap();
        assert_eq!(tree.len(), 1);
        assert!(session.was_cancelled());
    }

    #[tokio::test]
    async fn test_fetch_copy_save_roundtrip() {
        let mut contents = HashMap::new();
        contents.insert("/wc/a.txt@BASE".to_string(), b"base".to_vec());
        contents.insert(format!("{}/a.txt@HEAD", URL), b"remote".to_vec());
        let mut remote = entry("/wc/a.txt", EntryStatus::Modified, 10);
        remote.repos_text_status = EntryStatus::Modified;
        let connector = ScriptedConnector {
            status: vec![remote],
            diffs: vec![DiffStatusRecord::new(
                format!("{}/a.txt", URL),
                format!("{}/a.txt", URL),
                NodeKind::File,
                EntryStatus::Modified,
                EntryStatus::None,
            )],
            contents,
            ..Default::default()
        };
        let wc = modified_wc();
        let (mut session, _) = new_session(connector, wc.clone());
        session
            .open_three_way(None, Revision::Head, Arc::new(NullMonitor))
            .await
            .unwrap();
        let id = session.tree().unwrap().find(&format!("{}/a.txt", URL)).unwrap();

        session.fetch_contents(id, &NullMonitor).await.unwrap();
        let node = session.tree().unwrap().node(id);
        assert!(node.kind.is_conflicting());
        assert_eq!(node.left.bytes(), Some(&b"local"[..]));
        assert_eq!(node.ancestor.bytes(), Some(&b"base"[..]));
        assert_eq!(node.right.bytes(), Some(&b"remote"[..]));
        assert!(node.error.is_none());

        session.copy(id, CopyDirection::RightToLeft).unwrap();
        assert_eq!(session.save().unwrap(), 1);
        assert_eq!(wc.content(Path::new("/wc/a.txt")).unwrap(), b"remote");
        assert!(session.tree().unwrap().dirty_nodes().is_empty());
        assert_eq!(session.filters().unwrap().stats().invalidations, 1);
        assert_eq!(session.close(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_marks_node_only() {
        let connector = ScriptedConnector {
            status: vec![entry("/wc/a.txt", EntryStatus::Modified, 10)],
            ..Default::default()
        };
        let (mut session, _) = new_session(connector, modified_wc());
        session
            .open_three_way(None, Revision::Base, Arc::new(NullMonitor))
            .await
            .unwrap();
        let id = session.tree().unwrap().find(&format!("{}/a.txt", URL)).unwrap();
        session.fetch_contents(id, &NullMonitor).await.unwrap();

        let node = session.tree().unwrap().node(id);
        assert_eq!(node.left.bytes(), Some(&b"local"[..]));
        assert!(matches!(node.ancestor.content, ContentState::Failed(_)));
        assert!(node.error.is_some());
    }

    #[tokio::test]
    async fn test_close_reports_discarded_buffers() {
        let mut contents = HashMap::new();
        contents.insert("/wc/a.txt@BASE".to_string(), b"base".to_vec());
        let connector = ScriptedConnector {
            status: vec![entry("/wc/a.txt", EntryStatus::Modified, 10)],
            contents,
            ..Default::default()
        };
        let (mut session, _) = new_session(connector, modified_wc());
        session
            .open_three_way(None, Revision::Base, Arc::new(NullMonitor))
            .await
            .unwrap();
        let id = session.tree().unwrap().find(&format!("{}/a.txt", URL)).unwrap();
        session
            .tree_mut()
            .unwrap()
            .update_element(id, Side::Left, |left| left.edit(b"draft".to_vec()))
            .unwrap();
        let mut events = session.subscribe().unwrap();
        assert_eq!(session.close(), 1);
        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_property_rows_for_changed_node() {
        let mut properties = HashMap::new();
        properties.insert(
            "/wc/a.txt@WORKING".to_string(),
            vec![
                PropertyRecord { name: "svn:eol-style".into(), value: "native".into() },
                PropertyRecord { name: "owner".into(), value: "ops".into() },
            ],
        );
        properties.insert(
            "/wc/a.txt@BASE".to_string(),
            vec![PropertyRecord { name: "owner".into(), value: "ops".into() }],
        );
        let connector = ScriptedConnector {
            status: vec![entry("/wc/a.txt", EntryStatus::Modified, 10)],
            properties,
            ..Default::default()
        };
        let (mut session, _) = new_session(connector, modified_wc());
        session
            .open_three_way(None, Revision::Base, Arc::new(NullMonitor))
            .await
            .unwrap();
        let id = session.tree().unwrap().find(&format!("{}/a.txt", URL)).unwrap();
        let rows = session.properties(id, &NullMonitor).await.unwrap();
        assert_eq!(
            rows,
            vec![PropertyDiff {
                name: "svn:eol-style".into(),
                left: Some("native".into()),
                ancestor: None,
                right: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_two_way_session_without_working_copy() {
        let next = "http://svn.example.com/repo/branches/b1";
        let connector = Arc::new(ScriptedConnector {
            diffs: vec![DiffStatusRecord::new(
                format!("{}/gone.txt", URL),
                format!("{}/gone.txt", next),
                NodeKind::File,
                EntryStatus::Deleted,
                EntryStatus::None,
            )],
            ..Default::default()
        });
        let mut session = CompareSession::new(connector.clone(), &CompareConfig::default());
        let tree = session
            .open_two_way(
                RepositoryResource::new(ResourceKind::Folder, next, Revision::Head),
                RepositoryResource::new(ResourceKind::Folder, URL, Revision::Number(4)),
                Arc::new(NullMonitor),
            )
            .await
            .unwrap();
        let gone = tree.node(tree.find(&format!("{}/gone.txt", URL)).unwrap());
        assert_eq!(gone.kind, DiffKind::ADDITION);
        assert!(!session.is_three_way());
        assert!(!session.has_local_changes());
        assert_eq!(connector.calls(), vec![format!("diff {}@4 {}@HEAD", URL, next)]);
    }
}
