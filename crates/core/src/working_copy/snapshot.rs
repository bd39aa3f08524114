//! Working copy captured from `svn status`/`svn info` and the file system.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::WorkingCopy;
use crate::config::FilterConfig;
use crate::errors::SvnError;
use crate::filter::ResourceProvider;
use crate::monitor::ProgressMonitor;
use crate::path::decode_url;
use crate::resource::{ChangeMask, LocalResource, ResourceKind, ResourceState};
use crate::svn::{ConnectorOptions, Depth, EntryRef, EntryStatus, InfoEntry, NodeKind, StatusEntry, SvnConnector};

const ADMIN_DIR: &str = ".svn";

/// Descriptors resolved once from connector output; file contents and
/// presence are read live from disk.
#[derive(Debug, Clone)]
pub struct SnapshotWorkingCopy {
    root_path: PathBuf,
    root_url: Option<String>,
    entries: BTreeMap<PathBuf, LocalResource>,
    filters: FilterConfig,
}

impl SnapshotWorkingCopy {
    /// Query the connector for the whole tree below `root`.
    ///
    /// A root the connector refuses to report on is treated as an
    /// unversioned folder; cancellation is propagated.
    pub async fn capture(
        connector: &dyn SvnConnector,
        root: &Path,
        filters: &FilterConfig,
        ignore_externals: bool,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Self, SvnError> {
        monitor.sub_task("reading working copy status");
        let options = ConnectorOptions {
            ignore_externals,
            server_side: false,
        };
        let status = match connector.status(root, Depth::Infinity, options, monitor).await {
            Ok(status) => status,
            Err(SvnError::CommandFailed { stderr, .. }) => {
                warn!(root = %root.display(), %stderr, "status failed; treating root as unversioned");
                return Ok(Self::from_entries(root, Vec::new(), Vec::new(), filters.clone()));
            }
            Err(e) => return Err(e),
        };
        let target = EntryRef::new(root.to_string_lossy().to_string());
        let info = match connector.info(&target, Depth::Infinity, monitor).await {
            Ok(info) => info,
            Err(SvnError::CommandFailed { stderr, .. }) => {
                warn!(root = %root.display(), %stderr, "info failed; URLs unavailable");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self::from_entries(root, status, info, filters.clone()))
    }

    pub fn from_entries(
        root: impl Into<PathBuf>,
        status: Vec<StatusEntry>,
        info: Vec<InfoEntry>,
        filters: FilterConfig,
    ) -> Self {
        let root_path = root.into();
        let info: HashMap<PathBuf, InfoEntry> = info
            .into_iter()
            .map(|entry| (PathBuf::from(&entry.path), entry))
            .collect();
        let root_url = info.get(&root_path).map(|entry| decoded(&entry.url));

        let mut snapshot = Self {
            root_path,
            root_url,
            entries: BTreeMap::new(),
            filters,
        };

        // Parents sort before their members, so a member can consult the
        // already-resolved state of its folder.
        let mut status = status;
        status.sort_by(|a, b| a.path.cmp(&b.path));
        for entry in status {
            let resource = snapshot.resolve(&entry, info.get(&entry.path));
            snapshot.entries.insert(entry.path.clone(), resource);
        }
        if !snapshot.entries.contains_key(&snapshot.root_path) {
            let root = snapshot.local_resource(&snapshot.root_path);
            snapshot.entries.insert(snapshot.root_path.clone(), root);
        }
        info!(
            root = %snapshot.root_path.display(),
            entries = snapshot.entries.len(),
            versioned = snapshot.root_url.is_some(),
            "captured working copy snapshot"
        );
        snapshot
    }

    fn resolve(&self, entry: &StatusEntry, info: Option<&InfoEntry>) -> LocalResource {
        let kind = info
            .and_then(|i| resource_kind(i.kind))
            .or_else(|| resource_kind(entry.node_kind))
            .or_else(|| self.kind_on_disk(&entry.path))
            .unwrap_or(ResourceKind::File);

        let mut state = ResourceState::from_status(entry.text_status, entry.prop_status, false);
        match entry.text_status {
            EntryStatus::Unversioned => state = self.unversioned_state(&entry.path),
            EntryStatus::Deleted if self.exists_on_disk(&entry.path) => state = ResourceState::Prereplaced,
            _ => {}
        }

        let mut resource = LocalResource::from_state(entry.path.clone(), kind, state, ChangeMask::NONE);
        resource.text_state = ResourceState::from_status(entry.text_status, EntryStatus::Normal, false);
        resource.prop_state = ResourceState::from_prop_status(entry.prop_status);
        resource.revision = entry.last_changed;
        resource.base_revision = entry.revision;
        if entry.copied {
            resource.mask |= ChangeMask::COPIED;
        }
        if entry.switched {
            resource.mask |= ChangeMask::SWITCHED;
        }
        if entry.locked {
            resource.mask |= ChangeMask::LOCKED;
        }
        if entry.tree_conflicted {
            resource.mask |= ChangeMask::TREE_CONFLICT;
        }
        if entry.text_status == EntryStatus::External {
            resource.mask |= ChangeMask::SVN_EXTERNALS;
        }
        if let Some(info) = info {
            resource.url = Some(decoded(&info.url));
            if let (Some(url), Some(rev)) = (&info.copy_from_url, info.copy_from_rev) {
                resource = resource.with_copied_from(decoded(url), rev);
            }
        }
        resource
    }

    /// State of an item svn does not track: ignored by pattern, new below a
    /// versioned folder, or unversioned below an unversioned one.
    fn unversioned_state(&self, path: &Path) -> ResourceState {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        if self.filters.is_ignored(&name) {
            return ResourceState::Ignored;
        }
        let parent_state = path
            .parent()
            .and_then(|p| self.entries.get(p))
            .map(|p| p.state.canonical());
        match parent_state {
            Some(ResourceState::New | ResourceState::Ignored | ResourceState::NotExists) | None => {
                ResourceState::Unversioned
            }
            Some(_) => ResourceState::New,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn resource_kind(kind: NodeKind) -> Option<ResourceKind> {
    match kind {
        NodeKind::Dir => Some(ResourceKind::Folder),
        NodeKind::File | NodeKind::Symlink => Some(ResourceKind::File),
        NodeKind::None | NodeKind::Unknown => None,
    }
}

fn decoded(url: &str) -> String {
    decode_url(url).unwrap_or_else(|e| {
        debug!(url, error = %e, "keeping undecodable URL as reported");
        url.to_string()
    })
}

impl ResourceProvider for SnapshotWorkingCopy {
    fn local_resource(&self, path: &Path) -> LocalResource {
        if let Some(resource) = self.entries.get(path) {
            return resource.clone();
        }
        match self.kind_on_disk(path) {
            Some(kind) if self.is_supervised(path) => {
                let state = if path == self.root_path {
                    ResourceState::New
                } else {
                    self.unversioned_state(path)
                };
                LocalResource::from_state(path, kind, state, ChangeMask::NONE)
            }
            Some(kind) => LocalResource::invalid(path, kind),
            None => LocalResource::unversioned(path, ResourceKind::File),
        }
    }

    fn members(&self, path: &Path) -> Vec<PathBuf> {
        let mut members: BTreeSet<PathBuf> = self
            .entries
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        match fs::read_dir(path) {
            Ok(dir) => {
                for entry in dir.flatten() {
                    if entry.file_name() != ADMIN_DIR {
                        members.insert(entry.path());
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!(path = %path.display(), error = %e, "cannot list folder"),
        }
        members.into_iter().collect()
    }

    fn is_supervised(&self, path: &Path) -> bool {
        path.starts_with(&self.root_path) && !path.components().any(|c| c.as_os_str() == ADMIN_DIR)
    }
}

impl WorkingCopy for SnapshotWorkingCopy {
    fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn root_url(&self) -> Option<&str> {
        self.root_url.as_deref()
    }

    fn kind_on_disk(&self, path: &Path) -> Option<ResourceKind> {
        let meta = fs::symlink_metadata(path).ok()?;
        Some(if meta.is_dir() {
            ResourceKind::Folder
        } else {
            ResourceKind::File
        })
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if !self.is_supervised(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is outside the working copy", path.display()),
            ));
        }
        fs::write(path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(path: &Path, text: EntryStatus, rev: Option<i64>) -> StatusEntry {
        let mut entry = StatusEntry::new(path, text, EntryStatus::None);
        entry.revision = rev;
        entry.last_changed = rev;
        entry
    }

    fn info(path: &Path, url: &str, kind: NodeKind) -> InfoEntry {
        InfoEntry {
            path: path.to_string_lossy().to_string(),
            url: url.to_string(),
            root_url: "http://svn.example.com/repo".to_string(),
            kind,
            revision: Some(5),
            last_changed: Some(4),
            copy_from_url: None,
            copy_from_rev: None,
        }
    }

    fn filters(patterns: &[&str]) -> FilterConfig {
        FilterConfig {
            global_ignores: patterns.iter().map(|p| p.to_string()).collect(),
            ..FilterConfig::default()
        }
    }

    #[test]
    fn test_snapshot_resolves_states_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("my file.txt"), "x").unwrap();
        fs::write(root.join("build.log"), "log").unwrap();
        fs::create_dir(root.join(".svn")).unwrap();

        let statuses = vec![
            status(&root, EntryStatus::Normal, Some(5)),
            status(&root.join("src"), EntryStatus::Normal, Some(5)),
            status(&root.join("src/main.rs"), EntryStatus::Modified, Some(4)),
            status(&root.join("my file.txt"), EntryStatus::Unversioned, None),
            status(&root.join("build.log"), EntryStatus::Unversioned, None),
        ];
        let infos = vec![
            info(&root, "http://svn.example.com/repo/trunk", NodeKind::Dir),
            info(&root.join("src"), "http://svn.example.com/repo/trunk/src", NodeKind::Dir),
            info(&root.join("src/main.rs"), "http://svn.example.com/repo/trunk/src/main.rs", NodeKind::File),
        ];
        let wc = SnapshotWorkingCopy::from_entries(&root, statuses, infos, filters(&["*.log"]));

        assert_eq!(wc.root_url(), Some("http://svn.example.com/repo/trunk"));
        let main = wc.local_resource(&root.join("src/main.rs"));
        assert_eq!(main.state, ResourceState::Modified);
        assert_eq!(main.kind, ResourceKind::File);
        assert_eq!(main.revision, Some(4));
        assert_eq!(wc.local_resource(&root.join("my file.txt")).state, ResourceState::New);
        assert_eq!(wc.local_resource(&root.join("build.log")).state, ResourceState::Ignored);

        let members = wc.members(&root);
        assert!(members.contains(&root.join("src")));
        assert!(!members.contains(&root.join(".svn")));
        assert!(!wc.is_supervised(&root.join(".svn/wc.db")));
    }

    #[test]
    fn test_items_below_unversioned_folder_are_unversioned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("scratch/inner")).unwrap();
        fs::write(root.join("scratch/inner/a.txt"), "a").unwrap();

        let statuses = vec![
            status(&root, EntryStatus::Normal, Some(2)),
            status(&root.join("scratch"), EntryStatus::Unversioned, None),
        ];
        let infos = vec![info(&root, "http://svn.example.com/repo/trunk", NodeKind::Dir)];
        let wc = SnapshotWorkingCopy::from_entries(&root, statuses, infos, FilterConfig::default());

        let scratch = wc.local_resource(&root.join("scratch"));
        assert_eq!(scratch.state, ResourceState::New);
        assert_eq!(scratch.kind, ResourceKind::Folder);
        let inner = wc.local_resource(&root.join("scratch/inner"));
        assert_eq!(inner.state, ResourceState::Unversioned);
        assert_eq!(wc.members(&root.join("scratch")), vec![root.join("scratch/inner")]);
    }

    #[test]
    fn test_deleted_but_present_is_prereplaced() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("back.txt"), "again").unwrap();
        let statuses = vec![
            status(&root, EntryStatus::Normal, Some(2)),
            status(&root.join("back.txt"), EntryStatus::Deleted, Some(2)),
            status(&root.join("gone.txt"), EntryStatus::Deleted, Some(2)),
        ];
        let wc = SnapshotWorkingCopy::from_entries(&root, statuses, Vec::new(), FilterConfig::default());
        assert_eq!(wc.local_resource(&root.join("back.txt")).state, ResourceState::Prereplaced);
        assert_eq!(wc.local_resource(&root.join("gone.txt")).state, ResourceState::Deleted);
        assert!(wc.root_url().is_none());
    }

    #[test]
    fn test_file_access() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("a.txt"), "old").unwrap();
        let wc = SnapshotWorkingCopy::from_entries(&root, Vec::new(), Vec::new(), FilterConfig::default());
        wc.write_file(&root.join("a.txt"), b"new").unwrap();
        assert_eq!(wc.read_file(&root.join("a.txt")).unwrap(), b"new");
        assert_eq!(wc.kind_on_disk(&root), Some(ResourceKind::Folder));
        assert!(wc.write_file(Path::new("/definitely/elsewhere.txt"), b"x").is_err());
        assert_eq!(wc.root_resource().state, ResourceState::New);
    }
}
