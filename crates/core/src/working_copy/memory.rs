//! Scripted in-memory working copy.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::WorkingCopy;
use crate::filter::ResourceProvider;
use crate::path::url_for_path;
use crate::resource::{ChangeMask, LocalResource, ResourceKind, ResourceState};

#[derive(Debug, Clone)]
struct MemoryEntry {
    resource: LocalResource,
    on_disk: bool,
    content: Vec<u8>,
}

/// A working copy described entirely in memory.
///
/// Paths given to the builder methods are relative to the root and use `/`
/// separators. Missing parent folders are created as unmodified versioned
/// folders.
#[derive(Debug)]
pub struct MemoryWorkingCopy {
    root_path: PathBuf,
    root_url: Option<String>,
    revision: Option<i64>,
    entries: RwLock<BTreeMap<PathBuf, MemoryEntry>>,
}

impl MemoryWorkingCopy {
    /// A versioned root checked out from `root_url` at `revision`.
    pub fn new(root_path: impl Into<PathBuf>, root_url: impl Into<String>, revision: i64) -> Self {
        let wc = Self {
            root_path: root_path.into(),
            root_url: Some(root_url.into()),
            revision: Some(revision),
            entries: RwLock::new(BTreeMap::new()),
        };
        let root = wc.describe(wc.root_path.clone(), ResourceKind::Folder, ResourceState::Normal);
        wc.insert(root, true, Vec::new());
        wc
    }

    /// A folder that is not under version control at all.
    pub fn unversioned(root_path: impl Into<PathBuf>) -> Self {
        let wc = Self {
            root_path: root_path.into(),
            root_url: None,
            revision: None,
            entries: RwLock::new(BTreeMap::new()),
        };
        let root = wc.describe(wc.root_path.clone(), ResourceKind::Folder, ResourceState::New);
        wc.insert(root, true, Vec::new());
        wc
    }

    pub fn folder(self, rel: &str, state: ResourceState) -> Self {
        let path = self.path(rel);
        self.ensure_parents(&path);
        let resource = self.describe(path, ResourceKind::Folder, state);
        let on_disk = default_on_disk(state);
        self.insert(resource, on_disk, Vec::new());
        self
    }

    pub fn file(self, rel: &str, state: ResourceState, content: impl Into<Vec<u8>>) -> Self {
        let path = self.path(rel);
        self.ensure_parents(&path);
        let resource = self.describe(path, ResourceKind::File, state);
        let on_disk = default_on_disk(state);
        self.insert(resource, on_disk, content.into());
        self
    }

    /// Adjust the descriptor of an existing item.
    pub fn with(self, rel: &str, adjust: impl FnOnce(&mut LocalResource)) -> Self {
        let path = self.path(rel);
        if let Some(entry) = self.write().get_mut(&path) {
            adjust(&mut entry.resource);
        }
        self
    }

    /// Mark an item as added with history from `url@revision`.
    pub fn copied(self, rel: &str, url: impl Into<String>, revision: i64) -> Self {
        let url = url.into();
        self.with(rel, |r| {
            *r = r.clone().with_copied_from(url, revision);
        })
    }

    /// Override whether the item physically exists.
    pub fn on_disk(self, rel: &str, present: bool) -> Self {
        let path = self.path(rel);
        if let Some(entry) = self.write().get_mut(&path) {
            entry.on_disk = present;
        }
        self
    }

    /// Change the state of an existing item in place.
    pub fn set_state(&self, rel: &str, state: ResourceState) {
        let path = self.path(rel);
        if let Some(entry) = self.write().get_mut(&path) {
            entry.resource.state = state;
            entry.resource.text_state = state;
        }
    }

    /// Current bytes of a file.
    pub fn content(&self, path: &Path) -> Option<Vec<u8>> {
        self.read().get(path).map(|e| e.content.clone())
    }

    /// Absolute path of a root-relative `/`-separated path.
    pub fn path(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root_path.clone(), |acc, seg| acc.join(seg))
    }

    fn describe(&self, path: PathBuf, kind: ResourceKind, state: ResourceState) -> LocalResource {
        let mut resource = LocalResource::from_state(path, kind, state, ChangeMask::NONE);
        let versioned = !matches!(
            state,
            ResourceState::New
                | ResourceState::Unversioned
                | ResourceState::Ignored
                | ResourceState::NotExists
                | ResourceState::InternalInvalid
        );
        if versioned {
            if let Some(root_url) = &self.root_url {
                resource.url = url_for_path(&resource.path, &self.root_path, root_url);
            }
            if state != ResourceState::Added {
                if let Some(revision) = self.revision {
                    resource = resource.with_revision(revision);
                }
            }
        }
        if state == ResourceState::External {
            resource.mask |= ChangeMask::SVN_EXTERNALS;
        }
        resource
    }

    fn ensure_parents(&self, path: &Path) {
        let mut missing = Vec::new();
        let mut current = path.parent();
        while let Some(parent) = current {
            if !parent.starts_with(&self.root_path) || self.read().contains_key(parent) {
                break;
            }
            missing.push(parent.to_path_buf());
            current = parent.parent();
        }
        for parent in missing.into_iter().rev() {
            let resource = self.describe(parent, ResourceKind::Folder, ResourceState::Normal);
            self.insert(resource, true, Vec::new());
        }
    }

    fn insert(&self, resource: LocalResource, on_disk: bool, content: Vec<u8>) {
        self.write().insert(
            resource.path.clone(),
            MemoryEntry {
                resource,
                on_disk,
                content,
            },
        );
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<PathBuf, MemoryEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<PathBuf, MemoryEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn default_on_disk(state: ResourceState) -> bool {
    !matches!(
        state,
        ResourceState::Deleted | ResourceState::Missing | ResourceState::NotExists
    )
}

impl ResourceProvider for MemoryWorkingCopy {
    fn local_resource(&self, path: &Path) -> LocalResource {
        match self.read().get(path) {
            Some(entry) => entry.resource.clone(),
            None => LocalResource::unversioned(path, ResourceKind::File),
        }
    }

    fn members(&self, path: &Path) -> Vec<PathBuf> {
        self.read()
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect()
    }

    fn is_supervised(&self, path: &Path) -> bool {
        path.starts_with(&self.root_path)
    }
}

impl WorkingCopy for MemoryWorkingCopy {
    fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn root_url(&self) -> Option<&str> {
        self.root_url.as_deref()
    }

    fn kind_on_disk(&self, path: &Path) -> Option<ResourceKind> {
        self.read()
            .get(path)
            .filter(|e| e.on_disk)
            .map(|e| e.resource.kind)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.read().get(path) {
            Some(entry) if entry.on_disk && entry.resource.is_file() => Ok(entry.content.clone()),
            _ => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no file at {}", path.display()),
            )),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if !self.is_supervised(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is outside the working copy", path.display()),
            ));
        }
        let mut entries = self.write();
        match entries.get_mut(path) {
            Some(entry) => {
                entry.content = data.to_vec();
                entry.on_disk = true;
            }
            None => {
                let resource = LocalResource::from_state(path, ResourceKind::File, ResourceState::New, ChangeMask::NONE);
                entries.insert(
                    path.to_path_buf(),
                    MemoryEntry {
                        resource,
                        on_disk: true,
                        content: data.to_vec(),
                    },
                );
            }
        }
        Ok(())
    }
}
