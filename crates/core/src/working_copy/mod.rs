//! Working-copy providers.
//!
//! The compare engine and the filter cache only see a working copy through
//! [`WorkingCopy`]: resolved descriptors, folder membership and plain file
//! access. [`MemoryWorkingCopy`] is a scripted tree, [`SnapshotWorkingCopy`]
//! is captured from `svn status`/`svn info` plus the file system.

pub mod memory;
pub mod snapshot;

use std::io;
use std::path::Path;

use crate::filter::ResourceProvider;
use crate::resource::{LocalResource, ResourceKind};

pub use memory::MemoryWorkingCopy;
pub use snapshot::SnapshotWorkingCopy;

/// A checked-out tree the compare engine can inspect and write back to.
pub trait WorkingCopy: ResourceProvider + Send + Sync {
    /// Local path of the compared root.
    fn root_path(&self) -> &Path;

    /// Decoded repository URL of the root; `None` when the root is not
    /// under version control.
    fn root_url(&self) -> Option<&str>;

    fn root_resource(&self) -> LocalResource {
        self.local_resource(self.root_path())
    }

    /// Kind of the item physically present at `path`, if any.
    fn kind_on_disk(&self, path: &Path) -> Option<ResourceKind>;

    fn exists_on_disk(&self, path: &Path) -> bool {
        self.kind_on_disk(path).is_some()
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;
}
