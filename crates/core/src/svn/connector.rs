//! The repository connector seam.
//!
//! The compare engine never talks to `svn` directly; everything goes through
//! [`SvnConnector`] so tests and tools can substitute scripted answers.

use std::path::Path;

use async_trait::async_trait;

use super::types::{
    ConnectorOptions, Depth, DiffStatusRecord, EntryRef, InfoEntry, PropertyRecord, StatusEntry,
};
use crate::errors::SvnError;
use crate::monitor::ProgressMonitor;

/// Status, diff and content queries against a working copy or repository.
///
/// Every call checks the monitor before issuing work and fails with
/// [`SvnError::Cancelled`] when cancellation was requested.
#[async_trait]
pub trait SvnConnector: Send + Sync {
    /// Working-copy status of `path` and its members down to `depth`.
    async fn status(
        &self,
        path: &Path,
        depth: Depth,
        options: ConnectorOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<StatusEntry>, SvnError>;

    /// Changes between `prev` and `next`. `path_prev` of every record is
    /// rooted at `prev.target` and `path_next` at `next.target`.
    async fn diff_status(
        &self,
        prev: &EntryRef,
        next: &EntryRef,
        depth: Depth,
        options: ConnectorOptions,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<DiffStatusRecord>, SvnError>;

    /// Versioned properties of a single item.
    async fn properties(
        &self,
        target: &EntryRef,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<PropertyRecord>, SvnError>;

    /// File contents of a single item.
    async fn content(&self, target: &EntryRef, monitor: &dyn ProgressMonitor) -> Result<Vec<u8>, SvnError>;

    /// Repository information for `target` and its members down to `depth`.
    async fn info(
        &self,
        target: &EntryRef,
        depth: Depth,
        monitor: &dyn ProgressMonitor,
    ) -> Result<Vec<InfoEntry>, SvnError>;
}

/// Fail fast when the monitor was cancelled.
pub fn ensure_not_cancelled(monitor: &dyn ProgressMonitor) -> Result<(), SvnError> {
    if monitor.is_cancelled() {
        Err(SvnError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{CancelFlag, NullMonitor};

    #[test]
    fn test_ensure_not_cancelled() {
        assert!(ensure_not_cancelled(&NullMonitor).is_ok());
        let flag = CancelFlag::new();
        flag.cancel();
        assert!(matches!(ensure_not_cancelled(&flag), Err(SvnError::Cancelled)));
    }
}
