//! Diff status records and their ordering.

use std::cmp::Ordering;

use tracing::debug;

use crate::errors::CompareError;
use crate::resource::ResourceKind;

pub use crate::svn::{DiffStatusRecord, EntryStatus, NodeKind};

/// Sort records so that parents come before their members (or the reverse
/// when `parent_to_child` is false).
///
/// A deletion sorts before any other record for the same path, so a
/// replaced tree is torn down before it is rebuilt, and every deletion
/// below a deleted path is pulled up right behind it.
pub fn reorder(records: &mut Vec<DiffStatusRecord>, parent_to_child: bool) {
    let deleted = |r: &DiffStatusRecord| r.text_status == EntryStatus::Deleted;
    records.sort_by(|a, b| {
        let by_path = if parent_to_child {
            a.path_prev.cmp(&b.path_prev)
        } else {
            b.path_prev.cmp(&a.path_prev)
        };
        if by_path == Ordering::Equal && a.text_status != b.text_status {
            if deleted(a) {
                return if parent_to_child { Ordering::Less } else { Ordering::Greater };
            }
            if deleted(b) {
                return if parent_to_child { Ordering::Greater } else { Ordering::Less };
            }
        }
        by_path
    });

    let mut pending: Vec<Option<DiffStatusRecord>> = records.drain(..).map(Some).collect();
    for i in 0..pending.len() {
        let Some(record) = pending[i].take() else {
            continue;
        };
        let is_deletion = deleted(&record);
        let prefix = record.path_prev.clone();
        records.push(record);
        if !is_deletion {
            continue;
        }
        for slot in pending.iter_mut().skip(i + 1) {
            let shifts = slot
                .as_ref()
                .is_some_and(|r| deleted(r) && r.path_prev.starts_with(&prefix));
            if shifts {
                if let Some(r) = slot.take() {
                    records.push(r);
                }
            }
        }
    }
}

/// Node kind of a record, probing the file system for `None`/`Unknown`.
///
/// Items absent on disk resolve to [`NodeKind::None`] when `ignore_none`
/// is set and fail with [`CompareError::UnknownNodeKind`] otherwise.
pub fn resolve_node_kind<F>(record: &DiffStatusRecord, ignore_none: bool, probe: F) -> Result<NodeKind, CompareError>
where
    F: Fn(&str) -> Option<ResourceKind>,
{
    match record.node_kind {
        NodeKind::Dir | NodeKind::File | NodeKind::Symlink => Ok(record.node_kind),
        NodeKind::None | NodeKind::Unknown => match probe(&record.path_prev) {
            Some(ResourceKind::Folder) => Ok(NodeKind::Dir),
            Some(ResourceKind::File) => Ok(NodeKind::File),
            None if ignore_none => {
                debug!(path = %record.path_prev, "record without node kind and no item on disk");
                Ok(NodeKind::None)
            }
            None => Err(CompareError::UnknownNodeKind(format!(
                "{} ({:?})",
                record.path_prev, record.node_kind
            ))),
        },
    }
}

/// Local kind for a resolved node kind; symlinks compare as files.
pub fn resource_kind(kind: NodeKind) -> Option<ResourceKind> {
    match kind {
        NodeKind::Dir => Some(ResourceKind::Folder),
        NodeKind::File | NodeKind::Symlink => Some(ResourceKind::File),
        NodeKind::None | NodeKind::Unknown => None,
    }
}
