//! Presence checks and subtree collection driven by a filter.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ResourcePredicate, StateFilter};
use crate::monitor::ProgressMonitor;
use crate::resource::{LocalResource, ResourceKind, ResourceState};

/// Source of resource descriptors and folder membership.
pub trait ResourceProvider {
    /// Descriptor of `path`. Items the provider knows nothing about come
    /// back as [`ResourceState::NotExists`].
    fn local_resource(&self, path: &Path) -> LocalResource;

    /// Direct members of a folder, sorted by name.
    fn members(&self, path: &Path) -> Vec<PathBuf>;

    /// Whether `path` belongs to a working copy this provider manages.
    fn is_supervised(&self, path: &Path) -> bool;

    /// Like [`local_resource`](Self::local_resource), but unresolved items
    /// take `kind` instead of the provider's guess.
    fn local_resource_of_kind(&self, path: &Path, kind: ResourceKind) -> LocalResource {
        let mut resource = self.local_resource(path);
        if matches!(resource.state, ResourceState::NotExists | ResourceState::InternalInvalid) {
            resource.kind = kind;
        }
        resource
    }
}

/// How far below the given roots a presence check looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceDepth {
    /// The roots only.
    Empty,
    /// The roots and their direct members.
    Immediates,
    /// The whole subtrees.
    Infinity,
}

impl PresenceDepth {
    fn below(self) -> PresenceDepth {
        match self {
            PresenceDepth::Immediates => PresenceDepth::Empty,
            other => other,
        }
    }
}

/// Whether any supervised item among `roots`, or below them down to
/// `depth`, is accepted by `predicate`.
///
/// All roots are tested before any of them is expanded, and a folder is
/// only expanded when the predicate allows recursion into it. Stops early
/// (returning `false`) when the monitor is cancelled.
pub fn check_for_resources_presence<P, F>(
    provider: &P,
    roots: &[PathBuf],
    predicate: &mut F,
    depth: PresenceDepth,
    monitor: &dyn ProgressMonitor,
) -> bool
where
    P: ResourceProvider + ?Sized,
    F: ResourcePredicate + ?Sized,
{
    let mut expand = Vec::new();
    for root in roots {
        if monitor.is_cancelled() {
            return false;
        }
        if !provider.is_supervised(root) {
            continue;
        }
        let local = provider.local_resource(root);
        if predicate.matches(&local) {
            return true;
        }
        if local.kind.is_container() && depth != PresenceDepth::Empty && predicate.descends(&local) {
            expand.push(root);
        }
    }

    for folder in expand {
        if monitor.is_cancelled() {
            debug!("presence check cancelled");
            return false;
        }
        let members = provider.members(folder);
        if check_for_resources_presence(provider, &members, predicate, depth.below(), monitor) {
            return true;
        }
    }
    false
}

/// Every item at or below `roots` accepted by `predicate`, in pre-order.
/// Folders are entered only when the predicate allows recursion.
pub fn resources_recursive<P, F>(
    provider: &P,
    roots: &[PathBuf],
    predicate: &mut F,
    depth: PresenceDepth,
    monitor: &dyn ProgressMonitor,
) -> Vec<LocalResource>
where
    P: ResourceProvider + ?Sized,
    F: ResourcePredicate + ?Sized,
{
    let mut found = Vec::new();
    collect(provider, roots, predicate, depth, monitor, &mut found);
    found
}

fn collect<P, F>(
    provider: &P,
    roots: &[PathBuf],
    predicate: &mut F,
    depth: PresenceDepth,
    monitor: &dyn ProgressMonitor,
    found: &mut Vec<LocalResource>,
) where
    P: ResourceProvider + ?Sized,
    F: ResourcePredicate + ?Sized,
{
    for root in roots {
        if monitor.is_cancelled() {
            return;
        }
        let local = provider.local_resource(root);
        let accepted = predicate.matches(&local);
        let descend = local.kind.is_container() && depth != PresenceDepth::Empty && predicate.descends(&local);
        if accepted {
            found.push(local);
        }
        if descend {
            let members = provider.members(root);
            collect(provider, &members, predicate, depth.below(), monitor, found);
        }
    }
}

/// The subset of `paths` whose own descriptor `filter` accepts.
pub fn filter_resources<P>(provider: &P, paths: &[PathBuf], filter: &StateFilter) -> Vec<PathBuf>
where
    P: ResourceProvider + ?Sized,
{
    paths
        .iter()
        .filter(|p| filter.accept(&provider.local_resource(p)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::filter::builtin::{ALL, MODIFIED, VERSIONED};
    use crate::monitor::{CancelFlag, NullMonitor};
    use crate::resource::ChangeMask;

    struct Tree(BTreeMap<PathBuf, LocalResource>);

    impl Tree {
        fn new(items: &[(&str, ResourceKind, ResourceState)]) -> Self {
            Tree(
                items
                    .iter()
                    .map(|(p, k, s)| (PathBuf::from(p), LocalResource::from_state(*p, *k, *s, ChangeMask::NONE)))
                    .collect(),
            )
        }
    }

    impl ResourceProvider for Tree {
        fn local_resource(&self, path: &Path) -> LocalResource {
            self.0
                .get(path)
                .cloned()
                .unwrap_or_else(|| LocalResource::unversioned(path, ResourceKind::File))
        }

        fn members(&self, path: &Path) -> Vec<PathBuf> {
            self.0.keys().filter(|p| p.parent() == Some(path)).cloned().collect()
        }

        fn is_supervised(&self, path: &Path) -> bool {
            path.starts_with("/wc")
        }
    }

    use ResourceKind::{File, Folder};
    use ResourceState::{Ignored, Modified, New, Normal};

    fn sample() -> Tree {
        Tree::new(&[
            ("/wc", Folder, Normal),
            ("/wc/a.txt", File, Normal),
            ("/wc/sub", Folder, Normal),
            ("/wc/sub/deep", Folder, Normal),
            ("/wc/sub/deep/b.txt", File, Modified),
            ("/wc/tmp", Folder, New),
            ("/wc/tmp/c.txt", File, Modified),
        ])
    }

    #[test]
    fn test_depth_limits_presence() {
        let tree = sample();
        let roots = vec![PathBuf::from("/wc")];
        let mut modified = MODIFIED.clone();
        assert!(!check_for_resources_presence(&tree, &roots, &mut modified, PresenceDepth::Empty, &NullMonitor));
        assert!(!check_for_resources_presence(&tree, &roots, &mut modified, PresenceDepth::Immediates, &NullMonitor));
        assert!(check_for_resources_presence(&tree, &roots, &mut modified, PresenceDepth::Infinity, &NullMonitor));
    }

    #[test]
    fn test_recursion_gate_blocks_unversioned_subtree() {
        let tree = Tree::new(&[
            ("/wc", Folder, Normal),
            ("/wc/tmp", Folder, New),
            ("/wc/tmp/c.txt", File, Modified),
        ]);
        let mut modified = MODIFIED.clone();
        let roots = vec![PathBuf::from("/wc")];
        assert!(!check_for_resources_presence(&tree, &roots, &mut modified, PresenceDepth::Infinity, &NullMonitor));
    }

    #[test]
    fn test_rejected_folder_still_expanded_when_recursion_allowed() {
        let tree = Tree::new(&[
            ("/wc", Folder, Ignored),
            ("/wc/ext", Folder, Normal),
        ]);
        let mut tree_ext = tree;
        if let Some(root) = tree_ext.0.get_mut(Path::new("/wc")) {
            root.mask = ChangeMask::SVN_EXTERNALS;
        }
        let roots = vec![PathBuf::from("/wc")];
        let mut versioned = VERSIONED.clone();
        assert!(!versioned.accept(&tree_ext.local_resource(Path::new("/wc"))));
        assert!(check_for_resources_presence(&tree_ext, &roots, &mut versioned, PresenceDepth::Infinity, &NullMonitor));
    }

    #[test]
    fn test_unsupervised_roots_skipped() {
        let tree = sample();
        let mut all = ALL.clone();
        let roots = vec![PathBuf::from("/elsewhere/x")];
        assert!(!check_for_resources_presence(&tree, &roots, &mut all, PresenceDepth::Infinity, &NullMonitor));
    }

    #[test]
    fn test_cancelled_check_returns_false() {
        let tree = sample();
        let flag = CancelFlag::new();
        flag.cancel();
        let mut all = ALL.clone();
        let roots = vec![PathBuf::from("/wc")];
        assert!(!check_for_resources_presence(&tree, &roots, &mut all, PresenceDepth::Infinity, &flag));
    }

    #[test]
    fn test_resources_recursive_pre_order() {
        let tree = sample();
        let mut modified_or_folder = MODIFIED.or(&VERSIONED.and(&crate::filter::builtin::VERSIONED_FOLDERS));
        let found = resources_recursive(
            &tree,
            &[PathBuf::from("/wc")],
            &mut modified_or_folder,
            PresenceDepth::Infinity,
            &NullMonitor,
        );
        let paths: Vec<_> = found.iter().map(|r| r.path.to_string_lossy().into_owned()).collect();
        assert_eq!(paths, vec!["/wc", "/wc/sub", "/wc/sub/deep", "/wc/sub/deep/b.txt"]);
    }

    #[test]
    fn test_filter_resources() {
        let tree = sample();
        let paths = vec![
            PathBuf::from("/wc/a.txt"),
            PathBuf::from("/wc/sub/deep/b.txt"),
            PathBuf::from("/wc/tmp/c.txt"),
        ];
        let modified = filter_resources(&tree, &paths, &MODIFIED);
        assert_eq!(modified, vec![PathBuf::from("/wc/sub/deep/b.txt"), PathBuf::from("/wc/tmp/c.txt")]);
    }
}
