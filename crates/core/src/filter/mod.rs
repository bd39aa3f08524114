//! State filter engine.
//!
//! A [`StateFilter`] pairs two predicates over a [`LocalResource`]:
//! `accept` decides whether the item itself qualifies for an operation and
//! `allows_recursion` decides whether its members may contain qualifying
//! items. The two are independent: an unversioned folder is not itself
//! "versioned" but an external below it can be, so `VERSIONED` still
//! descends into it.
//!
//! Filters are cheap to clone and carry a stable [`FilterId`] used as the
//! cache key by [`manager::FilterManager`].

pub mod builtin;
pub mod manager;
pub mod presence;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::resource::{ChangeMask, LocalResource, ResourceKind, ResourceState};

pub use manager::{FilterManager, FilterStats, ResourceStatesChanged};
pub use presence::{
    check_for_resources_presence, filter_resources, resources_recursive, PresenceDepth, ResourceProvider,
};

/// Predicate over a resolved resource descriptor.
pub type ResourceTest = Arc<dyn Fn(&LocalResource) -> bool + Send + Sync>;

/// Stable identity of a filter, used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

impl FilterId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        FilterId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything the presence walk can evaluate: a single filter, or a stateful
/// probe evaluating several filters at once.
pub trait ResourcePredicate {
    fn matches(&mut self, resource: &LocalResource) -> bool;
    fn descends(&mut self, resource: &LocalResource) -> bool;
}

/// A named accept/recursion predicate pair.
#[derive(Clone)]
pub struct StateFilter {
    id: FilterId,
    name: Arc<str>,
    accept: ResourceTest,
    recursion: ResourceTest,
    accepts_invalid: bool,
}

impl StateFilter {
    pub fn new<A, R>(name: impl Into<String>, accept: A, recursion: R) -> Self
    where
        A: Fn(&LocalResource) -> bool + Send + Sync + 'static,
        R: Fn(&LocalResource) -> bool + Send + Sync + 'static,
    {
        Self {
            id: FilterId::next(),
            name: Arc::from(name.into()),
            accept: Arc::new(accept),
            recursion: Arc::new(recursion),
            accepts_invalid: false,
        }
    }

    /// The one filter that sees [`ResourceState::InternalInvalid`] items.
    pub(crate) fn invalid_only(name: impl Into<String>) -> Self {
        let mut filter = Self::new(
            name,
            |r: &LocalResource| r.state == ResourceState::InternalInvalid,
            |_: &LocalResource| false,
        );
        filter.accepts_invalid = true;
        filter
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accept(&self, resource: &LocalResource) -> bool {
        if resource.state == ResourceState::InternalInvalid && !self.accepts_invalid {
            return false;
        }
        (self.accept)(resource)
    }

    /// `None` descriptors are evaluated as non-existent items.
    pub fn accept_opt(&self, resource: Option<&LocalResource>) -> bool {
        match resource {
            Some(resource) => self.accept(resource),
            None => self.accept(&missing_descriptor()),
        }
    }

    pub fn accept_state(&self, path: &Path, kind: ResourceKind, state: ResourceState, mask: ChangeMask) -> bool {
        self.accept(&LocalResource::from_state(path, kind, state, mask))
    }

    pub fn allows_recursion(&self, resource: &LocalResource) -> bool {
        if resource.state == ResourceState::InternalInvalid {
            return false;
        }
        (self.recursion)(resource)
    }

    pub fn allows_recursion_opt(&self, resource: Option<&LocalResource>) -> bool {
        match resource {
            Some(resource) => self.allows_recursion(resource),
            None => self.allows_recursion(&missing_descriptor()),
        }
    }

    pub fn allows_recursion_state(
        &self,
        path: &Path,
        kind: ResourceKind,
        state: ResourceState,
        mask: ChangeMask,
    ) -> bool {
        self.allows_recursion(&LocalResource::from_state(path, kind, state, mask))
    }

    /// Accepted by both; recursion allowed by both.
    pub fn and(&self, other: &StateFilter) -> StateFilter {
        let (a, b) = (self.clone(), other.clone());
        let (ra, rb) = (self.clone(), other.clone());
        StateFilter::new(
            format!("{}&{}", self.name, other.name),
            move |r: &LocalResource| a.accept(r) && b.accept(r),
            move |r: &LocalResource| ra.allows_recursion(r) && rb.allows_recursion(r),
        )
    }

    /// Accepted by either; recursion allowed by either.
    pub fn or(&self, other: &StateFilter) -> StateFilter {
        let (a, b) = (self.clone(), other.clone());
        let (ra, rb) = (self.clone(), other.clone());
        StateFilter::new(
            format!("{}|{}", self.name, other.name),
            move |r: &LocalResource| a.accept(r) || b.accept(r),
            move |r: &LocalResource| ra.allows_recursion(r) || rb.allows_recursion(r),
        )
    }

    /// Complement of `accept`. Recursion is always allowed, since a
    /// rejected parent says nothing about its members.
    pub fn not(&self) -> StateFilter {
        let inner = self.clone();
        StateFilter::new(
            format!("!{}", self.name),
            move |r: &LocalResource| !inner.accept(r),
            |_: &LocalResource| true,
        )
    }
}

fn missing_descriptor() -> LocalResource {
    LocalResource::unversioned(std::path::PathBuf::new(), ResourceKind::File)
}

impl ResourcePredicate for StateFilter {
    fn matches(&mut self, resource: &LocalResource) -> bool {
        self.accept(resource)
    }

    fn descends(&mut self, resource: &LocalResource) -> bool {
        self.allows_recursion(resource)
    }
}

impl fmt::Debug for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateFilter")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl PartialEq for StateFilter {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StateFilter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(state: ResourceState) -> LocalResource {
        LocalResource::from_state("/wc/dir", ResourceKind::Folder, state, ChangeMask::NONE)
    }

    #[test]
    fn test_ids_are_unique_and_stable_across_clones() {
        let a = StateFilter::new("a", |_: &LocalResource| true, |_: &LocalResource| true);
        let b = StateFilter::new("a", |_: &LocalResource| true, |_: &LocalResource| true);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_invalid_descriptors_rejected() {
        let all = StateFilter::new("all", |_: &LocalResource| true, |_: &LocalResource| true);
        let invalid = folder(ResourceState::InternalInvalid);
        assert!(!all.accept(&invalid));
        assert!(!all.allows_recursion(&invalid));
        assert!(!all.not().accept(&invalid));

        let only = StateFilter::invalid_only("internal_invalid");
        assert!(only.accept(&invalid));
        assert!(!only.allows_recursion(&invalid));
        assert!(!only.accept(&folder(ResourceState::Normal)));
    }

    #[test]
    fn test_none_descriptor_is_not_exists() {
        let not_exists = StateFilter::new(
            "not_exists",
            |r: &LocalResource| r.state == ResourceState::NotExists,
            |_: &LocalResource| true,
        );
        assert!(not_exists.accept_opt(None));
        assert!(not_exists.allows_recursion_opt(None));
    }

    #[test]
    fn test_combinators() {
        let added = StateFilter::new(
            "added",
            |r: &LocalResource| r.state == ResourceState::Added,
            |r: &LocalResource| r.state != ResourceState::Ignored,
        );
        let folders = StateFilter::new(
            "folders",
            |r: &LocalResource| r.kind == ResourceKind::Folder,
            |_: &LocalResource| false,
        );
        let both = added.and(&folders);
        let either = added.or(&folders);
        let neither = added.not();

        assert!(both.accept(&folder(ResourceState::Added)));
        assert!(!both.accept(&folder(ResourceState::Normal)));
        assert!(!both.allows_recursion(&folder(ResourceState::Added)));

        assert!(either.accept(&folder(ResourceState::Normal)));
        assert!(either.allows_recursion(&folder(ResourceState::Normal)));

        assert!(neither.accept(&folder(ResourceState::Normal)));
        assert!(!neither.accept(&folder(ResourceState::Added)));
        assert!(neither.allows_recursion(&folder(ResourceState::Ignored)));
        assert_eq!(both.name(), "added&folders");
    }

    #[test]
    fn test_accept_state_builds_descriptor() {
        let locked = StateFilter::new(
            "locked",
            |r: &LocalResource| r.mask.contains(ChangeMask::LOCKED),
            |_: &LocalResource| true,
        );
        let path = Path::new("/wc/a.txt");
        assert!(locked.accept_state(path, ResourceKind::File, ResourceState::Normal, ChangeMask::LOCKED));
        assert!(!locked.accept_state(path, ResourceKind::File, ResourceState::Normal, ChangeMask::NONE));
        assert!(locked.allows_recursion_state(path, ResourceKind::File, ResourceState::Normal, ChangeMask::NONE));
    }
}
