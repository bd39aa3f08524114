//! Built-in named filters.
//!
//! Every filter evaluates [`ResourceState::canonical`] so the informational
//! tags (`Merged`, `Incomplete`, `External`, `Unversioned`) behave like the
//! tag they fold onto.

use std::sync::LazyLock;

use super::StateFilter;
use crate::resource::{ChangeMask, LocalResource, ResourceState};

use ResourceState::*;

fn state(r: &LocalResource) -> ResourceState {
    r.state.canonical()
}

fn is_one_of(r: &LocalResource, states: &[ResourceState]) -> bool {
    states.contains(&state(r))
}

fn has(r: &LocalResource, mask: ChangeMask) -> bool {
    r.mask.contains(mask)
}

fn any(_: &LocalResource) -> bool {
    true
}

fn versioned_or_external(r: &LocalResource) -> bool {
    VERSIONED.accept(r) || UNVERSIONED_EXTERNAL.accept(r)
}

fn on_repository_or_external(r: &LocalResource) -> bool {
    ON_REPOSITORY.accept(r) || UNVERSIONED_EXTERNAL.accept(r)
}

/// Descend unless the item is an ignored non-external, obstructed or linked.
fn into_unversioned_trees(r: &LocalResource) -> bool {
    (!IGNORED.accept(r) || has(r, ChangeMask::SVN_EXTERNALS)) && !matches!(state(r), Obstructed | Linked)
}

// ---------------------------------------------------------------------------
// Existence
// ---------------------------------------------------------------------------

pub static ALL: LazyLock<StateFilter> = LazyLock::new(|| StateFilter::new("ALL", any, any));

pub static INTERNAL_INVALID: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::invalid_only("INTERNAL_INVALID"));

pub static NOT_EXISTS: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("NOT_EXISTS", |r| is_one_of(r, &[NotExists, Linked]), any));

pub static OBSTRUCTED: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("OBSTRUCTED", |r| state(r) == Obstructed, any));

pub static LINKED: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("LINKED", |r| state(r) == Linked, any));

pub static REPLACED: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("REPLACED", |r| state(r) == Replaced, versioned_or_external));

pub static PREREPLACED: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("PREREPLACED", |r| state(r) == Prereplaced, versioned_or_external));

pub static PREREPLACED_REPLACED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "PREREPLACED_REPLACED",
        |r| is_one_of(r, &[Prereplaced, Replaced]),
        versioned_or_external,
    )
});

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Global ignore patterns are applied when descriptors are built, so an
/// ignored item always carries the `Ignored` tag here.
pub static IGNORED: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("IGNORED", |r| state(r) == Ignored, any));

pub static IGNORED_NOT_FORBIDDEN: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "IGNORED_NOT_FORBIDDEN",
        |r| IGNORED.accept(r) && !has(r, ChangeMask::FORBIDDEN),
        any,
    )
});

pub static UNVERSIONED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "UNVERSIONED",
        |r| is_one_of(r, &[Prereplaced, New, Ignored, NotExists]),
        any,
    )
});

pub static UNVERSIONED_EXTERNAL: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "UNVERSIONED_EXTERNAL",
        |r| state(r) == Ignored && has(r, ChangeMask::SVN_EXTERNALS),
        |r| VERSIONED.accept(r),
    )
});

pub static VERSIONED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "VERSIONED",
        |r| match &r.tree_conflict {
            Some(tc) => tc.repository_exists() || tc.reason == crate::resource::ConflictReason::Added,
            None => is_one_of(
                r,
                &[Replaced, Prereplaced, Added, Normal, Modified, Conflicting, Deleted, Missing],
            ),
        },
        |r| VERSIONED.accept(r) || UNVERSIONED_EXTERNAL.accept(r),
    )
});

pub static NOT_ON_REPOSITORY: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "NOT_ON_REPOSITORY",
        |r| match &r.tree_conflict {
            Some(tc) => !tc.repository_exists(),
            None => is_one_of(r, &[Prereplaced, New, Ignored, NotExists, Added]),
        },
        any,
    )
});

pub static ON_REPOSITORY: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "ON_REPOSITORY",
        |r| match &r.tree_conflict {
            Some(tc) => tc.repository_exists(),
            None => is_one_of(r, &[Prereplaced, Replaced, Normal, Modified, Conflicting, Deleted, Missing]),
        },
        versioned_or_external,
    )
});

pub static NEW: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "NEW",
        |r| is_one_of(r, &[Prereplaced, New]) && !IGNORED.accept(r),
        |r| {
            (!IGNORED.accept(r) || has(r, ChangeMask::SVN_EXTERNALS))
                && !OBSTRUCTED.accept(r)
                && !LINKED.accept(r)
        },
    )
});

pub static ADDED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "ADDED",
        |r| is_one_of(r, &[Prereplaced, Replaced, New, Added]),
        versioned_or_external,
    )
});

// ---------------------------------------------------------------------------
// Modifications and conflicts
// ---------------------------------------------------------------------------

pub static NOT_MODIFIED: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("NOT_MODIFIED", |r| is_one_of(r, &[Normal, NotExists, Linked]), any));

pub static MODIFIED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "MODIFIED",
        |r| is_one_of(r, &[Modified, Conflicting]),
        on_repository_or_external,
    )
});

pub static CONFLICTING: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("CONFLICTING", |r| state(r) == Conflicting, on_repository_or_external));

pub static CONTENT_CONFLICTING: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "CONTENT_CONFLICTING",
        |r| r.text_state.canonical() == Conflicting,
        on_repository_or_external,
    )
});

pub static PROPERTIES_CONFLICTING: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "PROPERTIES_CONFLICTING",
        |r| r.prop_state == Conflicting,
        on_repository_or_external,
    )
});

pub static DATA_CONFLICTING: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "DATA_CONFLICTING",
        |r| state(r) == Conflicting && !r.has_tree_conflict(),
        on_repository_or_external,
    )
});

pub static TREE_CONFLICTING: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "TREE_CONFLICTING",
        |r| r.has_tree_conflict(),
        on_repository_or_external,
    )
});

pub static TREE_CONFLICTING_REPOSITORY_EXIST: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "TREE_CONFLICTING_REPOSITORY_EXIST",
        |r| r.tree_conflict.as_ref().is_some_and(|tc| tc.repository_exists()),
        |r| ON_REPOSITORY.accept(r),
    )
});

pub static DELETED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "DELETED",
        |r| is_one_of(r, &[Prereplaced, Replaced, Deleted, Missing]),
        on_repository_or_external,
    )
});

pub static MISSING: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("MISSING", |r| state(r) == Missing, on_repository_or_external));

// ---------------------------------------------------------------------------
// Operation filters
// ---------------------------------------------------------------------------

pub static COMMITABLE: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "COMMITABLE",
        |r| is_one_of(r, &[Replaced, Added, Modified, Deleted, Missing]),
        versioned_or_external,
    )
});

pub static REVERTABLE: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "REVERTABLE",
        |r| {
            is_one_of(r, &[Prereplaced, Conflicting, Replaced, Added, Modified, Deleted, Missing])
                || TREE_CONFLICTING.accept(r)
        },
        versioned_or_external,
    )
});

pub static REVERTABLE_OR_NEW: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "REVERTABLE_OR_NEW",
        |r| REVERTABLE.accept(r) || NEW.accept(r),
        |r| REVERTABLE.allows_recursion(r) || NEW.allows_recursion(r),
    )
});

pub static ANY_CHANGE: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "ANY_CHANGE",
        |r| !IGNORED.accept(r) && !matches!(state(r), Normal | Obstructed | Linked | NotExists),
        into_unversioned_trees,
    )
});

pub static EXCLUDE_DELETED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "EXCLUDE_DELETED",
        |r| ON_REPOSITORY.accept(r) && !matches!(state(r), Deleted | Missing),
        |r| EXCLUDE_DELETED.accept(r) || UNVERSIONED_EXTERNAL.accept(r),
    )
});

pub static MODIFIED_NOT_IGNORED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "MODIFIED_NOT_IGNORED",
        |r| !IGNORED.accept(r) && !NOT_MODIFIED.accept(r),
        into_unversioned_trees,
    )
});

pub static EXCLUDE_PREREPLACED_AND_DELETED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "EXCLUDE_PREREPLACED_AND_DELETED",
        |r| VERSIONED.accept(r) && !matches!(state(r), Prereplaced | Deleted | Missing),
        |r| EXCLUDE_DELETED.accept(r) || UNVERSIONED_EXTERNAL.accept(r),
    )
});

pub static EXCLUDE_PREREPLACED_AND_DELETED_FILES: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "EXCLUDE_PREREPLACED_AND_DELETED_FILES",
        |r| r.is_file() && EXCLUDE_PREREPLACED_AND_DELETED.accept(r),
        |r| EXCLUDE_DELETED.accept(r) || UNVERSIONED_EXTERNAL.accept(r),
    )
});

pub static VERSIONED_FOLDERS: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "VERSIONED_FOLDERS",
        |r| r.kind.is_container() && VERSIONED.accept(r),
        versioned_or_external,
    )
});

pub static VERSIONED_FILES: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "VERSIONED_FILES",
        |r| r.is_file() && VERSIONED.accept(r),
        versioned_or_external,
    )
});

pub static HAS_PROPERTIES_CHANGES: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "HAS_PROPERTIES_CHANGES",
        |r| matches!(r.prop_state, Modified | Conflicting),
        on_repository_or_external,
    )
});

pub static LOCKED: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "LOCKED",
        |r| has(r, ChangeMask::LOCKED),
        on_repository_or_external,
    )
});

pub static READY_TO_LOCK: LazyLock<StateFilter> = LazyLock::new(|| {
    StateFilter::new(
        "READY_TO_LOCK",
        |r| r.is_file() && !has(r, ChangeMask::LOCKED) && EXCLUDE_DELETED.accept(r),
        |r| EXCLUDE_DELETED.accept(r) || UNVERSIONED_EXTERNAL.accept(r),
    )
});

pub static SWITCHED: LazyLock<StateFilter> =
    LazyLock::new(|| StateFilter::new("SWITCHED", |r| has(r, ChangeMask::SWITCHED), any));

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

static REGISTRY: LazyLock<Vec<&'static LazyLock<StateFilter>>> = LazyLock::new(|| {
    vec![
        &ALL,
        &INTERNAL_INVALID,
        &NOT_EXISTS,
        &OBSTRUCTED,
        &LINKED,
        &REPLACED,
        &PREREPLACED,
        &PREREPLACED_REPLACED,
        &IGNORED,
        &IGNORED_NOT_FORBIDDEN,
        &UNVERSIONED,
        &UNVERSIONED_EXTERNAL,
        &VERSIONED,
        &NOT_ON_REPOSITORY,
        &ON_REPOSITORY,
        &NEW,
        &ADDED,
        &NOT_MODIFIED,
        &MODIFIED,
        &CONFLICTING,
        &CONTENT_CONFLICTING,
        &PROPERTIES_CONFLICTING,
        &DATA_CONFLICTING,
        &TREE_CONFLICTING,
        &TREE_CONFLICTING_REPOSITORY_EXIST,
        &DELETED,
        &MISSING,
        &COMMITABLE,
        &REVERTABLE,
        &REVERTABLE_OR_NEW,
        &ANY_CHANGE,
        &EXCLUDE_DELETED,
        &MODIFIED_NOT_IGNORED,
        &EXCLUDE_PREREPLACED_AND_DELETED,
        &EXCLUDE_PREREPLACED_AND_DELETED_FILES,
        &VERSIONED_FOLDERS,
        &VERSIONED_FILES,
        &HAS_PROPERTIES_CHANGES,
        &LOCKED,
        &READY_TO_LOCK,
        &SWITCHED,
    ]
});

/// Names of all built-in filters, in declaration order.
pub fn names() -> Vec<&'static str> {
    REGISTRY.iter().map(|f| f.name()).collect()
}

/// Case-insensitive lookup of a built-in filter; `-` and `_` are
/// interchangeable.
pub fn by_name(name: &str) -> Option<StateFilter> {
    let wanted = name.trim().replace('-', "_");
    REGISTRY
        .iter()
        .find(|f| f.name().eq_ignore_ascii_case(&wanted))
        .map(|f| StateFilter::clone(f))
}
