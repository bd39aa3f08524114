//! Difference kind bit-masks.
//!
//! The low two bits hold the change type, the next two the direction:
//! `LEFT` for local changes, `RIGHT` for incoming ones, both for a
//! conflict. `PSEUDO_CONFLICT` marks an item deleted on both sides.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::svn::EntryStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiffKind(u8);

impl DiffKind {
    pub const NO_CHANGE: DiffKind = DiffKind(0);
    pub const ADDITION: DiffKind = DiffKind(1);
    pub const DELETION: DiffKind = DiffKind(2);
    pub const CHANGE: DiffKind = DiffKind(3);
    pub const CHANGE_TYPE_MASK: DiffKind = DiffKind(3);
    pub const LEFT: DiffKind = DiffKind(4);
    pub const RIGHT: DiffKind = DiffKind(8);
    pub const CONFLICTING: DiffKind = DiffKind(12);
    pub const DIRECTION_MASK: DiffKind = DiffKind(12);
    pub const PSEUDO_CONFLICT: DiffKind = DiffKind(16);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> DiffKind {
        DiffKind(bits & 0x1f)
    }

    pub fn change_type(self) -> DiffKind {
        DiffKind(self.0 & Self::CHANGE_TYPE_MASK.0)
    }

    pub fn direction(self) -> DiffKind {
        DiffKind(self.0 & Self::DIRECTION_MASK.0)
    }

    pub fn is_no_change(self) -> bool {
        self.change_type() == Self::NO_CHANGE
    }

    pub fn is_conflicting(self) -> bool {
        self.direction() == Self::CONFLICTING
    }

    pub fn is_pseudo_conflict(self) -> bool {
        self.0 & Self::PSEUDO_CONFLICT.0 != 0
    }

    /// Tag a non-empty change with a direction; `NO_CHANGE` stays bare.
    pub fn towards(self, direction: DiffKind) -> DiffKind {
        if self.is_no_change() {
            self
        } else {
            self | direction
        }
    }

    /// Swap additions and deletions, for comparisons reported from the
    /// other side.
    pub fn invert_two_way(self) -> DiffKind {
        let rest = DiffKind(self.0 & !Self::CHANGE_TYPE_MASK.0);
        let change = match self.change_type() {
            Self::ADDITION => Self::DELETION,
            Self::DELETION => Self::ADDITION,
            other => other,
        };
        change | rest
    }

    /// Whether a property comparison makes sense for a node of this kind.
    pub fn allows_property_compare(self, three_way: bool) -> bool {
        if three_way && self.is_conflicting() {
            self.change_type() != Self::DELETION
        } else if three_way {
            self.change_type() == Self::CHANGE
        } else {
            !matches!(self.change_type(), Self::ADDITION | Self::DELETION)
        }
    }
}

impl BitOr for DiffKind {
    type Output = DiffKind;

    fn bitor(self, rhs: DiffKind) -> DiffKind {
        DiffKind(self.0 | rhs.0)
    }
}

impl BitOrAssign for DiffKind {
    fn bitor_assign(&mut self, rhs: DiffKind) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let change = match self.change_type() {
            Self::ADDITION => "addition",
            Self::DELETION => "deletion",
            Self::CHANGE => "change",
            _ => "no-change",
        };
        let direction = match self.direction() {
            Self::LEFT => "outgoing",
            Self::RIGHT => "incoming",
            Self::CONFLICTING => "conflicting",
            _ => "",
        };
        f.write_str(change)?;
        if !direction.is_empty() {
            write!(f, " {}", direction)?;
        }
        if self.is_pseudo_conflict() {
            f.write_str(" (both deleted)")?;
        }
        Ok(())
    }
}

/// Change type implied by a text/property status pair.
pub fn diff_kind(text: EntryStatus, prop: EntryStatus) -> DiffKind {
    match text {
        EntryStatus::Added | EntryStatus::Unversioned => DiffKind::ADDITION,
        EntryStatus::Deleted => DiffKind::DELETION,
        EntryStatus::Replaced | EntryStatus::Modified => DiffKind::CHANGE,
        _ if prop == EntryStatus::Modified => DiffKind::CHANGE,
        _ => DiffKind::NO_CHANGE,
    }
}

/// Merge the directional halves of a three-way difference. Deletion on
/// both sides is flagged as a pseudo conflict.
pub fn combine(left: DiffKind, right: DiffKind) -> DiffKind {
    let mut kind = left | right;
    if left.change_type() == DiffKind::DELETION && right.change_type() == DiffKind::DELETION {
        kind |= DiffKind::PSEUDO_CONFLICT;
    }
    kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_kind_table() {
        assert_eq!(diff_kind(EntryStatus::Added, EntryStatus::None), DiffKind::ADDITION);
        assert_eq!(diff_kind(EntryStatus::Unversioned, EntryStatus::None), DiffKind::ADDITION);
        assert_eq!(diff_kind(EntryStatus::Deleted, EntryStatus::Modified), DiffKind::DELETION);
        assert_eq!(diff_kind(EntryStatus::Replaced, EntryStatus::None), DiffKind::CHANGE);
        assert_eq!(diff_kind(EntryStatus::Modified, EntryStatus::None), DiffKind::CHANGE);
        assert_eq!(diff_kind(EntryStatus::Normal, EntryStatus::Modified), DiffKind::CHANGE);
        assert_eq!(diff_kind(EntryStatus::Normal, EntryStatus::Normal), DiffKind::NO_CHANGE);
        assert_eq!(diff_kind(EntryStatus::Conflicted, EntryStatus::None), DiffKind::NO_CHANGE);
    }

    #[test]
    fn test_combine_directions() {
        let left = DiffKind::CHANGE.towards(DiffKind::LEFT);
        let right = DiffKind::CHANGE.towards(DiffKind::RIGHT);
        let both = combine(left, right);
        assert!(both.is_conflicting());
        assert_eq!(both.change_type(), DiffKind::CHANGE);

        let only_right = combine(DiffKind::NO_CHANGE.towards(DiffKind::LEFT), right);
        assert_eq!(only_right, DiffKind::CHANGE | DiffKind::RIGHT);
    }

    #[test]
    fn test_combine_both_deleted() {
        let kind = combine(
            DiffKind::DELETION.towards(DiffKind::LEFT),
            DiffKind::DELETION.towards(DiffKind::RIGHT),
        );
        assert!(kind.is_pseudo_conflict());
        assert!(kind.is_conflicting());
        assert_eq!(kind.change_type(), DiffKind::DELETION);
    }

    #[test]
    fn test_invert_two_way() {
        assert_eq!(DiffKind::ADDITION.invert_two_way(), DiffKind::DELETION);
        assert_eq!(
            (DiffKind::DELETION | DiffKind::RIGHT).invert_two_way(),
            DiffKind::ADDITION | DiffKind::RIGHT
        );
        assert_eq!(DiffKind::CHANGE.invert_two_way(), DiffKind::CHANGE);
    }

    #[test]
    fn test_property_compare_gate() {
        assert!((DiffKind::CHANGE | DiffKind::LEFT).allows_property_compare(true));
        assert!(!(DiffKind::ADDITION | DiffKind::LEFT).allows_property_compare(true));
        assert!((DiffKind::ADDITION | DiffKind::CONFLICTING).allows_property_compare(true));
        assert!(!(DiffKind::DELETION | DiffKind::CONFLICTING).allows_property_compare(true));
        assert!(DiffKind::NO_CHANGE.allows_property_compare(false));
        assert!(!DiffKind::DELETION.allows_property_compare(false));
    }

    #[test]
    fn test_display() {
        assert_eq!((DiffKind::CHANGE | DiffKind::LEFT).to_string(), "change outgoing");
        assert_eq!(DiffKind::NO_CHANGE.to_string(), "no-change");
    }
}
