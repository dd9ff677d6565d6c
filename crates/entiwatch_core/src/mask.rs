//! Change categories and category masks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr};

/// Category of a change within a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Object was created by the transaction.
    Inserted,
    /// Object existed before the transaction and was modified.
    Updated,
    /// Object was removed by the transaction.
    Deleted,
}

impl ChangeKind {
    /// All kinds, in dispatch order.
    pub const ALL: [ChangeKind; 3] = [
        ChangeKind::Inserted,
        ChangeKind::Updated,
        ChangeKind::Deleted,
    ];

    /// Returns the mask bit for this kind.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            Self::Inserted => 0b001,
            Self::Updated => 0b010,
            Self::Deleted => 0b100,
        }
    }

    /// Single-letter tag used in trace output.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Inserted => 'I',
            Self::Updated => 'U',
            Self::Deleted => 'D',
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// A set of change categories.
///
/// Serialized as a list of kinds, e.g. `["inserted", "deleted"]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<ChangeKind>", into = "Vec<ChangeKind>")]
pub struct ChangeMask(u8);

impl ChangeMask {
    /// No categories.
    pub const NONE: ChangeMask = ChangeMask(0);
    /// Inserted objects only.
    pub const INSERTED: ChangeMask = ChangeMask(ChangeKind::Inserted.bit());
    /// Updated objects only.
    pub const UPDATED: ChangeMask = ChangeMask(ChangeKind::Updated.bit());
    /// Deleted objects only.
    pub const DELETED: ChangeMask = ChangeMask(ChangeKind::Deleted.bit());
    /// Every category.
    pub const ALL: ChangeMask = ChangeMask(0b111);

    /// Creates a mask from raw bits. Unknown bits are dropped.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if `kind` is in the mask.
    #[must_use]
    pub const fn contains(self, kind: ChangeKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns true if no category is selected.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns the categories in either mask.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the categories in both masks.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Returns a copy with `kind` added.
    #[must_use]
    pub const fn with(self, kind: ChangeKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Returns a copy with `kind` removed.
    #[must_use]
    pub const fn without(self, kind: ChangeKind) -> Self {
        Self(self.0 & !kind.bit())
    }

    /// Iterates the selected kinds in dispatch order.
    pub fn kinds(self) -> impl Iterator<Item = ChangeKind> {
        ChangeKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl Default for ChangeMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<ChangeKind> for ChangeMask {
    fn from(kind: ChangeKind) -> Self {
        Self(kind.bit())
    }
}

impl From<Vec<ChangeKind>> for ChangeMask {
    fn from(kinds: Vec<ChangeKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<ChangeMask> for Vec<ChangeKind> {
    fn from(mask: ChangeMask) -> Self {
        mask.kinds().collect()
    }
}

impl FromIterator<ChangeKind> for ChangeMask {
    fn from_iter<I: IntoIterator<Item = ChangeKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl BitOr for ChangeMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOr<ChangeKind> for ChangeMask {
    type Output = Self;

    fn bitor(self, rhs: ChangeKind) -> Self {
        self.with(rhs)
    }
}

impl BitAnd for ChangeMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl fmt::Debug for ChangeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}
