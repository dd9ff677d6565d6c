//! Per-transaction change sets.
//!
//! A [`ChangeSet`] is the three-way partition (inserted, updated, deleted) of
//! the objects touched by one committed transaction. The persistence layer
//! builds it once per commit through [`ChangeSetBuilder`], which enforces that
//! the three sets are disjoint and duplicate-free. Once built it is never
//! mutated; it is shared as `Arc<ChangeSet>` by the notification center.
//!
//! # Usage
//!
//! ```rust,ignore
//! use entiwatch_core::{ChangeSet, SequenceNumber};
//!
//! let changes = ChangeSet::builder(SequenceNumber::new(1))
//!     .insert(order.clone())
//!     .update(customer.clone(), ["name", "email"])
//!     .delete(stale_cart.clone())
//!     .build()?;
//! ```

use crate::error::{WatchError, WatchResult};
use crate::mask::{ChangeKind, ChangeMask};
use crate::object::{ObjectId, ObjectRef};
use crate::types::SequenceNumber;
use std::collections::HashMap;

/// An updated object together with the attribute keys that changed.
#[derive(Debug, Clone)]
pub struct UpdatedObject {
    object: ObjectRef,
    changed_keys: Vec<String>,
}

impl UpdatedObject {
    /// Creates an updated entry. Repeated keys are collapsed, first occurrence wins.
    pub fn new<I, S>(object: ObjectRef, changed_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = Vec::new();
        for key in changed_keys {
            let key = key.into();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Self {
            object,
            changed_keys: keys,
        }
    }

    /// Returns the updated object.
    #[must_use]
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Returns the changed attribute keys, in the order the persistence layer
    /// reported them.
    #[must_use]
    pub fn changed_keys(&self) -> &[String] {
        &self.changed_keys
    }
}

/// The objects touched by one committed transaction.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    sequence: SequenceNumber,
    inserted: Vec<ObjectRef>,
    updated: Vec<UpdatedObject>,
    deleted: Vec<ObjectRef>,
}

impl ChangeSet {
    /// Starts building a change set for the given commit.
    #[must_use]
    pub fn builder(sequence: SequenceNumber) -> ChangeSetBuilder {
        ChangeSetBuilder::new(sequence)
    }

    /// Creates a change set with no objects.
    #[must_use]
    pub fn empty(sequence: SequenceNumber) -> Self {
        Self {
            sequence,
            ..Self::default()
        }
    }

    /// Returns the commit sequence number.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Returns the inserted objects.
    #[must_use]
    pub fn inserted(&self) -> &[ObjectRef] {
        &self.inserted
    }

    /// Returns the updated objects with their changed keys.
    #[must_use]
    pub fn updated(&self) -> &[UpdatedObject] {
        &self.updated
    }

    /// Returns the deleted objects.
    #[must_use]
    pub fn deleted(&self) -> &[ObjectRef] {
        &self.deleted
    }

    /// Returns the updated objects without their keys.
    #[must_use]
    pub fn updated_objects(&self) -> Vec<ObjectRef> {
        self.updated.iter().map(|u| u.object.clone()).collect()
    }

    /// Returns the number of objects in the given category.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        match kind {
            ChangeKind::Inserted => self.inserted.len(),
            ChangeKind::Updated => self.updated.len(),
            ChangeKind::Deleted => self.deleted.len(),
        }
    }

    /// Returns the total number of objects across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    /// Returns true if no object was touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the categories that contain at least one object.
    #[must_use]
    pub fn kinds(&self) -> ChangeMask {
        ChangeKind::ALL
            .into_iter()
            .filter(|k| self.count(*k) > 0)
            .collect()
    }

    /// Returns the category the given object appears in.
    #[must_use]
    pub fn kind_of(&self, id: ObjectId) -> Option<ChangeKind> {
        if self.inserted.iter().any(|o| o.object_id() == id) {
            Some(ChangeKind::Inserted)
        } else if self.updated.iter().any(|u| u.object.object_id() == id) {
            Some(ChangeKind::Updated)
        } else if self.deleted.iter().any(|o| o.object_id() == id) {
            Some(ChangeKind::Deleted)
        } else {
            None
        }
    }

    /// Returns the changed keys for an updated object.
    #[must_use]
    pub fn changed_keys(&self, id: ObjectId) -> Option<&[String]> {
        self.updated
            .iter()
            .find(|u| u.object.object_id() == id)
            .map(UpdatedObject::changed_keys)
    }

    /// Returns a copy in which categories outside `mask` are empty.
    ///
    /// Object references are shared with `self`.
    #[must_use]
    pub fn restrict(&self, mask: ChangeMask) -> ChangeSet {
        ChangeSet {
            sequence: self.sequence,
            inserted: if mask.contains(ChangeKind::Inserted) {
                self.inserted.clone()
            } else {
                Vec::new()
            },
            updated: if mask.contains(ChangeKind::Updated) {
                self.updated.clone()
            } else {
                Vec::new()
            },
            deleted: if mask.contains(ChangeKind::Deleted) {
                self.deleted.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Builder for [`ChangeSet`].
#[derive(Debug)]
pub struct ChangeSetBuilder {
    sequence: SequenceNumber,
    inserted: Vec<ObjectRef>,
    updated: Vec<UpdatedObject>,
    deleted: Vec<ObjectRef>,
}

impl ChangeSetBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(sequence: SequenceNumber) -> Self {
        Self {
            sequence,
            inserted: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Adds an inserted object.
    #[must_use]
    pub fn insert(mut self, object: ObjectRef) -> Self {
        self.inserted.push(object);
        self
    }

    /// Adds an updated object with its changed keys.
    #[must_use]
    pub fn update<I, S>(mut self, object: ObjectRef, changed_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.updated.push(UpdatedObject::new(object, changed_keys));
        self
    }

    /// Adds a deleted object.
    #[must_use]
    pub fn delete(mut self, object: ObjectRef) -> Self {
        self.deleted.push(object);
        self
    }

    /// Validates and builds the change set.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateObject` if an object appears twice in one category
    /// and `OverlappingChange` if it appears in two categories.
    pub fn build(self) -> WatchResult<ChangeSet> {
        let mut seen: HashMap<ObjectId, ChangeKind> = HashMap::with_capacity(
            self.inserted.len() + self.updated.len() + self.deleted.len(),
        );
        let ids = self
            .inserted
            .iter()
            .map(|o| (o.object_id(), ChangeKind::Inserted))
            .chain(
                self.updated
                    .iter()
                    .map(|u| (u.object.object_id(), ChangeKind::Updated)),
            )
            .chain(
                self.deleted
                    .iter()
                    .map(|o| (o.object_id(), ChangeKind::Deleted)),
            );

        for (id, kind) in ids {
            if let Some(previous) = seen.insert(id, kind) {
                return Err(if previous == kind {
                    WatchError::duplicate_object(id, kind)
                } else {
                    WatchError::overlapping_change(id)
                });
            }
        }

        Ok(ChangeSet {
            sequence: self.sequence,
            inserted: self.inserted,
            updated: self.updated,
            deleted: self.deleted,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::object;
    use super::*;

    #[test]
    fn builder_partitions_objects() {
        let a = object("Order");
        let b = object("Order");
        let c = object("Customer");

        let changes = ChangeSet::builder(SequenceNumber::new(9))
            .insert(a.clone())
            .update(b.clone(), ["status"])
            .delete(c.clone())
            .build()
            .unwrap();

        assert_eq!(changes.sequence(), SequenceNumber::new(9));
        assert_eq!(changes.len(), 3);
        assert_eq!(changes.kind_of(a.object_id()), Some(ChangeKind::Inserted));
        assert_eq!(changes.kind_of(b.object_id()), Some(ChangeKind::Updated));
        assert_eq!(changes.kind_of(c.object_id()), Some(ChangeKind::Deleted));
        assert_eq!(
            changes.changed_keys(b.object_id()),
            Some(&["status".to_string()][..])
        );
        assert_eq!(changes.kind_of(ObjectId::new()), None);
    }

    #[test]
    fn overlapping_categories_rejected() {
        let a = object("Order");
        let err = ChangeSet::builder(SequenceNumber::new(1))
            .insert(a.clone())
            .delete(a.clone())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            WatchError::OverlappingChange { object_id } if object_id == a.object_id()
        ));
    }

    #[test]
    fn duplicates_rejected() {
        let a = object("Order");
        let err = ChangeSet::builder(SequenceNumber::new(1))
            .update(a.clone(), ["x"])
            .update(a.clone(), ["y"])
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            WatchError::DuplicateObject {
                kind: ChangeKind::Updated,
                ..
            }
        ));
    }

    #[test]
    fn repeated_keys_collapse() {
        let a = object("Order");
        let entry = UpdatedObject::new(a, ["name", "age", "name"]);
        assert_eq!(entry.changed_keys(), &["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn restrict_empties_masked_categories() {
        let changes = ChangeSet::builder(SequenceNumber::new(2))
            .insert(object("A"))
            .update(object("B"), ["k"])
            .delete(object("C"))
            .build()
            .unwrap();

        let scoped = changes.restrict(ChangeMask::UPDATED);
        assert!(scoped.inserted().is_empty());
        assert_eq!(scoped.updated().len(), 1);
        assert!(scoped.deleted().is_empty());
        assert_eq!(scoped.kinds(), ChangeMask::UPDATED);
        assert_eq!(scoped.sequence(), changes.sequence());

        // source untouched
        assert_eq!(changes.kinds(), ChangeMask::ALL);
    }

    #[test]
    fn empty_change_set() {
        let changes = ChangeSet::empty(SequenceNumber::new(3));
        assert!(changes.is_empty());
        assert!(changes.kinds().is_empty());
        assert!(changes.updated_objects().is_empty());
    }
}
