//! In-memory object store that publishes one change set per commit.
//!
//! [`MemoryStore`] stands in for a persistence layer: writes are staged in a
//! [`StoreTransaction`] and applied atomically on commit, after which the
//! resulting [`ChangeSet`] is posted to the store's [`NotificationCenter`]
//! under the store's [`ContextId`].

use entiwatch_core::{
    ChangeSet, ContextId, NotificationCenter, ObjectId, ObjectRef, SequenceNumber, TrackedObject,
    Value, WatchError,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by [`MemoryStore`] transactions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object is not in the store.
    #[error("object not found: {id}")]
    ObjectNotFound {
        /// The missing object.
        id: ObjectId,
    },

    /// An object with this identity already exists.
    #[error("object already exists: {id}")]
    ObjectExists {
        /// The duplicate identity.
        id: ObjectId,
    },

    /// The object was deleted earlier in the same transaction.
    #[error("object deleted in this transaction: {id}")]
    ObjectDeleted {
        /// The deleted object.
        id: ObjectId,
    },

    /// The committed change set was rejected.
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// A tracked object held by a [`MemoryStore`].
///
/// Attributes are mutable behind a lock so observers always read the
/// committed state.
pub struct MemoryObject {
    id: ObjectId,
    type_name: String,
    attributes: RwLock<BTreeMap<String, Value>>,
    ignored_keys: Vec<String>,
}

impl MemoryObject {
    /// Creates an object with a fresh identity and no attributes.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            id: ObjectId::new(),
            type_name: type_name.into(),
            attributes: RwLock::new(BTreeMap::new()),
            ignored_keys: Vec::new(),
        }
    }

    /// Uses a specific identity.
    #[must_use]
    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = id;
        self
    }

    /// Sets an attribute.
    #[must_use]
    pub fn with_attribute(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.write().insert(key.into(), value.into());
        self
    }

    /// Sets the keys whose changes this object never reports.
    #[must_use]
    pub fn with_ignored_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Wraps the object as a shared [`ObjectRef`].
    #[must_use]
    pub fn into_ref(self) -> ObjectRef {
        Arc::new(self)
    }

    /// Returns a copy of every attribute.
    #[must_use]
    pub fn attributes(&self) -> BTreeMap<String, Value> {
        self.attributes.read().clone()
    }

    /// Returns the keys of `values` that differ from the current attributes.
    fn diff(&self, values: &BTreeMap<String, Value>) -> Vec<String> {
        let attributes = self.attributes.read();
        values
            .iter()
            .filter(|(key, value)| attributes.get(key.as_str()) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Writes `values` into the attributes.
    fn apply(&self, values: BTreeMap<String, Value>) {
        self.attributes.write().extend(values);
    }
}

impl TrackedObject for MemoryObject {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn attribute(&self, key: &str) -> Option<Value> {
        self.attributes.read().get(key).cloned()
    }

    fn ignored_keys(&self) -> &[String] {
        &self.ignored_keys
    }
}

impl fmt::Debug for MemoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryObject")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("attributes", &*self.attributes.read())
            .finish()
    }
}

/// A write staged in a transaction.
#[derive(Debug)]
enum PendingWrite {
    Insert(Arc<MemoryObject>),
    Update {
        values: BTreeMap<String, Value>,
        touched: bool,
    },
    Delete,
}

/// An in-memory object store bound to one context.
pub struct MemoryStore {
    context: ContextId,
    center: Arc<NotificationCenter>,
    objects: RwLock<HashMap<ObjectId, Arc<MemoryObject>>>,
    committed_seq: AtomicU64,
}

impl MemoryStore {
    /// Creates a store with a fresh context posting to `center`.
    pub fn new(center: Arc<NotificationCenter>) -> Self {
        Self::with_context(center, ContextId::new())
    }

    /// Creates a store with a specific context.
    pub fn with_context(center: Arc<NotificationCenter>, context: ContextId) -> Self {
        Self {
            context,
            center,
            objects: RwLock::new(HashMap::new()),
            committed_seq: AtomicU64::new(0),
        }
    }

    /// Returns the context this store posts under.
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context
    }

    /// Returns the notification center.
    #[must_use]
    pub fn center(&self) -> &Arc<NotificationCenter> {
        &self.center
    }

    /// Begins a transaction.
    pub fn begin(&self) -> StoreTransaction<'_> {
        StoreTransaction {
            store: self,
            order: Vec::new(),
            writes: HashMap::new(),
        }
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, the transaction is committed and the
    /// published change set returned. If it returns `Err`, nothing is
    /// applied.
    pub fn transaction<F>(&self, f: F) -> StoreResult<Arc<ChangeSet>>
    where
        F: FnOnce(&mut StoreTransaction<'_>) -> StoreResult<()>,
    {
        let mut txn = self.begin();
        f(&mut txn)?;
        txn.commit()
    }

    /// Gets an object by identity.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<Arc<MemoryObject>> {
        self.objects.read().get(&id).cloned()
    }

    /// Gets an object as an [`ObjectRef`].
    #[must_use]
    pub fn object_ref(&self, id: ObjectId) -> Option<ObjectRef> {
        self.get(id).map(|o| o as ObjectRef)
    }

    /// Returns true if the store holds `id`.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.read().contains_key(&id)
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Returns the sequence number of the last published change set.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::Acquire))
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("context", &self.context)
            .field("objects", &self.len())
            .field("committed_seq", &self.committed_seq())
            .finish()
    }
}

/// Writes staged against a [`MemoryStore`].
///
/// Dropping a transaction without committing discards its writes.
pub struct StoreTransaction<'a> {
    store: &'a MemoryStore,
    order: Vec<ObjectId>,
    writes: HashMap<ObjectId, PendingWrite>,
}

impl StoreTransaction<'_> {
    /// Stages a new object of `type_name` with the given attributes.
    pub fn insert<I, K, V>(&mut self, type_name: &str, attributes: I) -> ObjectId
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let object = attributes
            .into_iter()
            .fold(MemoryObject::new(type_name), |o, (k, v)| o.with_attribute(k, v));
        let id = object.id;
        self.stage(id, PendingWrite::Insert(Arc::new(object)));
        id
    }

    /// Stages a prepared object.
    ///
    /// # Errors
    ///
    /// Returns `ObjectExists` if the identity is already in use.
    pub fn insert_object(&mut self, object: MemoryObject) -> StoreResult<ObjectId> {
        let id = object.id;
        if self.store.contains(id) || self.writes.contains_key(&id) {
            return Err(StoreError::ObjectExists { id });
        }
        self.stage(id, PendingWrite::Insert(Arc::new(object)));
        Ok(id)
    }

    /// Stages an attribute write.
    ///
    /// Writes to an object inserted in this transaction become part of the
    /// insert. Writing a value equal to the committed one is not a change.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` for unknown objects and `ObjectDeleted` if
    /// the object was deleted earlier in this transaction.
    pub fn set(&mut self, id: ObjectId, key: &str, value: impl Into<Value>) -> StoreResult<()> {
        let value = value.into();
        match self.writes.get_mut(&id) {
            Some(PendingWrite::Insert(object)) => {
                object.attributes.write().insert(key.to_string(), value);
                Ok(())
            }
            Some(PendingWrite::Update { values, .. }) => {
                values.insert(key.to_string(), value);
                Ok(())
            }
            Some(PendingWrite::Delete) => Err(StoreError::ObjectDeleted { id }),
            None => {
                self.ensure_exists(id)?;
                let mut values = BTreeMap::new();
                values.insert(key.to_string(), value);
                self.stage(
                    id,
                    PendingWrite::Update {
                        values,
                        touched: false,
                    },
                );
                Ok(())
            }
        }
    }

    /// Marks an object as updated even if no attribute changes.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` for unknown objects and `ObjectDeleted` if
    /// the object was deleted earlier in this transaction.
    pub fn touch(&mut self, id: ObjectId) -> StoreResult<()> {
        match self.writes.get_mut(&id) {
            Some(PendingWrite::Insert(_)) => Ok(()),
            Some(PendingWrite::Update { touched, .. }) => {
                *touched = true;
                Ok(())
            }
            Some(PendingWrite::Delete) => Err(StoreError::ObjectDeleted { id }),
            None => {
                self.ensure_exists(id)?;
                self.stage(
                    id,
                    PendingWrite::Update {
                        values: BTreeMap::new(),
                        touched: true,
                    },
                );
                Ok(())
            }
        }
    }

    /// Stages a delete.
    ///
    /// Deleting an object inserted in this transaction cancels the insert.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` for unknown objects.
    pub fn delete(&mut self, id: ObjectId) -> StoreResult<()> {
        match self.writes.get(&id) {
            Some(PendingWrite::Insert(_)) => {
                self.writes.remove(&id);
                self.order.retain(|staged| *staged != id);
                Ok(())
            }
            Some(PendingWrite::Delete) => Ok(()),
            Some(PendingWrite::Update { .. }) => {
                self.writes.insert(id, PendingWrite::Delete);
                Ok(())
            }
            None => {
                self.ensure_exists(id)?;
                self.stage(id, PendingWrite::Delete);
                Ok(())
            }
        }
    }

    /// Returns the number of staged objects.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Applies every staged write and publishes the change set.
    ///
    /// Updates whose values all equal the committed ones are dropped unless
    /// the object was touched. An empty change set is returned but not
    /// posted and does not consume a sequence number.
    ///
    /// Every staged write is validated and the change set built before the
    /// store is modified, so a failed commit leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if an updated object was removed by another
    /// transaction since it was staged.
    pub fn commit(mut self) -> StoreResult<Arc<ChangeSet>> {
        let store = self.store;
        let changes = {
            let mut objects = store.objects.write();
            let next = SequenceNumber::new(store.committed_seq.load(Ordering::Acquire)).next();
            let mut builder = ChangeSet::builder(next);
            let mut inserts = Vec::new();
            let mut updates = Vec::new();
            let mut deletes = Vec::new();

            for id in std::mem::take(&mut self.order) {
                let Some(write) = self.writes.remove(&id) else {
                    continue;
                };
                match write {
                    PendingWrite::Insert(object) => {
                        builder = builder.insert(Arc::clone(&object) as ObjectRef);
                        inserts.push(object);
                    }
                    PendingWrite::Update { values, touched } => {
                        let object = objects
                            .get(&id)
                            .cloned()
                            .ok_or(StoreError::ObjectNotFound { id })?;
                        let changed = object.diff(&values);
                        if touched || !changed.is_empty() {
                            builder = builder.update(Arc::clone(&object) as ObjectRef, changed);
                        }
                        updates.push((object, values));
                    }
                    PendingWrite::Delete => {
                        if let Some(object) = objects.get(&id) {
                            builder = builder.delete(Arc::clone(object) as ObjectRef);
                            deletes.push(id);
                        }
                    }
                }
            }

            let changes = builder.build()?;

            for object in inserts {
                objects.insert(object.id, object);
            }
            for (object, values) in updates {
                object.apply(values);
            }
            for id in deletes {
                objects.remove(&id);
            }

            if !changes.is_empty() {
                store.committed_seq.store(next.as_u64(), Ordering::Release);
            }
            changes
        };

        if changes.is_empty() {
            debug!(context = %store.context, "empty commit, nothing posted");
        } else {
            debug!(
                context = %store.context,
                sequence = %changes.sequence(),
                inserted = changes.inserted().len(),
                updated = changes.updated().len(),
                deleted = changes.deleted().len(),
                "commit published"
            );
            store.center.post(store.context, &changes);
        }
        Ok(Arc::new(changes))
    }

    /// Discards every staged write.
    pub fn rollback(self) {
        debug!(
            context = %self.store.context,
            writes = self.writes.len(),
            "transaction rolled back"
        );
    }

    fn stage(&mut self, id: ObjectId, write: PendingWrite) {
        if self.writes.insert(id, write).is_none() {
            self.order.push(id);
        }
    }

    fn ensure_exists(&self, id: ObjectId) -> StoreResult<()> {
        if self.store.contains(id) {
            Ok(())
        } else {
            Err(StoreError::ObjectNotFound { id })
        }
    }
}
