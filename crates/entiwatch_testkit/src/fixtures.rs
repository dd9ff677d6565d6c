//! Test fixtures and observer helpers.
//!
//! Provides recorders that capture callback invocations and a harness
//! wiring a [`MemoryStore`] to an [`Observer`] through a shared
//! [`NotificationCenter`].

use crate::store::{MemoryObject, MemoryStore};
use entiwatch_core::{
    CallbackResult, ChangeKind, ChangeSet, NotificationCenter, ObjectId, ObjectRef, Observer,
    ObserverConfig,
};
use parking_lot::Mutex;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter is read from `RUST_LOG` and defaults to `warn`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Creates a detached object of `type_name` with the given attributes.
pub fn fixture_object<I, K, V>(type_name: &str, attributes: I) -> ObjectRef
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<entiwatch_core::Value>,
{
    attributes
        .into_iter()
        .fold(MemoryObject::new(type_name), |o, (k, v)| o.with_attribute(k, v))
        .into_ref()
}

/// One per-object callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Category the object was delivered in.
    pub kind: ChangeKind,
    /// The delivered object.
    pub object_id: ObjectId,
    /// Type of the delivered object.
    pub type_name: String,
    /// Keys passed to the callback.
    pub keys: Vec<String>,
}

/// Records every invocation of a filtered observer callback.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback that appends to this recorder.
    pub fn callback(
        &self,
    ) -> impl Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult + Send + Sync + 'static {
        let sink = Arc::clone(&self.deliveries);
        move |kind: ChangeKind, object: &ObjectRef, keys: &[String]| {
            sink.lock().push(Delivery {
                kind,
                object_id: object.object_id(),
                type_name: object.type_name().to_string(),
                keys: keys.to_vec(),
            });
            Ok(())
        }
    }

    /// Returns a copy of every recorded delivery.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Returns the `(kind, object)` pairs in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<(ChangeKind, ObjectId)> {
        self.deliveries
            .lock()
            .iter()
            .map(|d| (d.kind, d.object_id))
            .collect()
    }

    /// Returns how many times `id` was delivered.
    #[must_use]
    pub fn count_for(&self, id: ObjectId) -> usize {
        self.deliveries
            .lock()
            .iter()
            .filter(|d| d.object_id == id)
            .count()
    }

    /// Returns the number of deliveries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Returns true if nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.lock().is_empty()
    }

    /// Forgets every delivery.
    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }
}

/// One aggregate callback invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCall {
    /// Updated objects, in order.
    pub updated: Vec<ObjectId>,
    /// Inserted objects, in order.
    pub inserted: Vec<ObjectId>,
    /// Deleted objects, in order.
    pub deleted: Vec<ObjectId>,
}

/// Records every invocation of an aggregate callback.
#[derive(Debug, Clone, Default)]
pub struct AggregateRecorder {
    calls: Arc<Mutex<Vec<AggregateCall>>>,
}

impl AggregateRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback that appends to this recorder.
    pub fn callback(
        &self,
    ) -> impl Fn(&[ObjectRef], &[ObjectRef], &[ObjectRef]) -> CallbackResult + Send + Sync + 'static
    {
        let sink = Arc::clone(&self.calls);
        move |updated: &[ObjectRef], inserted: &[ObjectRef], deleted: &[ObjectRef]| {
            let ids = |objects: &[ObjectRef]| -> Vec<ObjectId> {
                objects.iter().map(|o| o.object_id()).collect()
            };
            sink.lock().push(AggregateCall {
                updated: ids(updated),
                inserted: ids(inserted),
                deleted: ids(deleted),
            });
            Ok(())
        }
    }

    /// Returns a copy of every recorded call.
    #[must_use]
    pub fn calls(&self) -> Vec<AggregateCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if the callback never ran.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

/// A store and an observer connected through one notification center.
///
/// The observer is scoped to the store's context unless the configuration
/// passed to [`with_config`](Self::with_config) says otherwise.
pub struct TestHarness {
    /// The shared notification center.
    pub center: Arc<NotificationCenter>,
    /// The store that publishes commits.
    pub store: MemoryStore,
    /// The observer under test.
    pub observer: Observer,
}

impl TestHarness {
    /// Creates a harness whose observer watches the store's context.
    pub fn new() -> Self {
        let center = Arc::new(NotificationCenter::new());
        let store = MemoryStore::new(Arc::clone(&center));
        let config = ObserverConfig::new().required_context(store.context_id());
        let observer = Observer::new(&center, config);
        Self {
            center,
            store,
            observer,
        }
    }

    /// Creates a harness with an explicit observer configuration.
    pub fn with_config(config: ObserverConfig) -> Self {
        let center = Arc::new(NotificationCenter::new());
        let store = MemoryStore::new(Arc::clone(&center));
        let observer = Observer::new(&center, config);
        Self {
            center,
            store,
            observer,
        }
    }

    /// Creates a second store on the same center, under a new context.
    pub fn foreign_store(&self) -> MemoryStore {
        MemoryStore::new(Arc::clone(&self.center))
    }

    /// Inserts `count` objects of `type_name` and returns their identities.
    ///
    /// # Panics
    ///
    /// Panics if the commit fails.
    pub fn seed(&self, type_name: &str, count: usize) -> Vec<ObjectId> {
        let changes = self
            .store
            .transaction(|tx| {
                for n in 0..count {
                    tx.insert(type_name, [("n", n as i64)]);
                }
                Ok(())
            })
            .expect("Failed to seed store");
        changes.inserted().iter().map(|o| o.object_id()).collect()
    }

    /// Hands `changes` to the observer as if posted by the store.
    pub fn deliver(&self, changes: &ChangeSet) {
        self.center.post(self.store.context_id(), changes);
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entiwatch_core::{FilterCriteria, FilteredObserver, SequenceNumber};

    #[test]
    fn test_recorder_captures_keys() {
        let recorder = Recorder::new();
        let object = fixture_object("Order", [("status", "new")]);
        let callback = recorder.callback();

        callback(ChangeKind::Updated, &object, &["status".to_string()][..]).unwrap();
        assert_eq!(recorder.len(), 1);
        assert_eq!(
            recorder.deliveries()[0],
            Delivery {
                kind: ChangeKind::Updated,
                object_id: object.object_id(),
                type_name: "Order".to_string(),
                keys: vec!["status".to_string()],
            }
        );

        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_harness_routes_commits_to_observer() {
        init_test_tracing();
        let harness = TestHarness::new();
        let recorder = Recorder::new();
        harness
            .observer
            .add_filtered_observer(FilteredObserver::new(
                FilterCriteria::new(),
                recorder.callback(),
            ));

        let ids = harness.seed("Item", 3);
        assert_eq!(recorder.len(), 3);
        assert_eq!(
            recorder.events(),
            ids.iter().map(|id| (ChangeKind::Inserted, *id)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_harness_ignores_foreign_store() {
        let harness = TestHarness::new();
        let aggregate = AggregateRecorder::new();
        harness.observer.set_aggregate_callback(aggregate.callback());

        let foreign = harness.foreign_store();
        foreign
            .transaction(|tx| {
                tx.insert("Item", [("n", 1)]);
                Ok(())
            })
            .unwrap();
        assert!(aggregate.is_empty());

        harness.deliver(&ChangeSet::empty(SequenceNumber::new(9)));
        assert_eq!(aggregate.len(), 1);
        assert_eq!(
            aggregate.calls()[0],
            AggregateCall {
                updated: vec![],
                inserted: vec![],
                deleted: vec![],
            }
        );
    }
}
