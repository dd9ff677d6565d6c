//! Filtered observers: one set of criteria plus one callback.

use crate::callback::{run_guarded, ChangeCallback};
use crate::change_set::ChangeSet;
use crate::criteria::{FilterCriteria, Match};
use crate::error::CallbackResult;
use crate::mask::{ChangeKind, ChangeMask};
use crate::object::{ObjectId, ObjectRef};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// A failed callback invocation for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    /// Category of the object being delivered.
    pub kind: ChangeKind,
    /// The object being delivered.
    pub object_id: ObjectId,
    /// Error message or panic payload.
    pub message: String,
}

/// Outcome of one [`FilteredObserver::evaluate`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// Number of objects that matched and were handed to the callback.
    pub delivered: usize,
    /// Invocations that returned an error or panicked.
    pub failures: Vec<CallbackFailure>,
}

impl EvaluationReport {
    /// Returns true if every invocation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A declarative subscription: filter criteria and a callback.
///
/// Criteria can be changed between dispatches. Each evaluation works on a
/// snapshot taken when it starts, so a concurrent edit applies to the next
/// evaluation.
pub struct FilteredObserver {
    criteria: RwLock<FilterCriteria>,
    callback: ChangeCallback,
    label: Option<String>,
}

impl FilteredObserver {
    /// Creates a filtered observer.
    pub fn new<F>(criteria: FilterCriteria, callback: F) -> Self
    where
        F: Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult + Send + Sync + 'static,
    {
        Self {
            criteria: RwLock::new(criteria),
            callback: Arc::new(callback),
            label: None,
        }
    }

    /// Creates a filtered observer that is told about every object.
    pub fn all<F>(callback: F) -> Self
    where
        F: Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult + Send + Sync + 'static,
    {
        Self::new(FilterCriteria::new(), callback)
    }

    /// Observes a single object.
    pub fn for_object<F>(object: &ObjectRef, callback: F) -> Self
    where
        F: Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult + Send + Sync + 'static,
    {
        Self::for_ids([object.object_id()], callback)
    }

    /// Observes every object in `objects` (a set, slice, or any iterator).
    pub fn for_objects<'a, I, F>(objects: I, callback: F) -> Self
    where
        I: IntoIterator<Item = &'a ObjectRef>,
        F: Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult + Send + Sync + 'static,
    {
        Self::for_ids(objects.into_iter().map(|o| o.object_id()), callback)
    }

    /// Observes the objects with the given identities.
    pub fn for_ids<I, F>(ids: I, callback: F) -> Self
    where
        I: IntoIterator<Item = ObjectId>,
        F: Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult + Send + Sync + 'static,
    {
        Self::new(FilterCriteria::for_ids(ids), callback)
    }

    /// Sets a label used in log output.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Overrides the category mask.
    #[must_use]
    pub fn with_mask(self, mask: impl Into<ChangeMask>) -> Self {
        self.criteria.write().mask = mask.into();
        self
    }

    /// Returns the label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns a snapshot of the current criteria.
    #[must_use]
    pub fn criteria(&self) -> FilterCriteria {
        self.criteria.read().clone()
    }

    /// Replaces the criteria.
    pub fn set_criteria(&self, criteria: FilterCriteria) {
        *self.criteria.write() = criteria;
    }

    /// Edits the criteria in place.
    pub fn update_criteria<F: FnOnce(&mut FilterCriteria)>(&self, f: F) {
        f(&mut self.criteria.write());
    }

    /// Enables or disables delivery.
    pub fn set_active(&self, active: bool) {
        self.criteria.write().active = active;
    }

    /// Returns true if delivery is enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.criteria.read().active
    }

    /// Computes the matching objects without invoking the callback.
    #[must_use]
    pub fn matches(&self, changes: &ChangeSet) -> Vec<Match> {
        self.criteria().select(changes)
    }

    /// Delivers every matching object of `changes` to the callback.
    ///
    /// Objects are delivered inserted first, then updated, then deleted, each
    /// category in change-set order. A failing invocation is logged and
    /// recorded; the remaining objects are still delivered.
    pub fn evaluate(&self, changes: &ChangeSet) -> EvaluationReport {
        let matches = self.matches(changes);
        let mut report = EvaluationReport::default();

        for m in matches {
            trace!(
                observer = self.label().unwrap_or("-"),
                kind = %m.kind.letter(),
                type_name = m.object.type_name(),
                keys = ?m.keys,
                "delivering change"
            );
            report.delivered += 1;

            let callback = &self.callback;
            let result = run_guarded(|| callback(m.kind, &m.object, m.keys.as_slice()));
            if let Err(message) = result {
                let object_id = m.object.object_id();
                warn!(
                    observer = self.label().unwrap_or("-"),
                    kind = %m.kind,
                    object = %object_id,
                    error = %message,
                    "change callback failed"
                );
                report.failures.push(CallbackFailure {
                    kind: m.kind,
                    object_id,
                    message,
                });
            }
        }
        report
    }
}

impl fmt::Debug for FilteredObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredObserver")
            .field("label", &self.label)
            .field("criteria", &*self.criteria.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::test_support::object;
    use crate::types::SequenceNumber;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<(ChangeKind, ObjectId, Vec<String>)>>>;

    fn recording(criteria: FilterCriteria) -> (FilteredObserver, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let observer = FilteredObserver::new(criteria, move |kind, obj, keys| {
            sink.lock().push((kind, obj.object_id(), keys.to_vec()));
            Ok(())
        });
        (observer, log)
    }

    #[test]
    fn evaluate_delivers_each_match_once() {
        let a = object("Order");
        let b = object("Order");
        let changes = ChangeSet::builder(SequenceNumber::new(1))
            .insert(a.clone())
            .update(b.clone(), ["status"])
            .build()
            .unwrap();

        let (observer, log) = recording(FilterCriteria::new());
        let report = observer.evaluate(&changes);

        assert_eq!(report.delivered, 2);
        assert!(report.is_success());
        let log = log.lock();
        assert_eq!(log[0], (ChangeKind::Inserted, a.object_id(), vec![]));
        assert_eq!(
            log[1],
            (ChangeKind::Updated, b.object_id(), vec!["status".to_string()])
        );
    }

    #[test]
    fn for_object_restricts_to_identity() {
        let watched = object("Order");
        let other = object("Order");
        let changes = ChangeSet::builder(SequenceNumber::new(1))
            .delete(other)
            .delete(watched.clone())
            .build()
            .unwrap();

        let hits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&hits);
        let observer = FilteredObserver::for_object(&watched, move |_, obj, _| {
            sink.lock().push(obj.object_id());
            Ok(())
        });

        observer.evaluate(&changes);
        assert_eq!(*hits.lock(), vec![watched.object_id()]);
    }

    #[test]
    fn for_objects_with_mask_override() {
        let a = object("A");
        let b = object("B");
        let changes = ChangeSet::builder(SequenceNumber::new(1))
            .insert(a.clone())
            .delete(b.clone())
            .build()
            .unwrap();

        let observer = FilteredObserver::for_objects([&a, &b], |_, _, _| Ok(()))
            .with_mask(ChangeKind::Deleted);
        let matches = observer.matches(&changes);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].object.object_id(), b.object_id());
    }

    #[test]
    fn failing_invocation_does_not_stop_delivery() {
        let first = object("Order");
        let second = object("Order");
        let changes = ChangeSet::builder(SequenceNumber::new(1))
            .insert(first.clone())
            .insert(second.clone())
            .build()
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let failing_id = first.object_id();
        let observer = FilteredObserver::all(move |_, obj, _| {
            sink.lock().push(obj.object_id());
            if obj.object_id() == failing_id {
                return Err("rejected".into());
            }
            Ok(())
        })
        .with_label("orders");

        let report = observer.evaluate(&changes);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].object_id, failing_id);
        assert_eq!(report.failures[0].message, "rejected");
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn criteria_can_be_edited_between_evaluations() {
        let changes = ChangeSet::builder(SequenceNumber::new(1))
            .insert(object("Order"))
            .build()
            .unwrap();

        let (observer, log) = recording(FilterCriteria::new().with_type("Customer"));
        observer.evaluate(&changes);
        assert!(log.lock().is_empty());

        observer.update_criteria(|c| {
            c.type_names = None;
        });
        observer.evaluate(&changes);
        assert_eq!(log.lock().len(), 1);

        observer.set_active(false);
        assert!(!observer.is_active());
        assert_eq!(observer.evaluate(&changes).delivered, 0);
    }

    #[test]
    fn evaluate_does_not_touch_change_set() {
        let obj = object("Order");
        let changes = ChangeSet::builder(SequenceNumber::new(1))
            .update(obj.clone(), ["a", "b"])
            .build()
            .unwrap();

        let observer = FilteredObserver::new(
            FilterCriteria::new().with_ignored_keys(["a"]),
            |_, _, _| Ok(()),
        );
        observer.evaluate(&changes);
        assert_eq!(
            changes.changed_keys(obj.object_id()),
            Some(&["a".to_string(), "b".to_string()][..])
        );
    }
}
