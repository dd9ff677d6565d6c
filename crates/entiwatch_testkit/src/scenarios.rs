//! Reference dispatch scenarios.
//!
//! Each function builds its own harness, drives one commit through a
//! [`MemoryStore`](crate::MemoryStore) and asserts on what the callbacks saw.
//! They panic on failure so they can be called from any test.

use crate::fixtures::{AggregateRecorder, Delivery, Recorder, TestHarness};
use entiwatch_core::{
    CallbackTarget, ChangeKind, ChangeMask, FilterCriteria, FilteredObserver, ObjectId,
    WatchError,
};

/// An inserted object of a watched type is delivered once with no keys.
pub fn insert_of_watched_type() {
    let harness = TestHarness::new();
    let recorder = Recorder::new();
    harness.observer.add_filtered_observer(FilteredObserver::new(
        FilterCriteria::new()
            .with_mask(ChangeMask::INSERTED)
            .with_type("Order"),
        recorder.callback(),
    ));

    let changes = harness
        .store
        .transaction(|tx| {
            tx.insert("Order", [("total", 10)]);
            tx.insert("Customer", [("name", "ada")]);
            Ok(())
        })
        .expect("Failed to commit");

    let order = changes.inserted()[0].object_id();
    assert_eq!(
        recorder.deliveries(),
        vec![Delivery {
            kind: ChangeKind::Inserted,
            object_id: order,
            type_name: "Order".to_string(),
            keys: vec![],
        }]
    );
}

fn person(harness: &TestHarness) -> ObjectId {
    harness
        .store
        .transaction(|tx| {
            tx.insert("Person", [("name", "ada"), ("age", "36")]);
            Ok(())
        })
        .expect("Failed to commit")
        .inserted()[0]
        .object_id()
}

/// Ignored keys are removed from the keys handed to the callback.
pub fn ignored_keys_are_trimmed() {
    let harness = TestHarness::new();
    let id = person(&harness);

    let recorder = Recorder::new();
    harness.observer.add_filtered_observer(FilteredObserver::new(
        FilterCriteria::new().with_ignored_keys(["age"]),
        recorder.callback(),
    ));

    harness
        .store
        .transaction(|tx| {
            tx.set(id, "name", "grace")?;
            tx.set(id, "age", "37")
        })
        .expect("Failed to commit");

    assert_eq!(recorder.events(), vec![(ChangeKind::Updated, id)]);
    assert_eq!(recorder.deliveries()[0].keys, vec!["name".to_string()]);
}

/// An update touching only ignored keys is not reported.
pub fn ignored_only_update_is_suppressed() {
    let harness = TestHarness::new();
    let id = person(&harness);

    let recorder = Recorder::new();
    harness.observer.add_filtered_observer(FilteredObserver::new(
        FilterCriteria::new()
            .with_ignored_keys(["age"])
            .report_updates_without_changes(false),
        recorder.callback(),
    ));

    harness
        .store
        .transaction(|tx| tx.set(id, "age", "37"))
        .expect("Failed to commit");

    assert!(recorder.is_empty(), "unexpected deliveries: {:?}", recorder.deliveries());
}

/// A commit from another context reaches no callback at all.
pub fn foreign_context_is_discarded() {
    let harness = TestHarness::new();
    let recorder = Recorder::new();
    let aggregate = AggregateRecorder::new();
    harness
        .observer
        .add_filtered_observer(FilteredObserver::all(recorder.callback()));
    harness.observer.set_aggregate_callback(aggregate.callback());

    let foreign = harness.foreign_store();
    foreign
        .transaction(|tx| {
            tx.insert("Order", [("total", 1)]);
            Ok(())
        })
        .expect("Failed to commit");

    assert!(recorder.is_empty());
    assert!(aggregate.is_empty());
    assert_eq!(harness.observer.stats().notifications_discarded(), 1);
}

/// A failing entry does not keep the other entries from their deliveries.
pub fn failing_entry_is_isolated() {
    let harness = TestHarness::new();
    harness.observer.add_filtered_observer(
        FilteredObserver::all(|_, _, _| Err("rejected".into())).with_label("failing"),
    );
    harness.observer.add_filtered_observer(
        FilteredObserver::all(|_, _, _| panic!("boom")).with_label("panicking"),
    );
    let recorder = Recorder::new();
    harness
        .observer
        .add_filtered_observer(FilteredObserver::all(recorder.callback()));

    let ids = harness.seed("Order", 2);
    assert_eq!(
        recorder.events(),
        ids.iter()
            .map(|id| (ChangeKind::Inserted, *id))
            .collect::<Vec<_>>()
    );
    assert_eq!(harness.observer.stats().callback_failures(), 4);

    let changes = harness
        .store
        .transaction(|tx| tx.set(ids[0], "n", 99))
        .expect("Failed to commit");
    let outcome = harness
        .observer
        .handle_notification(harness.store.context_id(), &changes);
    let report = outcome.report().expect("notification was discarded");

    assert_eq!(report.evaluated, 3);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.failures.len(), 2);
    for failure in &report.failures {
        assert!(matches!(
            failure,
            WatchError::CallbackFailed {
                target: CallbackTarget::Filtered(_),
                object_id: Some(id),
                ..
            } if *id == ids[0]
        ));
    }
    assert_eq!(recorder.count_for(ids[0]), 3);
}

/// Runs every scenario.
pub fn run_all() {
    insert_of_watched_type();
    ignored_keys_are_trimmed();
    ignored_only_update_is_suppressed();
    foreign_context_is_discarded();
    failing_entry_is_isolated();
}
