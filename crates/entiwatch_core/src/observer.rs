//! Observers: context/mask scoping and dispatch to filtered observers.
//!
//! An [`Observer`] subscribes to a [`NotificationCenter`] when it is created
//! and unsubscribes when dropped. For every notification it:
//!
//! 1. Discards it if the observer is inactive or the notification comes from
//!    a context other than `required_context`.
//! 2. Restricts the change set to the observer's mask.
//! 3. Calls the aggregate callback, if any, exactly once.
//! 4. Evaluates every registered [`FilteredObserver`] in registration order.
//!
//! A failing callback is logged and reported; it never stops dispatch to the
//! other callbacks of the same notification.
//!
//! # Concurrency
//!
//! The registry and configuration are behind `parking_lot` locks. Dispatch
//! iterates over a snapshot of the registry and runs callbacks with no lock
//! held, so callbacks may register or remove entries (taking effect on the
//! next notification). Notifications posted concurrently from different
//! threads are not ordered relative to each other.

use crate::callback::{run_guarded, AggregateCallback};
use crate::change_set::ChangeSet;
use crate::config::ObserverConfig;
use crate::error::{CallbackResult, CallbackTarget, WatchError, WatchResult};
use crate::filtered::FilteredObserver;
use crate::mask::ChangeMask;
use crate::notification::{ChangeListener, NotificationCenter, Subscription};
use crate::object::ObjectRef;
use crate::stats::ObserverStats;
use crate::types::{ContextId, RegistrationId};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Why a notification was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The observer is inactive.
    Inactive,
    /// The notification came from a context other than the required one.
    ForeignContext,
}

/// Summary of one dispatched notification.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Whether the aggregate callback ran.
    pub aggregate_invoked: bool,
    /// Number of filtered observers evaluated.
    pub evaluated: usize,
    /// Number of per-object callback invocations.
    pub delivered: usize,
    /// Every callback failure, in dispatch order.
    pub failures: Vec<WatchError>,
}

impl DispatchReport {
    /// Returns true if every callback succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of handing a notification to an observer.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No callback ran.
    Discarded(DiscardReason),
    /// The notification was dispatched.
    Dispatched(DispatchReport),
}

impl DispatchOutcome {
    /// Returns the report if the notification was dispatched.
    #[must_use]
    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            Self::Dispatched(report) => Some(report),
            Self::Discarded(_) => None,
        }
    }

    /// Returns true if the notification was discarded.
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded(_))
    }
}

struct Registration {
    id: RegistrationId,
    observer: Arc<FilteredObserver>,
}

/// State shared between an [`Observer`] and its center subscription.
struct ObserverShared {
    config: RwLock<ObserverConfig>,
    registry: RwLock<Vec<Registration>>,
    aggregate: RwLock<Option<AggregateCallback>>,
    next_registration: AtomicU64,
    stats: ObserverStats,
}

impl ObserverShared {
    fn new(config: ObserverConfig) -> Self {
        Self {
            config: RwLock::new(config),
            registry: RwLock::new(Vec::new()),
            aggregate: RwLock::new(None),
            next_registration: AtomicU64::new(0),
            stats: ObserverStats::new(),
        }
    }

    fn dispatch(&self, source: ContextId, changes: &ChangeSet) -> DispatchOutcome {
        self.stats.record_received();
        let config = self.config.read().clone();

        if !config.active {
            self.stats.record_discarded();
            debug!(source = %source, "observer inactive, notification discarded");
            return DispatchOutcome::Discarded(DiscardReason::Inactive);
        }
        if let Some(required) = config.required_context {
            if required != source {
                self.stats.record_discarded();
                debug!(
                    source = %source,
                    required = %required,
                    "notification from foreign context discarded"
                );
                return DispatchOutcome::Discarded(DiscardReason::ForeignContext);
            }
        }

        let scoped = if config.mask == ChangeMask::ALL {
            None
        } else {
            Some(changes.restrict(config.mask))
        };
        let scoped = scoped.as_ref().unwrap_or(changes);

        let mut report = DispatchReport::default();

        let aggregate = self.aggregate.read().clone();
        if let Some(aggregate) = aggregate {
            let updated = scoped.updated_objects();
            let result = run_guarded(|| {
                aggregate(updated.as_slice(), scoped.inserted(), scoped.deleted())
            });
            report.aggregate_invoked = true;
            self.stats.record_aggregate();
            if let Err(message) = result {
                warn!(sequence = %scoped.sequence(), error = %message, "aggregate callback failed");
                report.failures.push(WatchError::callback_failed(
                    CallbackTarget::Aggregate,
                    None,
                    message,
                ));
            }
        }

        let entries: Vec<(RegistrationId, Arc<FilteredObserver>)> = self
            .registry
            .read()
            .iter()
            .map(|r| (r.id, Arc::clone(&r.observer)))
            .collect();

        for (id, observer) in entries {
            let evaluation = observer.evaluate(scoped);
            report.evaluated += 1;
            report.delivered += evaluation.delivered;
            report.failures.extend(evaluation.failures.into_iter().map(|f| {
                WatchError::callback_failed(
                    CallbackTarget::Filtered(id),
                    Some(f.object_id),
                    f.message,
                )
            }));
        }

        self.stats.record_deliveries(report.delivered as u64);
        self.stats.record_failures(report.failures.len() as u64);
        debug!(
            sequence = %scoped.sequence(),
            evaluated = report.evaluated,
            delivered = report.delivered,
            failures = report.failures.len(),
            "notification dispatched"
        );
        DispatchOutcome::Dispatched(report)
    }
}

impl ChangeListener for ObserverShared {
    fn on_change(&self, source: ContextId, changes: &ChangeSet) {
        self.dispatch(source, changes);
    }
}

/// Routes change notifications to an aggregate callback and to registered
/// filtered observers.
pub struct Observer {
    shared: Arc<ObserverShared>,
    subscription: Option<Subscription>,
}

impl Observer {
    /// Creates an observer subscribed to `center`.
    ///
    /// The subscription lives as long as the observer.
    pub fn new(center: &Arc<NotificationCenter>, config: ObserverConfig) -> Self {
        let shared = Arc::new(ObserverShared::new(config));
        let listener: Weak<dyn ChangeListener> = Arc::downgrade(&shared) as Weak<ObserverShared>;
        let subscription = center.subscribe(listener);
        Self {
            shared,
            subscription: Some(subscription),
        }
    }

    /// Creates an observer that is not subscribed to any center.
    ///
    /// Notifications must be handed to it with
    /// [`handle_notification`](Self::handle_notification).
    pub fn detached(config: ObserverConfig) -> Self {
        Self {
            shared: Arc::new(ObserverShared::new(config)),
            subscription: None,
        }
    }

    /// Handles one raw notification synchronously.
    pub fn handle_notification(&self, source: ContextId, changes: &ChangeSet) -> DispatchOutcome {
        self.shared.dispatch(source, changes)
    }

    /// Appends a filtered observer to the registry.
    ///
    /// Registering the same filtered observer twice yields two independent
    /// registrations, each dispatched separately.
    pub fn add_filtered_observer(
        &self,
        observer: impl Into<Arc<FilteredObserver>>,
    ) -> RegistrationId {
        let id = RegistrationId::new(
            self.shared.next_registration.fetch_add(1, Ordering::Relaxed) + 1,
        );
        let observer = observer.into();
        debug!(
            registration = %id,
            label = observer.label().unwrap_or("-"),
            "filtered observer added"
        );
        self.shared.registry.write().push(Registration { id, observer });
        id
    }

    /// Removes one registration.
    ///
    /// # Errors
    ///
    /// Returns `ObserverNotFound` if no entry has this id.
    pub fn remove_filtered_observer(
        &self,
        id: RegistrationId,
    ) -> WatchResult<Arc<FilteredObserver>> {
        let mut registry = self.shared.registry.write();
        let index = registry
            .iter()
            .position(|r| r.id == id)
            .ok_or(WatchError::ObserverNotFound { handle: id })?;
        debug!(registration = %id, "filtered observer removed");
        Ok(registry.remove(index).observer)
    }

    /// Removes every filtered observer.
    pub fn clear(&self) {
        self.shared.registry.write().clear();
    }

    /// Returns the number of registered filtered observers.
    #[must_use]
    pub fn filtered_observer_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Returns the registration ids in dispatch order.
    #[must_use]
    pub fn registrations(&self) -> Vec<RegistrationId> {
        self.shared.registry.read().iter().map(|r| r.id).collect()
    }

    /// Sets the aggregate callback, replacing any previous one.
    ///
    /// It receives the scoped `(updated, inserted, deleted)` objects once per
    /// dispatched notification, even when all three are empty.
    pub fn set_aggregate_callback<F>(&self, callback: F)
    where
        F: Fn(&[ObjectRef], &[ObjectRef], &[ObjectRef]) -> CallbackResult + Send + Sync + 'static,
    {
        *self.shared.aggregate.write() = Some(Arc::new(callback));
    }

    /// Removes the aggregate callback.
    pub fn clear_aggregate_callback(&self) {
        *self.shared.aggregate.write() = None;
    }

    /// Returns a copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> ObserverConfig {
        self.shared.config.read().clone()
    }

    /// Enables or disables dispatch.
    pub fn set_active(&self, active: bool) {
        self.shared.config.write().active = active;
    }

    /// Returns true if dispatch is enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.config.read().active
    }

    /// Sets the category mask applied before any callback runs.
    pub fn set_mask(&self, mask: ChangeMask) {
        self.shared.config.write().mask = mask;
    }

    /// Returns the category mask.
    #[must_use]
    pub fn mask(&self) -> ChangeMask {
        self.shared.config.read().mask
    }

    /// Restricts dispatch to one context, or lifts the restriction.
    pub fn set_required_context(&self, context: Option<ContextId>) {
        self.shared.config.write().required_context = context;
    }

    /// Returns the required context, if any.
    #[must_use]
    pub fn required_context(&self) -> Option<ContextId> {
        self.shared.config.read().required_context
    }

    /// Returns true if the observer is subscribed to a center.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Returns the dispatch statistics.
    #[must_use]
    pub fn stats(&self) -> &ObserverStats {
        &self.shared.stats
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("config", &*self.shared.config.read())
            .field("filtered_observers", &self.filtered_observer_count())
            .field("subscription", &self.subscription.as_ref().map(Subscription::id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::test_support::object;
    use crate::criteria::FilterCriteria;
    use crate::mask::ChangeKind;
    use crate::types::SequenceNumber;
    use parking_lot::Mutex;

    fn sample() -> (ObjectRef, ObjectRef, ObjectRef, ChangeSet) {
        let a = object("Order");
        let b = object("Order");
        let c = object("Customer");
        let changes = ChangeSet::builder(SequenceNumber::new(1))
            .insert(a.clone())
            .update(b.clone(), ["status"])
            .delete(c.clone())
            .build()
            .unwrap();
        (a, b, c, changes)
    }

    fn counter() -> (
        Arc<Mutex<usize>>,
        impl Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult,
    ) {
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        (count, move |_: ChangeKind, _: &ObjectRef, _: &[String]| {
            *sink.lock() += 1;
            Ok(())
        })
    }

    #[test]
    fn aggregate_receives_scoped_sets() {
        let (_, b, _, changes) = sample();
        let observer = Observer::detached(ObserverConfig::new().mask(ChangeMask::UPDATED));

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        observer.set_aggregate_callback(move |updated, inserted, deleted| {
            *sink.lock() = Some((
                updated.iter().map(|o| o.object_id()).collect::<Vec<_>>(),
                inserted.len(),
                deleted.len(),
            ));
            Ok(())
        });

        let outcome = observer.handle_notification(ContextId::new(), &changes);
        assert!(outcome.report().unwrap().aggregate_invoked);
        assert_eq!(*seen.lock(), Some((vec![b.object_id()], 0, 0)));
    }

    #[test]
    fn aggregate_fires_for_empty_change_set() {
        let observer = Observer::detached(ObserverConfig::default());
        let (count, _) = counter();
        let sink = Arc::clone(&count);
        observer.set_aggregate_callback(move |_, _, _| {
            *sink.lock() += 1;
            Ok(())
        });

        observer.handle_notification(ContextId::new(), &ChangeSet::empty(SequenceNumber::new(1)));
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn observer_mask_applies_before_filtered_observers() {
        let (_, _, _, changes) = sample();
        let observer = Observer::detached(ObserverConfig::new().mask(ChangeMask::DELETED));
        let (count, callback) = counter();
        observer.add_filtered_observer(FilteredObserver::all(callback));

        observer.handle_notification(ContextId::new(), &changes);
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn foreign_context_discarded() {
        let (_, _, _, changes) = sample();
        let ctx_a = ContextId::new();
        let ctx_b = ContextId::new();
        let observer = Observer::detached(ObserverConfig::new().required_context(ctx_a));
        let (count, callback) = counter();
        observer.add_filtered_observer(FilteredObserver::all(callback));

        let outcome = observer.handle_notification(ctx_b, &changes);
        assert!(matches!(
            outcome,
            DispatchOutcome::Discarded(DiscardReason::ForeignContext)
        ));
        assert_eq!(*count.lock(), 0);

        observer.handle_notification(ctx_a, &changes);
        assert_eq!(*count.lock(), 3);
        assert_eq!(observer.stats().notifications_discarded(), 1);
    }

    #[test]
    fn inactive_observer_discards() {
        let (_, _, _, changes) = sample();
        let observer = Observer::detached(ObserverConfig::default());
        observer.set_active(false);

        let outcome = observer.handle_notification(ContextId::new(), &changes);
        assert!(matches!(outcome, DispatchOutcome::Discarded(DiscardReason::Inactive)));
    }

    #[test]
    fn duplicate_registration_dispatches_twice() {
        let (_, _, _, changes) = sample();
        let observer = Observer::detached(ObserverConfig::default());
        let (count, callback) = counter();
        let filtered = Arc::new(FilteredObserver::new(
            FilterCriteria::new().with_mask(ChangeKind::Inserted),
            callback,
        ));

        let first = observer.add_filtered_observer(Arc::clone(&filtered));
        let second = observer.add_filtered_observer(filtered);
        assert_ne!(first, second);

        observer.handle_notification(ContextId::new(), &changes);
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn remove_and_clear() {
        let (_, _, _, changes) = sample();
        let observer = Observer::detached(ObserverConfig::default());
        let (count, callback) = counter();
        let id = observer.add_filtered_observer(FilteredObserver::all(callback));
        observer.add_filtered_observer(FilteredObserver::all(|_, _, _| Ok(())));
        assert_eq!(observer.filtered_observer_count(), 2);

        observer.remove_filtered_observer(id).unwrap();
        assert!(matches!(
            observer.remove_filtered_observer(id),
            Err(WatchError::ObserverNotFound { .. })
        ));

        observer.handle_notification(ContextId::new(), &changes);
        assert_eq!(*count.lock(), 0);

        observer.clear();
        assert_eq!(observer.filtered_observer_count(), 0);
    }

    #[test]
    fn failure_is_isolated() {
        let (_, _, _, changes) = sample();
        let observer = Observer::detached(ObserverConfig::default());
        observer.set_aggregate_callback(|_, _, _| Err("aggregate down".into()));
        let failing = observer.add_filtered_observer(FilteredObserver::all(|_, _, _| {
            panic!("consumer bug")
        }));
        let (count, callback) = counter();
        observer.add_filtered_observer(FilteredObserver::all(callback));

        let outcome = observer.handle_notification(ContextId::new(), &changes);
        let report = outcome.report().unwrap();

        assert_eq!(*count.lock(), 3);
        assert_eq!(report.delivered, 6);
        assert_eq!(report.failures.len(), 4);
        assert!(matches!(
            report.failures[0],
            WatchError::CallbackFailed {
                target: CallbackTarget::Aggregate,
                ..
            }
        ));
        assert!(report.failures[1..].iter().all(|f| matches!(
            f,
            WatchError::CallbackFailed {
                target: CallbackTarget::Filtered(id),
                ..
            } if *id == failing
        )));
        assert_eq!(observer.stats().callback_failures(), 4);
    }

    #[test]
    fn callback_may_register_during_dispatch() {
        let (_, _, _, changes) = sample();
        let observer = Arc::new(Observer::detached(ObserverConfig::default()));
        let weak = Arc::downgrade(&observer);
        observer.add_filtered_observer(FilteredObserver::new(
            FilterCriteria::new().with_mask(ChangeKind::Inserted),
            move |_, _, _| {
                if let Some(observer) = weak.upgrade() {
                    observer.add_filtered_observer(FilteredObserver::all(|_, _, _| Ok(())));
                }
                Ok(())
            },
        ));

        let outcome = observer.handle_notification(ContextId::new(), &changes);
        assert_eq!(outcome.report().unwrap().evaluated, 1);
        assert_eq!(observer.filtered_observer_count(), 2);
    }

    #[test]
    fn subscribed_observer_receives_posts_until_dropped() {
        let (_, _, _, changes) = sample();
        let center = Arc::new(NotificationCenter::new());
        let observer = Observer::new(&center, ObserverConfig::default());
        assert!(observer.is_subscribed());
        let (count, callback) = counter();
        observer.add_filtered_observer(FilteredObserver::all(callback));

        center.post(ContextId::new(), &changes);
        assert_eq!(*count.lock(), 3);

        drop(observer);
        assert_eq!(center.subscriber_count(), 0);
        assert_eq!(center.post(ContextId::new(), &changes), 0);
        assert_eq!(*count.lock(), 3);
    }
}
