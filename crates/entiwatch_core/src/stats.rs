//! Observer dispatch statistics.
//!
//! # Usage
//!
//! ```rust,ignore
//! let stats = observer.stats().snapshot();
//! println!("received: {}", stats.notifications_received);
//! println!("failures: {}", stats.callback_failures);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Dispatch counters for one observer.
///
/// All counters are atomic and can be read while a dispatch is in progress.
#[derive(Debug, Default)]
pub struct ObserverStats {
    /// Notifications handed to the observer.
    notifications_received: AtomicU64,
    /// Notifications discarded (inactive observer or foreign context).
    notifications_discarded: AtomicU64,
    /// Aggregate callback invocations.
    aggregate_invocations: AtomicU64,
    /// Per-object callback invocations across all filtered observers.
    deliveries: AtomicU64,
    /// Failed callback invocations (aggregate and per-object).
    callback_failures: AtomicU64,
}

impl ObserverStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.notifications_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self) {
        self.notifications_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_aggregate(&self) {
        self.aggregate_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deliveries(&self, count: u64) {
        self.deliveries.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_failures(&self, count: u64) {
        self.callback_failures.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of notifications received.
    pub fn notifications_received(&self) -> u64 {
        self.notifications_received.load(Ordering::Relaxed)
    }

    /// Returns the number of notifications discarded.
    pub fn notifications_discarded(&self) -> u64 {
        self.notifications_discarded.load(Ordering::Relaxed)
    }

    /// Returns the number of aggregate callback invocations.
    pub fn aggregate_invocations(&self) -> u64 {
        self.aggregate_invocations.load(Ordering::Relaxed)
    }

    /// Returns the number of per-object callback invocations.
    pub fn deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    /// Returns the number of failed callback invocations.
    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            notifications_received: self.notifications_received(),
            notifications_discarded: self.notifications_discarded(),
            aggregate_invocations: self.aggregate_invocations(),
            deliveries: self.deliveries(),
            callback_failures: self.callback_failures(),
        }
    }
}

/// A point-in-time copy of [`ObserverStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Notifications handed to the observer.
    pub notifications_received: u64,
    /// Notifications discarded.
    pub notifications_discarded: u64,
    /// Aggregate callback invocations.
    pub aggregate_invocations: u64,
    /// Per-object callback invocations.
    pub deliveries: u64,
    /// Failed callback invocations.
    pub callback_failures: u64,
}
