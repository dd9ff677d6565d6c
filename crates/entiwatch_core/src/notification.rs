//! Notification center for committed change sets.
//!
//! The persistence layer posts one `(source context, change set)` pair per
//! committed transaction. The center hands it synchronously to every live
//! listener on the posting thread.
//!
//! # Usage
//!
//! ```rust,ignore
//! use entiwatch_core::{NotificationCenter, Observer, ObserverConfig};
//!
//! let center = Arc::new(NotificationCenter::new());
//! let observer = Observer::new(&center, ObserverConfig::default());
//!
//! // after each commit
//! center.post(context_id, &changes);
//! ```

use crate::change_set::ChangeSet;
use crate::types::{ContextId, SequenceNumber, SubscriptionId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Receiver of raw change notifications.
pub trait ChangeListener: Send + Sync {
    /// Called once per posted change set.
    fn on_change(&self, source: ContextId, changes: &ChangeSet);
}

/// Distributes committed change sets to listeners.
///
/// The center:
/// - Holds listeners weakly; it never keeps one alive
/// - Delivers in subscription order
/// - Is thread-safe; no lock is held while listeners run
#[derive(Default)]
pub struct NotificationCenter {
    /// Subscribed listeners.
    listeners: RwLock<Vec<(SubscriptionId, Weak<dyn ChangeListener>)>>,
    /// Next subscription id.
    next_id: AtomicU64,
    /// Highest sequence number posted so far.
    latest_sequence: AtomicU64,
    /// Number of change sets posted.
    posted: AtomicU64,
}

impl NotificationCenter {
    /// Creates an empty notification center.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a listener.
    ///
    /// The returned [`Subscription`] unsubscribes when dropped.
    pub fn subscribe(self: &Arc<Self>, listener: Weak<dyn ChangeListener>) -> Subscription {
        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners.write().push((id, listener));
        debug!(subscription = %id, "listener subscribed");
        Subscription {
            center: Arc::downgrade(self),
            id,
        }
    }

    /// Removes a subscription. Returns false if it was not present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(subscription = %id, "listener unsubscribed");
        }
        removed
    }

    /// Posts a change set to every live listener.
    ///
    /// Returns the number of listeners notified. Listeners that have been
    /// dropped are pruned.
    pub fn post(&self, source: ContextId, changes: &ChangeSet) -> usize {
        self.posted.fetch_add(1, Ordering::Relaxed);
        self.latest_sequence
            .fetch_max(changes.sequence().as_u64(), Ordering::Relaxed);

        let (live, dead) = {
            let listeners = self.listeners.read();
            let mut live = Vec::with_capacity(listeners.len());
            let mut dead = Vec::new();
            for (id, weak) in listeners.iter() {
                match weak.upgrade() {
                    Some(listener) => live.push(listener),
                    None => dead.push(*id),
                }
            }
            (live, dead)
        };

        if !dead.is_empty() {
            self.listeners
                .write()
                .retain(|(id, _)| !dead.contains(id));
            debug!(pruned = dead.len(), "pruned dropped listeners");
        }

        debug!(
            source = %source,
            sequence = %changes.sequence(),
            objects = changes.len(),
            listeners = live.len(),
            "posting change set"
        );
        for listener in &live {
            listener.on_change(source, changes);
        }
        live.len()
    }

    /// Returns the number of subscriptions, including ones whose listener
    /// has been dropped but not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns the highest sequence number posted so far.
    pub fn latest_sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.latest_sequence.load(Ordering::Relaxed))
    }

    /// Returns the number of change sets posted.
    pub fn posted_count(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("subscribers", &self.subscriber_count())
            .field("latest_sequence", &self.latest_sequence())
            .field("posted", &self.posted_count())
            .finish()
    }
}

/// A subscription handle.
///
/// When dropped, the subscription is removed from its center.
#[derive(Debug)]
pub struct Subscription {
    center: Weak<NotificationCenter>,
    id: SubscriptionId,
}

impl Subscription {
    /// Returns the subscription id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(center) = self.center.upgrade() {
            center.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::thread;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(ContextId, SequenceNumber)>>,
    }

    impl ChangeListener for Recorder {
        fn on_change(&self, source: ContextId, changes: &ChangeSet) {
            self.seen.lock().push((source, changes.sequence()));
        }
    }

    fn listen(center: &Arc<NotificationCenter>) -> (Arc<Recorder>, Subscription) {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn ChangeListener> = Arc::downgrade(&recorder) as Weak<dyn ChangeListener>;
        let sub = center.subscribe(weak);
        (recorder, sub)
    }

    #[test]
    fn post_reaches_all_listeners() {
        let center = Arc::new(NotificationCenter::new());
        let (r1, _s1) = listen(&center);
        let (r2, _s2) = listen(&center);
        let ctx = ContextId::new();

        let notified = center.post(ctx, &ChangeSet::empty(SequenceNumber::new(4)));
        assert_eq!(notified, 2);
        assert_eq!(*r1.seen.lock(), vec![(ctx, SequenceNumber::new(4))]);
        assert_eq!(*r2.seen.lock(), vec![(ctx, SequenceNumber::new(4))]);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let center = Arc::new(NotificationCenter::new());
        let (recorder, sub) = listen(&center);
        assert_eq!(center.subscriber_count(), 1);

        drop(sub);
        assert_eq!(center.subscriber_count(), 0);

        center.post(ContextId::new(), &ChangeSet::empty(SequenceNumber::new(1)));
        assert!(recorder.seen.lock().is_empty());
    }

    #[test]
    fn dropped_listener_is_pruned() {
        let center = Arc::new(NotificationCenter::new());
        let (recorder, _sub) = listen(&center);
        drop(recorder);

        let notified = center.post(ContextId::new(), &ChangeSet::empty(SequenceNumber::new(1)));
        assert_eq!(notified, 0);
        assert_eq!(center.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_unknown_id() {
        let center = NotificationCenter::new();
        assert!(!center.unsubscribe(SubscriptionId::new(99)));
    }

    #[test]
    fn latest_sequence_tracks_maximum() {
        let center = NotificationCenter::new();
        assert_eq!(center.latest_sequence(), SequenceNumber::new(0));

        center.post(ContextId::new(), &ChangeSet::empty(SequenceNumber::new(5)));
        center.post(ContextId::new(), &ChangeSet::empty(SequenceNumber::new(3)));
        assert_eq!(center.latest_sequence(), SequenceNumber::new(5));
        assert_eq!(center.posted_count(), 2);
    }

    #[test]
    fn threaded_post() {
        let center = Arc::new(NotificationCenter::new());
        let (recorder, _sub) = listen(&center);

        let handles: Vec<_> = (1..=4)
            .map(|i| {
                let center = Arc::clone(&center);
                thread::spawn(move || {
                    center.post(ContextId::new(), &ChangeSet::empty(SequenceNumber::new(i)));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(recorder.seen.lock().len(), 4);
        assert_eq!(center.latest_sequence(), SequenceNumber::new(4));
    }
}
