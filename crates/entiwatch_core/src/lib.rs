//! # EntiWatch Core
//!
//! Change-set filtering and dispatch for transactional object stores.
//!
//! This crate provides:
//! - [`ChangeSet`]: the inserted/updated/deleted objects of one commit
//! - [`FilterCriteria`] and [`FilteredObserver`]: declarative per-object
//!   subscriptions by category, type, identity, predicate and changed keys
//! - [`Observer`]: context/mask scoping, an aggregate callback and ordered
//!   dispatch to filtered observers with per-callback failure isolation
//! - [`NotificationCenter`]: the in-process fan-out point the persistence
//!   layer posts committed change sets to
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entiwatch_core::prelude::*;
//!
//! let center = Arc::new(NotificationCenter::new());
//! let observer = Observer::new(&center, ObserverConfig::new().required_context(ctx));
//!
//! observer.add_filtered_observer(FilteredObserver::new(
//!     FilterCriteria::new()
//!         .with_type("Order")
//!         .with_ignored_keys(["updated_at"]),
//!     |kind, order, keys| {
//!         println!("{kind} {} {keys:?}", order.object_id());
//!         Ok(())
//!     },
//! ));
//!
//! // the persistence layer, after each commit:
//! center.post(ctx, &changes);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callback;
mod change_set;
mod config;
mod criteria;
mod error;
mod filtered;
mod mask;
mod notification;
mod object;
mod observer;
mod stats;
mod types;

pub use callback::{AggregateCallback, ChangeCallback};
pub use change_set::{ChangeSet, ChangeSetBuilder, UpdatedObject};
pub use config::ObserverConfig;
pub use criteria::{FilterConfig, FilterCriteria, Match, Predicate};
pub use error::{CallbackError, CallbackResult, CallbackTarget, WatchError, WatchResult};
pub use filtered::{CallbackFailure, EvaluationReport, FilteredObserver};
pub use mask::{ChangeKind, ChangeMask};
pub use notification::{ChangeListener, NotificationCenter, Subscription};
pub use object::{ObjectId, ObjectRef, TrackedObject, Value};
pub use observer::{DiscardReason, DispatchOutcome, DispatchReport, Observer};
pub use stats::{ObserverStats, StatsSnapshot};
pub use types::{ContextId, RegistrationId, SequenceNumber, SubscriptionId};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CallbackResult, ChangeKind, ChangeMask, ChangeSet, ContextId, FilterCriteria,
        FilteredObserver, NotificationCenter, ObjectId, ObjectRef, Observer, ObserverConfig,
        SequenceNumber, TrackedObject, Value, WatchError, WatchResult,
    };
    pub use std::sync::Arc;
}
