//! Tracked objects as seen by the engine.
//!
//! Objects are owned by the persistence layer. The engine only holds shared
//! references to them for the duration of a dispatch and reads their
//! identity, type name and (through predicates) attribute values.

mod id;
mod value;

pub use id::ObjectId;
pub use value::Value;

use std::fmt;
use std::sync::Arc;

/// A mutable entity owned by the persistence layer.
///
/// Implementations must keep `object_id` stable for the lifetime of the
/// object. `attribute` returns the current value and may be called by
/// predicates during dispatch.
pub trait TrackedObject: Send + Sync + fmt::Debug {
    /// Returns the stable identity of this object.
    fn object_id(&self) -> ObjectId;

    /// Returns the type classification (schema or entity name).
    fn type_name(&self) -> &str;

    /// Returns the current value of an attribute, if it exists.
    fn attribute(&self, key: &str) -> Option<Value>;

    /// Keys whose changes never justify an update notification for this
    /// object, in addition to any keys ignored by the observer.
    fn ignored_keys(&self) -> &[String] {
        &[]
    }
}

/// Shared reference to a tracked object.
pub type ObjectRef = Arc<dyn TrackedObject>;
