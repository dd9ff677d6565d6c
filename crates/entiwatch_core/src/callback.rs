//! Consumer callback types and guarded invocation.

use crate::error::CallbackResult;
use crate::mask::ChangeKind;
use crate::object::ObjectRef;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Per-object callback of a filtered observer.
///
/// Receives the change category, the object, and the effective changed keys
/// (empty for inserts and deletes).
pub type ChangeCallback =
    Arc<dyn Fn(ChangeKind, &ObjectRef, &[String]) -> CallbackResult + Send + Sync>;

/// Aggregate callback of an observer.
///
/// Receives the mask-scoped `(updated, inserted, deleted)` objects of one
/// notification.
pub type AggregateCallback =
    Arc<dyn Fn(&[ObjectRef], &[ObjectRef], &[ObjectRef]) -> CallbackResult + Send + Sync>;

/// Runs a consumer callback, turning both error returns and panics into an
/// error message.
pub(crate) fn run_guarded<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> CallbackResult,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("callback panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
