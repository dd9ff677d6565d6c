//! Error types for EntiWatch core.

use crate::mask::ChangeKind;
use crate::object::ObjectId;
use crate::types::RegistrationId;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type WatchResult<T> = Result<T, WatchError>;

/// Error returned by consumer callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by consumer callbacks.
pub type CallbackResult = Result<(), CallbackError>;

/// The callback a dispatch failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackTarget {
    /// The observer's aggregate callback.
    Aggregate,
    /// A filtered observer registered under the given id.
    Filtered(RegistrationId),
}

impl fmt::Display for CallbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregate => write!(f, "aggregate callback"),
            Self::Filtered(id) => write!(f, "filtered observer {id}"),
        }
    }
}

/// Errors that can occur in EntiWatch core operations.
#[derive(Debug, Error)]
pub enum WatchError {
    /// An object appears in more than one category of a change set.
    #[error("object {object_id} appears in more than one change category")]
    OverlappingChange {
        /// The offending object.
        object_id: ObjectId,
    },

    /// An object appears twice within one category of a change set.
    #[error("object {object_id} appears twice in the {kind} set")]
    DuplicateObject {
        /// The offending object.
        object_id: ObjectId,
        /// The category it was duplicated in.
        kind: ChangeKind,
    },

    /// A consumer callback returned an error or panicked.
    #[error("{target} failed{}: {message}", object_suffix(.object_id))]
    CallbackFailed {
        /// Which callback failed.
        target: CallbackTarget,
        /// The object being delivered, if any.
        object_id: Option<ObjectId>,
        /// Description of the failure.
        message: String,
    },

    /// No filtered observer is registered under the given id.
    #[error("filtered observer not found: {handle}")]
    ObserverNotFound {
        /// The unknown registration.
        handle: RegistrationId,
    },

    /// Declarative configuration could not be loaded.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },
}

fn object_suffix(object_id: &Option<ObjectId>) -> String {
    match object_id {
        Some(id) => format!(" for object {id}"),
        None => String::new(),
    }
}

impl WatchError {
    /// Creates an overlapping change error.
    pub fn overlapping_change(object_id: ObjectId) -> Self {
        Self::OverlappingChange { object_id }
    }

    /// Creates a duplicate object error.
    pub fn duplicate_object(object_id: ObjectId, kind: ChangeKind) -> Self {
        Self::DuplicateObject { object_id, kind }
    }

    /// Creates a callback failure error.
    pub fn callback_failed(
        target: CallbackTarget,
        object_id: Option<ObjectId>,
        message: impl Into<String>,
    ) -> Self {
        Self::CallbackFailed {
            target,
            object_id,
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if this error came from a consumer callback.
    #[must_use]
    pub fn is_callback_failure(&self) -> bool {
        matches!(self, Self::CallbackFailed { .. })
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}
