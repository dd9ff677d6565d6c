//! Observer configuration.

use crate::error::WatchResult;
use crate::mask::ChangeMask;
use crate::types::ContextId;
use serde::{Deserialize, Serialize};

/// Configuration for an [`Observer`](crate::Observer).
///
/// Loadable from JSON:
///
/// ```json
/// { "required_context": "6f1c...", "mask": ["inserted", "deleted"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverConfig {
    /// Only notifications from this context are handled. `None` observes all
    /// contexts.
    pub required_context: Option<ContextId>,

    /// Categories kept before any callback runs.
    pub mask: ChangeMask,

    /// Whether the observer starts active.
    pub active: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            required_context: None,
            mask: ChangeMask::ALL,
            active: true,
        }
    }
}

impl ObserverConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the observer to one context.
    #[must_use]
    pub const fn required_context(mut self, context: ContextId) -> Self {
        self.required_context = Some(context);
        self
    }

    /// Sets the category mask.
    #[must_use]
    pub const fn mask(mut self, mask: ChangeMask) -> Self {
        self.mask = mask;
        self
    }

    /// Sets whether the observer starts active.
    #[must_use]
    pub const fn active(mut self, value: bool) -> Self {
        self.active = value;
        self
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the JSON is malformed or has unknown fields.
    pub fn from_json(json: &str) -> WatchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ObserverConfig::default();
        assert!(config.required_context.is_none());
        assert_eq!(config.mask, ChangeMask::ALL);
        assert!(config.active);
    }

    #[test]
    fn builder_pattern() {
        let ctx = ContextId::new();
        let config = ObserverConfig::new()
            .required_context(ctx)
            .mask(ChangeMask::DELETED)
            .active(false);

        assert_eq!(config.required_context, Some(ctx));
        assert_eq!(config.mask, ChangeMask::DELETED);
        assert!(!config.active);
    }

    #[test]
    fn from_json() {
        let ctx = ContextId::new();
        let json = format!(
            r#"{{"required_context": "{}", "mask": ["inserted", "deleted"]}}"#,
            ctx.as_uuid()
        );
        let config = ObserverConfig::from_json(&json).unwrap();
        assert_eq!(config.required_context, Some(ctx));
        assert_eq!(config.mask, ChangeMask::INSERTED | ChangeMask::DELETED);
        assert!(config.active);
    }

    #[test]
    fn from_json_empty_object_is_default() {
        assert_eq!(
            ObserverConfig::from_json("{}").unwrap(),
            ObserverConfig::default()
        );
    }
}
