//! Filter criteria for filtered observers.
//!
//! Criteria decide which objects of a change set a filtered observer is told
//! about. Matching runs per category in the order inserted, updated, deleted:
//!
//! 1. Categories outside `mask` are skipped entirely.
//! 2. Updated objects lose every changed key listed in `ignored_keys` or in
//!    the object's own [`TrackedObject::ignored_keys`]. If nothing is left and
//!    `report_updates_without_changes` is false, the object is dropped.
//! 3. If `type_names` or `identities` is set, the object must match at least
//!    one of them. A type-name match only counts if the type's scoped
//!    predicate (see [`FilterCriteria::with_type_predicate`]) holds.
//! 4. If `predicate` is set, the object must satisfy it.
//!
//! # Predicates
//!
//! Predicates receive every candidate that reaches step 4, whatever its type.
//! A predicate that assumes attributes only some types have must be paired
//! with a `type_names` or `identities` restriction (or written as a
//! type-scoped predicate). The engine does not guard against this.

use crate::change_set::{ChangeSet, UpdatedObject};
use crate::error::WatchResult;
use crate::mask::{ChangeKind, ChangeMask};
use crate::object::{ObjectId, ObjectRef, TrackedObject};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Boolean test over a tracked object.
pub type Predicate = Arc<dyn Fn(&dyn TrackedObject) -> bool + Send + Sync>;

/// One object selected by a filter, with the keys to report.
#[derive(Debug, Clone)]
pub struct Match {
    /// The category the object was found in.
    pub kind: ChangeKind,
    /// The matching object.
    pub object: ObjectRef,
    /// Effective changed keys for updates, empty otherwise.
    pub keys: Vec<String>,
}

/// Configuration of a filtered observer.
#[derive(Clone)]
pub struct FilterCriteria {
    /// Which change categories are wanted.
    pub mask: ChangeMask,
    /// Restrict to objects of these types.
    pub type_names: Option<HashSet<String>>,
    /// Restrict to objects with these identities.
    pub identities: Option<HashSet<ObjectId>>,
    /// Objects must satisfy this predicate.
    pub predicate: Option<Predicate>,
    /// Per-type predicates consulted when an object matches by type name.
    pub type_predicates: HashMap<String, Predicate>,
    /// Changed keys that do not justify an update notification.
    pub ignored_keys: Option<HashSet<String>>,
    /// Report updates whose effective keys are empty.
    pub report_updates_without_changes: bool,
    /// Inactive criteria match nothing.
    pub active: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            mask: ChangeMask::ALL,
            type_names: None,
            identities: None,
            predicate: None,
            type_predicates: HashMap::new(),
            ignored_keys: None,
            report_updates_without_changes: false,
            active: true,
        }
    }
}

impl fmt::Debug for FilterCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterCriteria")
            .field("mask", &self.mask)
            .field("type_names", &self.type_names)
            .field("identities", &self.identities)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .field(
                "type_predicates",
                &self.type_predicates.keys().collect::<Vec<_>>(),
            )
            .field("ignored_keys", &self.ignored_keys)
            .field(
                "report_updates_without_changes",
                &self.report_updates_without_changes,
            )
            .field("active", &self.active)
            .finish()
    }
}

impl FilterCriteria {
    /// Creates criteria that match every object in every category.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates criteria restricted to the given identities.
    #[must_use]
    pub fn for_ids<I: IntoIterator<Item = ObjectId>>(ids: I) -> Self {
        Self::new().with_identities(ids)
    }

    /// Sets the category mask.
    #[must_use]
    pub fn with_mask(mut self, mask: impl Into<ChangeMask>) -> Self {
        self.mask = mask.into();
        self
    }

    /// Restricts to the given type names, replacing any previous set.
    #[must_use]
    pub fn with_type_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Adds one type name to the type restriction.
    #[must_use]
    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.type_names
            .get_or_insert_with(HashSet::new)
            .insert(name.into());
        self
    }

    /// Adds a type name whose matches must also satisfy `predicate`.
    #[must_use]
    pub fn with_type_predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&dyn TrackedObject) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        self.type_names
            .get_or_insert_with(HashSet::new)
            .insert(name.clone());
        self.type_predicates.insert(name, Arc::new(predicate));
        self
    }

    /// Restricts to the given identities, replacing any previous set.
    #[must_use]
    pub fn with_identities<I: IntoIterator<Item = ObjectId>>(mut self, ids: I) -> Self {
        self.identities = Some(ids.into_iter().collect());
        self
    }

    /// Adds one identity to the identity restriction.
    #[must_use]
    pub fn with_identity(mut self, id: ObjectId) -> Self {
        self.identities.get_or_insert_with(HashSet::new).insert(id);
        self
    }

    /// Sets the global predicate.
    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn TrackedObject) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets the keys that do not justify an update notification.
    #[must_use]
    pub fn with_ignored_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Sets whether updates without effective keys are reported.
    #[must_use]
    pub fn report_updates_without_changes(mut self, value: bool) -> Self {
        self.report_updates_without_changes = value;
        self
    }

    /// Sets whether the criteria are active.
    #[must_use]
    pub fn active(mut self, value: bool) -> Self {
        self.active = value;
        self
    }

    /// Returns the changed keys of `entry` that are not ignored.
    #[must_use]
    pub fn effective_keys(&self, entry: &UpdatedObject) -> Vec<String> {
        let per_object = entry.object().ignored_keys();
        entry
            .changed_keys()
            .iter()
            .filter(|key| {
                !self
                    .ignored_keys
                    .as_ref()
                    .is_some_and(|ignored| ignored.contains(key.as_str()))
                    && !per_object.contains(*key)
            })
            .cloned()
            .collect()
    }

    /// Applies the type/identity restriction.
    #[must_use]
    pub fn matches_scope(&self, object: &dyn TrackedObject) -> bool {
        if self.type_names.is_none() && self.identities.is_none() {
            return true;
        }

        let by_identity = self
            .identities
            .as_ref()
            .is_some_and(|ids| ids.contains(&object.object_id()));
        if by_identity {
            return true;
        }

        let type_name = object.type_name();
        self.type_names
            .as_ref()
            .is_some_and(|names| names.contains(type_name))
            && self
                .type_predicates
                .get(type_name)
                .map_or(true, |predicate| predicate(object))
    }

    /// Applies the global predicate.
    #[must_use]
    pub fn matches_predicate(&self, object: &dyn TrackedObject) -> bool {
        self.predicate
            .as_ref()
            .map_or(true, |predicate| predicate(object))
    }

    /// Returns true if `object` passes the scope and predicate filters.
    #[must_use]
    pub fn is_observed(&self, object: &dyn TrackedObject) -> bool {
        self.matches_scope(object) && self.matches_predicate(object)
    }

    /// Selects the objects of `changes` these criteria match, in dispatch order.
    #[must_use]
    pub fn select(&self, changes: &ChangeSet) -> Vec<Match> {
        let mut matches = Vec::new();
        if !self.active {
            return matches;
        }

        for kind in self.mask.kinds() {
            match kind {
                ChangeKind::Inserted => {
                    self.select_plain(kind, changes.inserted(), &mut matches);
                }
                ChangeKind::Updated => {
                    for entry in changes.updated() {
                        let keys = self.effective_keys(entry);
                        if keys.is_empty() && !self.report_updates_without_changes {
                            continue;
                        }
                        if self.is_observed(entry.object().as_ref()) {
                            matches.push(Match {
                                kind,
                                object: entry.object().clone(),
                                keys,
                            });
                        }
                    }
                }
                ChangeKind::Deleted => {
                    self.select_plain(kind, changes.deleted(), &mut matches);
                }
            }
        }
        matches
    }

    fn select_plain(&self, kind: ChangeKind, objects: &[ObjectRef], out: &mut Vec<Match>) {
        out.extend(
            objects
                .iter()
                .filter(|object| self.is_observed(object.as_ref()))
                .map(|object| Match {
                    kind,
                    object: object.clone(),
                    keys: Vec::new(),
                }),
        );
    }
}

/// Declarative, serializable form of [`FilterCriteria`].
///
/// Predicates cannot be expressed here; attach them to the converted criteria.
///
/// ```json
/// {
///   "mask": ["inserted", "updated"],
///   "type_names": ["Order"],
///   "ignored_keys": ["updated_at"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Which change categories are wanted.
    pub mask: ChangeMask,
    /// Restrict to objects of these types.
    pub type_names: Option<Vec<String>>,
    /// Restrict to objects with these identities.
    pub identities: Option<Vec<ObjectId>>,
    /// Changed keys that do not justify an update notification.
    pub ignored_keys: Option<Vec<String>>,
    /// Report updates whose effective keys are empty.
    pub report_updates_without_changes: bool,
    /// Whether the filter starts active.
    pub active: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mask: ChangeMask::ALL,
            type_names: None,
            identities: None,
            ignored_keys: None,
            report_updates_without_changes: false,
            active: true,
        }
    }
}

impl FilterConfig {
    /// Parses a filter configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the JSON is malformed or has unknown fields.
    pub fn from_json(json: &str) -> WatchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<FilterConfig> for FilterCriteria {
    fn from(config: FilterConfig) -> Self {
        Self {
            mask: config.mask,
            type_names: config.type_names.map(|v| v.into_iter().collect()),
            identities: config.identities.map(|v| v.into_iter().collect()),
            predicate: None,
            type_predicates: HashMap::new(),
            ignored_keys: config.ignored_keys.map(|v| v.into_iter().collect()),
            report_updates_without_changes: config.report_updates_without_changes,
            active: config.active,
        }
    }
}
