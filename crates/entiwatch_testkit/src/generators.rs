//! Property-based test generators using proptest.
//!
//! Provides strategies for change sets and filter configurations drawn
//! from small vocabularies, so generated filters hit generated objects
//! often enough to be interesting.

use crate::store::MemoryObject;
use entiwatch_core::{
    ChangeKind, ChangeMask, ChangeSet, FilterConfig, ObjectId, SequenceNumber, Value,
};
use proptest::prelude::*;

/// Type names used by generated objects.
pub const TYPE_NAMES: &[&str] = &["Order", "Customer", "Invoice"];

/// Attribute keys used by generated updates.
pub const KEYS: &[&str] = &["status", "total", "note", "updated_at"];

/// Strategy for generating a change category.
pub fn change_kind_strategy() -> impl Strategy<Value = ChangeKind> {
    prop::sample::select(ChangeKind::ALL.to_vec())
}

/// Strategy for generating any category mask, including the empty one.
pub fn change_mask_strategy() -> impl Strategy<Value = ChangeMask> {
    (0u8..8).prop_map(ChangeMask::from_bits)
}

/// Strategy for generating object identities.
pub fn object_id_strategy() -> impl Strategy<Value = ObjectId> {
    prop::array::uniform16(any::<u8>()).prop_map(ObjectId::from_bytes)
}

/// Strategy for generating a type name.
pub fn type_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(TYPE_NAMES).prop_map(str::to_string)
}

/// Strategy for generating a set of attribute keys.
pub fn key_set_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(KEYS, 0..=KEYS.len())
        .prop_map(|keys| keys.into_iter().map(str::to_string).collect())
}

/// One object of a generated change set.
#[derive(Debug, Clone)]
pub struct GeneratedChange {
    /// Category the object lands in.
    pub kind: ChangeKind,
    /// Type of the object.
    pub type_name: String,
    /// Value of the object's `total` attribute.
    pub total: i64,
    /// Changed keys, used for updates only.
    pub changed_keys: Vec<String>,
    /// Keys the object itself never reports.
    pub ignored_keys: Vec<String>,
}

/// Strategy for generating one object of a change set.
pub fn generated_change_strategy() -> impl Strategy<Value = GeneratedChange> {
    (
        change_kind_strategy(),
        type_name_strategy(),
        -100i64..100,
        key_set_strategy(),
        prop::sample::subsequence(KEYS, 0..=1),
    )
        .prop_map(|(kind, type_name, total, changed_keys, ignored)| GeneratedChange {
            kind,
            type_name,
            total,
            changed_keys,
            ignored_keys: ignored.into_iter().map(str::to_string).collect(),
        })
}

/// Builds a change set with one fresh object per entry.
///
/// # Panics
///
/// Never in practice: every object gets a fresh identity.
pub fn build_change_set(changes: &[GeneratedChange]) -> ChangeSet {
    let mut builder = ChangeSet::builder(SequenceNumber::new(1));
    for change in changes {
        let object = MemoryObject::new(change.type_name.as_str())
            .with_attribute("total", Value::Integer(change.total))
            .with_ignored_keys(change.ignored_keys.iter().cloned())
            .into_ref();
        builder = match change.kind {
            ChangeKind::Inserted => builder.insert(object),
            ChangeKind::Updated => builder.update(object, change.changed_keys.iter().cloned()),
            ChangeKind::Deleted => builder.delete(object),
        };
    }
    builder.build().expect("Generated objects are unique")
}

/// Strategy for generating a change set of up to `max_objects` objects.
pub fn change_set_strategy(max_objects: usize) -> impl Strategy<Value = ChangeSet> {
    prop::collection::vec(generated_change_strategy(), 0..=max_objects)
        .prop_map(|changes| build_change_set(&changes))
}

/// Strategy for generating a filter configuration.
pub fn filter_config_strategy() -> impl Strategy<Value = FilterConfig> {
    (
        change_mask_strategy(),
        prop::option::of(prop::sample::subsequence(TYPE_NAMES, 1..=TYPE_NAMES.len())),
        prop::option::of(key_set_strategy()),
        any::<bool>(),
    )
        .prop_map(|(mask, types, ignored, report_empty)| FilterConfig {
            mask,
            type_names: types.map(|t| t.into_iter().map(str::to_string).collect()),
            identities: None,
            ignored_keys: ignored,
            report_updates_without_changes: report_empty,
            active: true,
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn change_set_categories_are_disjoint(changes in change_set_strategy(12)) {
            let total =
                changes.inserted().len() + changes.updated().len() + changes.deleted().len();
            prop_assert_eq!(changes.len(), total);
            for object in changes.inserted() {
                prop_assert_eq!(changes.kind_of(object.object_id()), Some(ChangeKind::Inserted));
            }
        }

        #[test]
        fn mask_stays_within_known_bits(mask in change_mask_strategy()) {
            prop_assert_eq!(mask.bits() & !ChangeMask::ALL.bits(), 0);
        }

        #[test]
        fn filter_config_types_are_known(config in filter_config_strategy()) {
            if let Some(types) = &config.type_names {
                prop_assert!(!types.is_empty());
                prop_assert!(types.iter().all(|t| TYPE_NAMES.contains(&t.as_str())));
            }
        }
    }
}
