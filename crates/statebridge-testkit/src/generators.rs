//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{json, Value};

use statebridge_core::{EntityKey, RegistrationId, Snapshot};

/// Generate a plausible entity key.
pub fn entity_key() -> impl Strategy<Value = EntityKey> {
    "[a-z][a-z0-9-]{0,24}".prop_map(EntityKey::new)
}

/// Generate a plausible registration id.
pub fn registration_id() -> impl Strategy<Value = RegistrationId> {
    "[a-z][a-z0-9-]{0,24}".prop_map(RegistrationId::new)
}

/// Generate an arbitrary structurally-serializable value, up to a couple of
/// levels of nesting.
pub fn value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(2, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| json!(m)),
        ]
    })
}

/// Generate a revision number.
pub fn revision() -> impl Strategy<Value = u64> {
    0u64..1_000_000
}

/// Generate a snapshot for one key.
pub fn snapshot() -> impl Strategy<Value = Snapshot> {
    (entity_key(), revision(), value()).prop_map(|(key, revision, value)| {
        Snapshot::new(key, revision, value)
    })
}

/// Generate a sequence of distinct revisions in arbitrary delivery order.
pub fn shuffled_revisions(max_len: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::btree_set(revision(), 1..=max_len)
        .prop_flat_map(|set| Just(set.into_iter().collect::<Vec<_>>()).prop_shuffle())
}
