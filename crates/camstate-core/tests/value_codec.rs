// crates/camstate-core/tests/value_codec.rs
// ============================================================================
// Module: State Value Codec Property Tests
// Description: JSON conversion of state values under generated inputs.
// ============================================================================
//! ## Overview
//! Generated values survive the JSON string form unchanged, and generated
//! JSON containing `null` is always rejected.

#![allow(
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only assertions and helpers are permitted."
)]

use camstate_core::StateValue;
use camstate_core::ValueError;
use proptest::prelude::*;

fn state_value() -> impl Strategy<Value = StateValue> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(StateValue::Bool),
        any::<i64>().prop_map(StateValue::Int),
        (-1.0e12f64 .. 1.0e12f64).prop_map(StateValue::Float),
        "[a-zA-Z0-9 #_-]{0,16}".prop_map(StateValue::Text),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0 .. 6).prop_map(StateValue::List),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0 .. 6).prop_map(StateValue::Map),
        ]
    })
}

/// Floats with an integral value decode as integers, so compare through JSON.
fn normalized(value: &StateValue) -> serde_json::Value {
    value.to_json().unwrap()
}

proptest! {
    #[test]
    fn json_string_round_trip_preserves_value(value in state_value()) {
        let text = value.to_json_string().unwrap();
        let decoded = StateValue::from_json_str(&text).unwrap();
        prop_assert_eq!(normalized(&decoded).to_string(), text);
    }

    #[test]
    fn null_anywhere_is_rejected(depth in 0usize .. 4) {
        let mut json = serde_json::Value::Null;
        for _ in 0 .. depth {
            json = serde_json::json!({ "k": [json] });
        }
        prop_assert_eq!(StateValue::from_json(json), Err(ValueError::Null));
    }
}
