//! Property-based tests for delta compression and checksums.
//!
//! Every property runs over generated JSON trees that mix objects, arrays and scalars,
//! including keys that contain dots or look like array indices.

use proptest::prelude::*;
use serde_json::{Map, Value};
use turnsync::{apply_delta, compute_checksum, DeltaCompressor, StateDelta};

// ============================================================================
// Property Test Strategies
// ============================================================================

/// Keys biased towards collisions between the two generated trees.
fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("turn".to_owned()),
        Just("players".to_owned()),
        Just("0".to_owned()),
        Just("a.b".to_owned()),
        Just(String::new()),
        "[a-d]{1,3}",
    ]
}

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z ]{0,6}".prop_map(Value::String),
    ]
}

/// Arbitrary state trees up to four levels deep.
fn state_strategy() -> impl Strategy<Value = Value> {
    leaf_strategy().prop_recursive(4, 48, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map(key_strategy(), inner, 0..5)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Object roots, the shape a game state always has.
fn board_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(key_strategy(), state_strategy(), 0..6)
        .prop_map(|entries| Value::Object(entries.into_iter().collect()))
}

fn delta_between(before: &Value, after: &Value) -> Option<StateDelta> {
    let mut compressor = DeltaCompressor::new();
    assert!(compressor.calculate_delta(before).is_none());
    compressor.calculate_delta(after)
}

// ============================================================================
// Delta Properties
// ============================================================================

proptest! {
    /// Applying the delta from A to B onto A reproduces B.
    #[test]
    fn prop_apply_delta_reconstructs_target(before in board_strategy(), after in board_strategy()) {
        match delta_between(&before, &after) {
            Some(delta) => {
                let rebuilt = apply_delta(&before, &delta);
                prop_assert_eq!(&rebuilt, &after);
                prop_assert!(delta.verify(&rebuilt));
            },
            None => prop_assert_eq!(before, after),
        }
    }

    /// The same holds for non-object roots and type changes at the root.
    #[test]
    fn prop_apply_delta_handles_any_root(before in state_strategy(), after in state_strategy()) {
        if let Some(delta) = delta_between(&before, &after) {
            prop_assert_eq!(apply_delta(&before, &delta), after);
        }
    }

    /// Deltas survive the JSON wire format unchanged.
    #[test]
    fn prop_delta_survives_wire_format(before in board_strategy(), after in board_strategy()) {
        if let Some(delta) = delta_between(&before, &after) {
            let wire = serde_json::to_string(&delta).unwrap();
            let received: StateDelta = serde_json::from_str(&wire).unwrap();
            prop_assert_eq!(apply_delta(&before, &received), after);
        }
    }

    /// Feeding the same state twice yields no delta and no version bump.
    #[test]
    fn prop_repeated_state_is_idempotent(states in prop::collection::vec(board_strategy(), 1..6)) {
        let mut compressor = DeltaCompressor::new();
        let mut expected_version = 0;
        let mut previous: Option<&Value> = None;
        for state in &states {
            let delta = compressor.calculate_delta(state);
            let changed = previous.is_some_and(|p| p != state);
            prop_assert_eq!(delta.is_some(), changed);
            if changed {
                expected_version += 1;
            }
            prop_assert!(compressor.calculate_delta(state).is_none());
            prop_assert_eq!(compressor.version(), expected_version);
            previous = Some(state);
        }
    }

    /// Changes are listed in sorted path order.
    #[test]
    fn prop_changes_are_sorted(before in board_strategy(), after in board_strategy()) {
        if let Some(delta) = delta_between(&before, &after) {
            let paths: Vec<_> = delta.changes.iter().map(|c| c.path.clone()).collect();
            let mut sorted = paths.clone();
            sorted.sort();
            prop_assert_eq!(paths, sorted);
        }
    }
}

// ============================================================================
// Checksum Properties
// ============================================================================

proptest! {
    /// Equal trees hash equally however their objects were built.
    #[test]
    fn prop_checksum_ignores_insertion_order(state in board_strategy()) {
        let Value::Object(map) = &state else { unreachable!() };
        let reversed: Map<String, Value> =
            map.iter().rev().map(|(k, v)| (k.clone(), v.clone())).collect();
        prop_assert_eq!(compute_checksum(&state), compute_checksum(&Value::Object(reversed)));
    }

    /// The checksum is a pure function of the tree.
    #[test]
    fn prop_checksum_is_deterministic(state in state_strategy()) {
        let copy: Value = serde_json::from_str(&state.to_string()).unwrap();
        prop_assert_eq!(compute_checksum(&state), compute_checksum(&copy));
    }

    /// Checksums parse back from their rendered form.
    #[test]
    fn prop_checksum_text_round_trips(state in state_strategy()) {
        let checksum = compute_checksum(&state);
        let text = checksum.to_string();
        prop_assert_eq!(text.len(), 8);
        prop_assert_eq!(text.parse::<turnsync::Checksum>().unwrap(), checksum);
    }
}
