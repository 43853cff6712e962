//! Delta compression between successive state snapshots.
//!
//! A [`DeltaCompressor`] remembers exactly one baseline snapshot. Each call to
//! [`calculate_delta`](DeltaCompressor::calculate_delta) diffs the new state against that
//! baseline leaf by leaf, and only if something changed does it advance the version, adopt
//! the new state as baseline and return a [`StateDelta`]. Peers rebuild the new state with
//! [`apply_delta`].
//!
//! # Diff rules
//!
//! - Object keys present on both sides are recursed into; a key present on only one side is
//!   reported once, with its whole subtree as the value.
//! - Arrays are compared index by index up to the longer length; the length difference
//!   becomes add/remove changes at the tail.
//! - Everything else (scalars, `null`, or a node whose type changed) is a leaf, reported iff
//!   the values differ. `null` is never descended into.
//!
//! ```
//! use serde_json::json;
//! use turnsync::delta::{apply_delta, DeltaCompressor};
//!
//! let mut compressor = DeltaCompressor::new();
//! let before = json!({ "turn": 1, "tokens": [0, 0] });
//! assert!(compressor.calculate_delta(&before).is_none()); // baseline only
//!
//! let after = json!({ "turn": 2, "tokens": [0, 5] });
//! let delta = compressor.calculate_delta(&after).unwrap();
//! assert_eq!(delta.version, 1);
//! assert_eq!(delta.changes.len(), 2);
//! assert_eq!(apply_delta(&before, &delta), after);
//! ```

pub mod path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::checksum::{compute_checksum, Checksum};
use crate::clock::millis_since_epoch;
use crate::telemetry::{
    report_to_observer, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};

pub use path::{Path, PathSegment};

/// One leaf-level change.
///
/// `old_value` is `None` for an added leaf, `new_value` is `None` for a removed leaf. A leaf
/// that *is* `null` is `Some(Value::Null)`; on the wire an absent side is an omitted field,
/// never `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaChange {
    /// Where the change happened.
    pub path: Path,
    /// The baseline value, if the leaf existed before.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub old_value: Option<Value>,
    /// The new value, if the leaf still exists.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub new_value: Option<Value>,
}

/// A field that is present always deserializes to `Some`, even when it is `null`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// A versioned set of changes from one snapshot to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Strictly increasing, contiguous per compressor, starting at 1.
    pub version: u64,
    /// Wall-clock milliseconds since the UNIX epoch when the delta was computed.
    pub timestamp: u64,
    /// The leaf-level changes, in deterministic (sorted key, ascending index) order.
    pub changes: Vec<DeltaChange>,
    /// Checksum of the full state the delta leads to.
    pub checksum: Checksum,
}

impl StateDelta {
    /// Returns whether `state` (typically the result of [`apply_delta`]) matches the
    /// checksum this delta was computed with.
    #[must_use]
    pub fn verify(&self, state: &Value) -> bool {
        compute_checksum(state) == self.checksum
    }
}

/// Computes deltas against a single retained baseline.
#[derive(Debug, Clone, Default)]
pub struct DeltaCompressor {
    baseline: Option<Value>,
    version: u64,
}

impl DeltaCompressor {
    /// Creates a compressor with no baseline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Diffs `new_state` against the baseline.
    ///
    /// Returns `None` on the first call (the state becomes the baseline) and whenever nothing
    /// changed (the version does not advance). Otherwise the version advances by one and
    /// `new_state` replaces the baseline.
    pub fn calculate_delta(&mut self, new_state: &Value) -> Option<StateDelta> {
        let Some(baseline) = &self.baseline else {
            self.baseline = Some(new_state.clone());
            return None;
        };

        let mut changes = Vec::new();
        diff(&Path::root(), baseline, new_state, &mut changes);
        if changes.is_empty() {
            return None;
        }

        self.version += 1;
        self.baseline = Some(new_state.clone());
        Some(StateDelta {
            version: self.version,
            timestamp: millis_since_epoch(),
            changes,
            checksum: compute_checksum(new_state),
        })
    }

    /// The version of the most recently emitted delta (0 if none).
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The retained baseline, if any.
    #[must_use]
    pub fn baseline(&self) -> Option<&Value> {
        self.baseline.as_ref()
    }

    /// Returns true once a baseline has been recorded.
    #[must_use]
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Drops the baseline and the version counter.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.version = 0;
    }
}

fn diff(path: &Path, old: &Value, new: &Value, out: &mut Vec<DeltaChange>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
            for key in keys {
                let child = path.child(key.as_str());
                match (old_map.get(key), new_map.get(key)) {
                    (Some(o), Some(n)) => diff(&child, o, n, out),
                    (Some(o), None) => out.push(DeltaChange {
                        path: child,
                        old_value: Some(o.clone()),
                        new_value: None,
                    }),
                    (None, Some(n)) => out.push(DeltaChange {
                        path: child,
                        old_value: None,
                        new_value: Some(n.clone()),
                    }),
                    (None, None) => {},
                }
            }
        },
        (Value::Array(old_items), Value::Array(new_items)) => {
            for index in 0..old_items.len().max(new_items.len()) {
                let child = path.child(index);
                match (old_items.get(index), new_items.get(index)) {
                    (Some(o), Some(n)) => diff(&child, o, n, out),
                    (Some(o), None) => out.push(DeltaChange {
                        path: child,
                        old_value: Some(o.clone()),
                        new_value: None,
                    }),
                    (None, Some(n)) => out.push(DeltaChange {
                        path: child,
                        old_value: None,
                        new_value: Some(n.clone()),
                    }),
                    (None, None) => {},
                }
            }
        },
        _ => {
            if old != new {
                out.push(DeltaChange {
                    path: path.clone(),
                    old_value: Some(old.clone()),
                    new_value: Some(new.clone()),
                });
            }
        },
    }
}

/// How far past the end of an array a change may write, padding the gap with `null`.
///
/// Deltas produced by [`DeltaCompressor`] only ever append at the current length. Changes
/// reaching further are skipped.
pub const MAX_INDEX_GAP: usize = 64;

/// Applies `delta` to a copy of `base` and returns the result.
///
/// Missing intermediate containers are created, choosing an array when the next segment is
/// an index and an object otherwise; arrays are padded with `null` up to a new index, at most
/// [`MAX_INDEX_GAP`] past their end. Removing an array element truncates the array at that
/// index (deltas only ever remove from the tail). A scalar found where a container is needed
/// is replaced by one, and a change whose index lies beyond the gap is skipped; both are
/// reported as [`ViolationKind::DeltaApply`] warnings. This never panics.
#[must_use]
pub fn apply_delta(base: &Value, delta: &StateDelta) -> Value {
    apply_delta_with_observer(base, delta, None)
}

/// Like [`apply_delta`], but reports anomalies to `observer` instead of the tracing log.
#[must_use]
pub fn apply_delta_with_observer(
    base: &Value,
    delta: &StateDelta,
    observer: Option<&Arc<dyn ViolationObserver>>,
) -> Value {
    let mut state = base.clone();
    for change in &delta.changes {
        let target = Target {
            path: &change.path,
            observer,
        };
        target.apply(&mut state, change.path.segments(), change.new_value.as_ref());
    }
    state
}

fn empty_container_for(next: &PathSegment) -> Value {
    if next.is_index() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}

fn object_key(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Key(key) => key.clone(),
        PathSegment::Index(index) => index.to_string(),
    }
}

/// Whether `index` is close enough to the end of `items` to be padded to.
fn within_gap(items: &[Value], index: usize) -> bool {
    index.saturating_sub(items.len()) <= MAX_INDEX_GAP
}

/// One change being applied.
struct Target<'a> {
    path: &'a Path,
    observer: Option<&'a Arc<dyn ViolationObserver>>,
}

impl Target<'_> {
    fn report(&self, message: String) {
        let violation = InvariantViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::DeltaApply,
            message,
            concat!(file!(), ":", line!()),
        )
        .with_context("path", self.path.to_string());
        report_to_observer(self.observer, &violation);
    }

    /// Makes `node` a container that `segment` can address, replacing it if necessary.
    fn ensure_container(&self, node: &mut Value, segment: &PathSegment) {
        let fits = match node {
            Value::Object(_) => true,
            Value::Array(_) => segment.is_index(),
            _ => false,
        };
        if !fits {
            self.report(format!("replacing non-container {}", node));
            *node = empty_container_for(segment);
        }
    }

    fn apply(&self, node: &mut Value, segments: &[PathSegment], new_value: Option<&Value>) {
        let Some((head, rest)) = segments.split_first() else {
            *node = new_value.cloned().unwrap_or(Value::Null);
            return;
        };
        self.ensure_container(node, head);

        if let Some(next) = rest.first() {
            let child = match (node, head) {
                (Value::Object(map), _) => map
                    .entry(object_key(head))
                    .or_insert_with(|| empty_container_for(next)),
                (Value::Array(items), PathSegment::Index(index)) => {
                    if *index >= items.len() {
                        if !within_gap(items, *index) {
                            self.report(format!(
                                "skipping index {} past array of length {}",
                                index,
                                items.len()
                            ));
                            return;
                        }
                        items.resize(*index, Value::Null);
                        items.push(empty_container_for(next));
                    }
                    &mut items[*index]
                },
                // ensure_container guarantees one of the arms above
                _ => return,
            };
            self.apply(child, rest, new_value);
            return;
        }

        match (node, head, new_value) {
            (Value::Object(map), _, Some(value)) => {
                map.insert(object_key(head), value.clone());
            },
            (Value::Object(map), _, None) => {
                map.remove(&object_key(head));
            },
            (Value::Array(items), PathSegment::Index(index), Some(value)) => {
                if *index < items.len() {
                    items[*index] = value.clone();
                } else if within_gap(items, *index) {
                    items.resize(*index, Value::Null);
                    items.push(value.clone());
                } else {
                    self.report(format!(
                        "skipping index {} past array of length {}",
                        index,
                        items.len()
                    ));
                }
            },
            (Value::Array(items), PathSegment::Index(index), None) => {
                items.truncate(*index);
            },
            _ => {},
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn board() -> Value {
        json!({
            "players": [
                { "id": "p1", "tokens": [0, 0, 0, 0] },
                { "id": "p2", "tokens": [0, 0, 0, 0] }
            ],
            "turn": 1,
            "dice": null
        })
    }

    #[test]
    fn first_call_records_baseline_only() {
        let mut compressor = DeltaCompressor::new();
        assert!(compressor.calculate_delta(&board()).is_none());
        assert!(compressor.has_baseline());
        assert_eq!(compressor.version(), 0);
    }

    #[test]
    fn unchanged_state_returns_none_without_advancing() {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&board());
        assert!(compressor.calculate_delta(&board()).is_none());
        assert!(compressor.calculate_delta(&board()).is_none());
        assert_eq!(compressor.version(), 0);
    }

    #[test]
    fn versions_are_contiguous() {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&json!({ "turn": 0 }));
        for turn in 1..=5u64 {
            let delta = compressor.calculate_delta(&json!({ "turn": turn })).unwrap();
            assert_eq!(delta.version, turn);
        }
    }

    #[test]
    fn reports_only_changed_leaves() {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&board());

        let mut next = board();
        next["players"][0]["tokens"][1] = json!(5);
        next["dice"] = json!(6);
        let delta = compressor.calculate_delta(&next).unwrap();

        let paths: Vec<String> = delta.changes.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(paths, vec!["dice", "players.0.tokens.1"]);
        assert_eq!(delta.changes[0].old_value, Some(Value::Null));
        assert_eq!(delta.changes[0].new_value, Some(json!(6)));
        assert_eq!(delta.checksum, compute_checksum(&next));
    }

    #[test]
    fn added_and_removed_keys_are_reported_once() {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&json!({ "a": { "deep": [1, 2] }, "keep": 1 }));
        let delta = compressor
            .calculate_delta(&json!({ "b": { "deep": [3] }, "keep": 1 }))
            .unwrap();

        assert_eq!(delta.changes.len(), 2);
        assert_eq!(delta.changes[0].path.to_string(), "a");
        assert_eq!(delta.changes[0].new_value, None);
        assert_eq!(delta.changes[1].path.to_string(), "b");
        assert_eq!(delta.changes[1].old_value, None);
        assert_eq!(delta.changes[1].new_value, Some(json!({ "deep": [3] })));
    }

    #[test]
    fn array_length_changes_become_tail_changes() {
        let mut compressor = DeltaCompressor::new();
        let before = json!({ "log": [1, 2, 3, 4] });
        compressor.calculate_delta(&before);

        let shorter = json!({ "log": [1, 2] });
        let delta = compressor.calculate_delta(&shorter).unwrap();
        assert_eq!(delta.changes.len(), 2);
        assert!(delta.changes.iter().all(|c| c.new_value.is_none()));
        assert_eq!(apply_delta(&before, &delta), shorter);

        let longer = json!({ "log": [1, 2, 9] });
        let delta = compressor.calculate_delta(&longer).unwrap();
        assert_eq!(delta.changes.len(), 1);
        assert_eq!(delta.changes[0].old_value, None);
        assert_eq!(apply_delta(&shorter, &delta), longer);
    }

    #[test]
    fn null_is_a_leaf() {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&json!({ "winner": null }));
        let delta = compressor
            .calculate_delta(&json!({ "winner": { "id": "p2" } }))
            .unwrap();
        assert_eq!(delta.changes.len(), 1);
        assert_eq!(delta.changes[0].path.to_string(), "winner");
        assert_eq!(delta.changes[0].old_value, Some(Value::Null));
    }

    #[test]
    fn root_type_change_replaces_whole_state() {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&json!([1, 2]));
        let delta = compressor.calculate_delta(&json!({ "a": 1 })).unwrap();
        assert!(delta.changes[0].path.is_empty());
        assert_eq!(apply_delta(&json!([1, 2]), &delta), json!({ "a": 1 }));
    }

    #[test]
    fn apply_creates_missing_intermediates() {
        let delta = StateDelta {
            version: 1,
            timestamp: 0,
            changes: vec![DeltaChange {
                path: Path::root().child("players").child(1usize).child("pos"),
                old_value: None,
                new_value: Some(json!(7)),
            }],
            checksum: Checksum::default(),
        };
        let result = apply_delta(&json!({}), &delta);
        assert_eq!(result, json!({ "players": [null, { "pos": 7 }] }));
    }

    #[test]
    fn apply_replaces_scalar_in_the_way() {
        let delta = StateDelta {
            version: 1,
            timestamp: 0,
            changes: vec![DeltaChange {
                path: Path::root().child("dice").child("value"),
                old_value: None,
                new_value: Some(json!(4)),
            }],
            checksum: Checksum::default(),
        };
        let result = apply_delta(&json!({ "dice": 3 }), &delta);
        assert_eq!(result, json!({ "dice": { "value": 4 } }));
    }

    #[test]
    fn dotted_keys_round_trip() {
        let mut compressor = DeltaCompressor::new();
        let before = json!({ "cells": { "a.b": 1 } });
        compressor.calculate_delta(&before);
        let after = json!({ "cells": { "a.b": 2, "c": { "d.e": true } } });
        let delta = compressor.calculate_delta(&after).unwrap();
        assert_eq!(apply_delta(&before, &delta), after);
        assert!(delta.verify(&apply_delta(&before, &delta)));
    }

    #[test]
    fn reset_drops_baseline_and_version() {
        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&json!({ "turn": 1 }));
        compressor.calculate_delta(&json!({ "turn": 2 }));
        compressor.reset();
        assert!(!compressor.has_baseline());
        assert_eq!(compressor.version(), 0);
        assert!(compressor.calculate_delta(&json!({ "turn": 3 })).is_none());
    }

    #[test]
    fn null_leaf_survives_serialization() {
        let change = DeltaChange {
            path: Path::root().child("dice"),
            old_value: Some(json!(6)),
            new_value: Some(Value::Null),
        };
        let json = serde_json::to_string(&change).unwrap();
        assert_eq!(json, r#"{"path":["dice"],"oldValue":6,"newValue":null}"#);
        let back: DeltaChange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, change);

        let removed: DeltaChange =
            serde_json::from_str(r#"{"path":["dice"],"oldValue":6}"#).unwrap();
        assert_eq!(removed.new_value, None);
    }

    fn change_at(path: Path, value: Value) -> StateDelta {
        StateDelta {
            version: 1,
            timestamp: 0,
            changes: vec![DeltaChange {
                path,
                old_value: None,
                new_value: Some(value),
            }],
            checksum: Checksum::default(),
        }
    }

    #[test]
    fn far_out_of_range_index_is_skipped_and_reported() {
        let observer = Arc::new(crate::telemetry::CollectingObserver::new());
        let dyn_observer: Arc<dyn ViolationObserver> = observer.clone();
        let base = json!({ "tokens": [0] });

        let leaf = change_at(Path::root().child("tokens").child(usize::MAX), json!(5));
        let result = apply_delta_with_observer(&base, &leaf, Some(&dyn_observer));
        assert_eq!(result, base);

        let nested = change_at(
            Path::root().child("tokens").child(usize::MAX).child("pos"),
            json!(5),
        );
        let result = apply_delta_with_observer(&base, &nested, Some(&dyn_observer));
        assert_eq!(result, base);

        let reported = observer.violations_of_kind(ViolationKind::DeltaApply);
        assert_eq!(reported.len(), 2);
        assert!(reported[0].context["path"].starts_with("tokens."));
    }

    #[test]
    fn index_within_gap_is_padded() {
        let delta = change_at(
            Path::root().child("log").child(MAX_INDEX_GAP + 1),
            json!("x"),
        );
        let result = apply_delta(&json!({ "log": [1] }), &delta);
        let log = result["log"].as_array().unwrap();
        assert_eq!(log.len(), MAX_INDEX_GAP + 2);
        assert_eq!(log[MAX_INDEX_GAP + 1], json!("x"));
        assert!(log[1].is_null());
    }

    #[test]
    fn scalar_replacement_reaches_observer() {
        let observer = Arc::new(crate::telemetry::CollectingObserver::new());
        let dyn_observer: Arc<dyn ViolationObserver> = observer.clone();
        let delta = change_at(Path::root().child("dice").child("value"), json!(4));
        let _ = apply_delta_with_observer(&json!({ "dice": 3 }), &delta, Some(&dyn_observer));
        assert_eq!(observer.len(), 1);
    }
}
