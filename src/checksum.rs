//! State checksums for desync detection.
//!
//! Peers periodically exchange a [`Checksum`] of their local state tree. If the values
//! differ, the peers' copies have diverged. A checksum must therefore be a pure function of
//! the *logical* state:
//!
//! - Object keys are visited in sorted order, so two peers that built the same object with
//!   keys inserted in a different order agree.
//! - Array elements are visited in index order; reordering an array changes the checksum.
//! - Every node is prefixed with a type tag and strings are length-prefixed, so `"1"` and
//!   `1`, or `["ab"]` and `["a", "b"]`, never collide structurally.
//!
//! The fingerprint is 32 bits (FNV-1a folded). Collisions are an accepted, bounded risk.
//!
//! ```
//! use serde_json::json;
//! use turnsync::checksum::compute_checksum;
//!
//! let a = json!({ "turn": 3, "dice": 6 });
//! let b = json!({ "dice": 6, "turn": 3 });
//! assert_eq!(compute_checksum(&a), compute_checksum(&b));
//! ```

use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::hash::DeterministicHasher;
use crate::SyncError;

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_NUMBER: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_OBJECT: u8 = 6;

/// A fixed-width fingerprint of a state tree.
///
/// Renders as eight lowercase hexadecimal characters and parses back from that form. On the
/// wire it is serialized as that string.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Checksum(u32);

impl Checksum {
    /// Wraps a raw 32-bit value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the underlying 32-bit value.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // from_str_radix alone would accept a leading '+'
        let well_formed = s.len() == 8 && s.bytes().all(|b| b.is_ascii_hexdigit());
        match u32::from_str_radix(s, 16) {
            Ok(value) if well_formed => Ok(Checksum(value)),
            _ => Err(SyncError::InvalidChecksum {
                input: s.to_owned(),
            }),
        }
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Computes the checksum of a full state snapshot.
#[must_use]
pub fn compute_checksum(state: &Value) -> Checksum {
    let mut hasher = DeterministicHasher::new();
    hash_value(&mut hasher, state);
    Checksum(hasher.finish_u32())
}

fn hash_str(hasher: &mut DeterministicHasher, s: &str) {
    hasher.write_u64(s.len() as u64);
    hasher.write(s.as_bytes());
}

fn hash_value(hasher: &mut DeterministicHasher, value: &Value) {
    match value {
        Value::Null => hasher.write_u8(TAG_NULL),
        Value::Bool(false) => hasher.write_u8(TAG_FALSE),
        Value::Bool(true) => hasher.write_u8(TAG_TRUE),
        Value::Number(n) => {
            hasher.write_u8(TAG_NUMBER);
            hash_str(hasher, &n.to_string());
        },
        Value::String(s) => {
            hasher.write_u8(TAG_STRING);
            hash_str(hasher, s);
        },
        Value::Array(items) => {
            hasher.write_u8(TAG_ARRAY);
            hasher.write_u64(items.len() as u64);
            for item in items {
                hash_value(hasher, item);
            }
        },
        Value::Object(map) => {
            hasher.write_u8(TAG_OBJECT);
            hasher.write_u64(map.len() as u64);
            // serde_json's `preserve_order` feature may be unified in by another crate,
            // so never rely on the map's own iteration order.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (key, item) in entries {
                hash_str(hasher, key);
                hash_value(hasher, item);
            }
        },
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
    use serde_json::{json, Map};

    #[test]
    fn key_insertion_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("players".into(), json!(["red", "blue"]));
        first.insert("turn".into(), json!(4));
        first.insert("dice".into(), json!(null));

        let mut second = Map::new();
        second.insert("dice".into(), json!(null));
        second.insert("turn".into(), json!(4));
        second.insert("players".into(), json!(["red", "blue"]));

        assert_eq!(
            compute_checksum(&Value::Object(first)),
            compute_checksum(&Value::Object(second))
        );
    }

    #[test]
    fn array_order_matters() {
        let a = json!({ "tokens": [1, 2, 3] });
        let b = json!({ "tokens": [3, 2, 1] });
        assert_ne!(compute_checksum(&a), compute_checksum(&b));
    }

    #[test]
    fn single_leaf_change_changes_checksum() {
        let a = json!({ "players": [{ "id": "p1", "tokens": [0, 0, 0, 0] }], "turn": 1 });
        let b = json!({ "players": [{ "id": "p1", "tokens": [0, 5, 0, 0] }], "turn": 1 });
        assert_ne!(compute_checksum(&a), compute_checksum(&b));
    }

    #[test]
    fn type_tags_separate_lookalike_values() {
        assert_ne!(compute_checksum(&json!("1")), compute_checksum(&json!(1)));
        assert_ne!(compute_checksum(&json!(null)), compute_checksum(&json!(false)));
        assert_ne!(
            compute_checksum(&json!(["ab"])),
            compute_checksum(&json!(["a", "b"]))
        );
        assert_ne!(compute_checksum(&json!({})), compute_checksum(&json!([])));
    }

    #[test]
    fn display_is_fixed_width_hex() {
        assert_eq!(Checksum::new(0xab).to_string(), "000000ab");
        assert_eq!(compute_checksum(&json!({"a": 1})).to_string().len(), 8);
    }

    #[test]
    fn parse_accepts_display_output() {
        let checksum = compute_checksum(&json!({ "turn": 9 }));
        let parsed: Checksum = checksum.to_string().parse().unwrap();
        assert_eq!(parsed, checksum);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!("abc".parse::<Checksum>().is_err());
        assert!("zzzzzzzz".parse::<Checksum>().is_err());
        assert!("0000000000".parse::<Checksum>().is_err());
        assert!("+0000001".parse::<Checksum>().is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let checksum = Checksum::new(0xdead_beef);
        let json = serde_json::to_string(&checksum).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checksum);
    }
}
