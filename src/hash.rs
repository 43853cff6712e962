//! Deterministic hashing utilities.
//!
//! Checksums exchanged between peers must agree bit-for-bit, so they cannot use
//! `std::collections::hash_map::DefaultHasher` (randomly seeded per process). This module
//! provides FNV-1a, which is fast, seedless and stable across platforms.
//!
//! ```
//! use turnsync::hash::{fnv1a_hash, DeterministicHasher};
//! use std::hash::{Hash, Hasher};
//!
//! let mut hasher = DeterministicHasher::new();
//! "hello".hash(&mut hasher);
//! assert_eq!(hasher.finish(), fnv1a_hash(&"hello"));
//! ```
//!
//! FNV-1a is NOT cryptographically secure. For desync detection that is fine.

use std::hash::{Hash, Hasher};

/// FNV-1a 64-bit offset basis constant.
const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a 64-bit prime constant.
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// A deterministic hasher using the FNV-1a algorithm.
#[derive(Debug, Clone)]
pub struct DeterministicHasher {
    state: u64,
}

impl DeterministicHasher {
    /// Creates a new `DeterministicHasher` with the standard FNV-1a offset basis.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Folds the 64-bit state into 32 bits by XOR-ing the two halves.
    #[inline]
    #[must_use]
    pub const fn finish_u32(&self) -> u32 {
        ((self.state >> 32) ^ (self.state & 0xffff_ffff)) as u32
    }
}

impl Default for DeterministicHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for DeterministicHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        // FNV-1a: XOR then multiply, per byte
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Computes a deterministic FNV-1a hash of the given value.
#[inline]
pub fn fnv1a_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DeterministicHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_hasher_consistency() {
        assert_eq!(fnv1a_hash(&42u32), fnv1a_hash(&42u32));
        assert_ne!(fnv1a_hash(&42u32), fnv1a_hash(&43u32));
    }

    #[test]
    fn test_known_fnv1a_values() {
        let mut hasher = DeterministicHasher::new();
        hasher.write(b"");
        assert_eq!(hasher.finish(), 0xcbf2_9ce4_8422_2325);

        let mut hasher = DeterministicHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63_dc4c_8601_ec8c);

        let mut hasher = DeterministicHasher::new();
        hasher.write(b"foobar");
        assert_eq!(hasher.finish(), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_finish_u32_folds_halves() {
        let mut hasher = DeterministicHasher::new();
        hasher.write(b"a");
        let full = hasher.finish();
        assert_eq!(
            hasher.finish_u32(),
            ((full >> 32) as u32) ^ (full as u32)
        );
    }

    #[test]
    fn test_incremental_writes_match_single_write() {
        let mut split = DeterministicHasher::new();
        split.write(b"hello");
        split.write(b"world");

        let mut whole = DeterministicHasher::new();
        whole.write(b"helloworld");

        assert_eq!(split.finish(), whole.finish());
    }
}
