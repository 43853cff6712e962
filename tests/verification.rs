//! Verification integration tests.
//!
//! Property-based tests with proptest over generated state trees:
//! - Delta reconstruction, ordering and idempotence
//! - Checksum determinism and order independence

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

mod verification {
    pub mod property;
}
