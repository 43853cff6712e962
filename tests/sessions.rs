//! Sync engine integration tests.
//!
//! This module contains integration tests for the engine:
//! - Engine behavior against a recording transport and handler
//! - Two-peer scenarios exchanging deltas and checksums

// Allow test-specific patterns that are appropriate for test code
#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

// Shared test infrastructure
#[path = "common/mod.rs"]
mod common;

mod sessions {
    pub mod engine;
    pub mod scenario;
}
