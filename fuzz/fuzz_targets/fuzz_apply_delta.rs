//! Fuzz target for applying deltas received from the network.
//!
//! A peer may send any bytes. Whatever parses as a [`StateDelta`] must apply to any base
//! state without panicking, however inconsistent its paths are with that base.
//!
//! # Safety Properties Tested
//! - No panics on malformed delta JSON
//! - No panics when paths cross scalars, arrays and objects in the base
//! - No unbounded allocation for indices far past the end of an array
//! - Checksum verification of the result never panics

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use turnsync::{apply_delta, StateDelta};

fuzz_target!(|data: &[u8]| {
    let Some(split) = data.iter().position(|&b| b == 0) else {
        let _ = serde_json::from_slice::<StateDelta>(data);
        return;
    };
    let (base, delta) = data.split_at(split);
    let Ok(base) = serde_json::from_slice::<Value>(base) else {
        return;
    };
    let Ok(delta) = serde_json::from_slice::<StateDelta>(&delta[1..]) else {
        return;
    };

    let state = apply_delta(&base, &delta);
    let _ = delta.verify(&state);
});
