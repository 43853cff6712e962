//! Configuration integration tests.
//!
//! Exercises presets, builder composition and validation through the public API only.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

#[path = "common/mod.rs"]
mod common;

use turnsync::clock::ManualClock;
use turnsync::{
    ActionConfig, BatchConfig, LatencyConfig, PingBurstConfig, ReconcileConfig, SyncEngine,
    SyncEngineConfig, SyncError, WarmupConfig,
};
use web_time::Duration;

use common::RecordingTransport;

fn rejected_field(config: SyncEngineConfig) -> &'static str {
    match SyncEngine::<RecordingTransport>::with_clock(config, ManualClock::new()) {
        Err(SyncError::InvalidConfig { field, .. }) => field,
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("config was accepted"),
    }
}

#[test]
fn every_preset_builds_an_engine() {
    for config in [
        SyncEngineConfig::default(),
        SyncEngineConfig::lan(),
        SyncEngineConfig::mobile(),
        SyncEngineConfig::high_latency(),
    ] {
        assert!(SyncEngine::<RecordingTransport>::new(config).is_ok());
    }
}

#[test]
fn presets_order_rollback_timeouts() {
    let lan = SyncEngineConfig::lan().actions.rollback_timeout;
    let default = SyncEngineConfig::default().actions.rollback_timeout;
    let slow = SyncEngineConfig::high_latency().actions.rollback_timeout;
    assert!(lan < default);
    assert!(default < slow);
}

#[test]
fn builder_replaces_only_its_section() {
    let config = SyncEngineConfig::lan()
        .with_reconcile(ReconcileConfig::strict())
        .with_batch(BatchConfig::immediate());
    assert_eq!(config.reconcile.desync_threshold, 1);
    assert_eq!(config.batch.batch_window, Duration::ZERO);
    assert_eq!(config.latency, LatencyConfig::lan());
    assert_eq!(config.actions, ActionConfig::lan());
    assert_eq!(config.warmup, WarmupConfig::quick());
}

#[test]
fn engine_rejects_zero_pending_cap() {
    let config = SyncEngineConfig::default().with_actions(ActionConfig {
        max_pending_actions: 0,
        ..ActionConfig::default()
    });
    assert_eq!(rejected_field(config), "actions.max_pending_actions");
}

#[test]
fn engine_rejects_zero_desync_threshold() {
    let config = SyncEngineConfig::default().with_reconcile(ReconcileConfig {
        desync_threshold: 0,
        ..ReconcileConfig::default()
    });
    assert_eq!(rejected_field(config), "reconcile.desync_threshold");
}

#[test]
fn engine_rejects_non_finite_filter_constants() {
    let config = SyncEngineConfig::default().with_latency(LatencyConfig {
        measurement_noise: f64::NAN,
        ..LatencyConfig::default()
    });
    assert_eq!(rejected_field(config), "latency.measurement_noise");
}

#[test]
fn engine_rejects_jitter_window_longer_than_history() {
    let config = SyncEngineConfig::default().with_latency(LatencyConfig {
        history_size: 10,
        jitter_window: 11,
        ..LatencyConfig::default()
    });
    assert_eq!(rejected_field(config), "latency.jitter_window");
}

#[test]
fn engine_rejects_empty_ping_burst() {
    let config = SyncEngineConfig::default().with_ping_burst(PingBurstConfig {
        burst_size: 0,
        ..PingBurstConfig::default()
    });
    assert_eq!(rejected_field(config), "ping_burst.burst_size");
}

#[test]
fn error_message_names_the_field() {
    let err = SyncEngineConfig::default()
        .with_warmup(WarmupConfig {
            ping_count: 0,
            ..WarmupConfig::default()
        })
        .validate()
        .unwrap_err();
    assert!(err.to_string().contains("warmup.ping_count"));
}
