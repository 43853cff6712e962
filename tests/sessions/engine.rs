use serde_json::json;
use std::sync::Arc;
use turnsync::network::messages::events;
use turnsync::telemetry::{CollectingObserver, ViolationKind};
use turnsync::{
    assert_violation, ActionConfig, Checksum, SyncEngine, SyncEngineConfig, SyncHealth,
    WarmupResult,
};
use web_time::Duration;

use crate::common::{board, engine_with_clock, moved_board, FailingTransport, RecordingHandler};

// ============================================================================
// Actions
// ============================================================================

#[test]
fn send_action_stamps_and_sends_payload() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    assert!(t
        .engine
        .send_action("a1", events::TOKEN_MOVE, json!({ "cell": 5 }), board()));

    let sent = t.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, events::TOKEN_MOVE);
    assert_eq!(sent[0].payload["cell"], json!(5));
    assert_eq!(sent[0].payload["actionId"], json!("a1"));
    assert_eq!(sent[0].payload["senderId"], json!("p1"));
    assert!(sent[0].payload["timestamp"].is_u64());
}

#[test]
fn sixteenth_pending_action_is_rejected_and_not_sent() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    for i in 0..15 {
        assert!(t
            .engine
            .send_action(&format!("a{}", i), events::TOKEN_MOVE, json!({}), board()));
    }
    let sent_before = t.transport.len();
    assert!(!t
        .engine
        .send_action("a15", events::TOKEN_MOVE, json!({}), board()));
    assert_eq!(t.transport.len(), sent_before);
    assert_eq!(t.engine.stats().actions.pending, 15);
}

#[test]
fn confirmed_action_never_rolls_back() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine
        .send_action("a1", events::TOKEN_MOVE, json!({}), board());
    t.clock.advance(Duration::from_millis(120));
    assert!(t.engine.confirm_action("a1"));
    assert!(!t.engine.confirm_action("a1"));

    t.clock.advance(Duration::from_secs(5));
    t.engine.poll();
    assert!(t.handler.log().rollbacks.is_empty());

    let stats = t.engine.stats();
    assert_eq!(stats.actions.confirmed, 1);
    assert_eq!(stats.actions.average_confirm_ms, 120);
}

#[test]
fn unconfirmed_action_rolls_back_once_with_snapshot() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    let snapshot = moved_board(3);
    t.engine
        .send_action("a1", events::TOKEN_MOVE, json!({}), snapshot.clone());

    t.clock.advance(Duration::from_millis(1499));
    t.engine.poll();
    assert!(t.handler.log().rollbacks.is_empty());

    t.clock.advance(Duration::from_millis(1));
    t.engine.poll();
    t.clock.advance(Duration::from_secs(3));
    t.engine.poll();

    let rollbacks = t.handler.log().rollbacks;
    assert_eq!(rollbacks.len(), 1);
    assert_eq!(rollbacks[0].id, "a1");
    assert_eq!(rollbacks[0].optimistic_state, snapshot);
    assert!(!t.engine.confirm_action("a1"));
    assert_eq!(t.engine.stats().actions.rollbacks, 1);
}

#[test]
fn rollback_timeout_follows_config() {
    let config = SyncEngineConfig::default().with_actions(ActionConfig {
        rollback_timeout: Duration::from_millis(200),
        ..ActionConfig::default()
    });
    let mut t = engine_with_clock(config, "p1");
    t.engine
        .send_action("a1", events::TOKEN_MOVE, json!({}), board());
    t.clock.advance(Duration::from_millis(200));
    t.engine.poll();
    assert_eq!(t.handler.log().rollbacks.len(), 1);
}

#[test]
fn pending_action_queries_read_through() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine
        .send_action("r1", events::DICE_ROLL_START, json!({}), board());
    assert!(t.engine.has_pending_action(events::DICE_ROLL_START));
    assert!(!t.engine.has_pending_action(events::TOKEN_MOVE));
    assert_eq!(t.engine.pending_actions()[0].id, "r1");
}

// ============================================================================
// Routing
// ============================================================================

#[test]
fn priority_action_flushes_queued_normal_messages_first() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    for i in 0..3 {
        t.engine
            .send_action(&format!("c{}", i), "chat", json!({ "n": i }), board());
    }
    assert!(t.transport.sent().is_empty());
    assert_eq!(t.engine.stats().queued_messages, 3);

    t.engine
        .send_action("m1", events::TOKEN_MOVE, json!({}), board());

    assert_eq!(t.transport.events(), vec![events::BATCH, events::TOKEN_MOVE]);
    let delivered: Vec<String> = t
        .transport
        .delivered()
        .into_iter()
        .map(|m| m.event)
        .collect();
    assert_eq!(delivered, vec!["chat", "chat", "chat", events::TOKEN_MOVE]);
    assert_eq!(t.engine.stats().queued_messages, 0);
}

#[test]
fn normal_messages_go_out_when_the_window_elapses() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine.send_action("c1", "chat", json!("hello"), board());

    t.clock.advance(Duration::from_millis(3));
    t.engine.poll();
    assert!(t.transport.sent().is_empty());

    t.clock.advance(Duration::from_millis(1));
    t.engine.poll();
    let sent = t.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event, "chat");
    assert_eq!(sent[0].payload["data"], json!("hello"));
}

#[test]
fn priority_send_bypasses_action_tracking() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    assert!(t
        .engine
        .send_priority_action(events::PRESENCE, json!({ "online": true })));
    let sent = t.transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].payload.get("actionId").is_none());
    assert_eq!(t.engine.stats().actions.pending, 0);
}

#[test]
fn transport_failure_is_swallowed_and_action_still_rolls_back() {
    let observer = Arc::new(CollectingObserver::new());
    let clock = turnsync::clock::ManualClock::new();
    let handler = RecordingHandler::new();
    let mut engine = SyncEngine::with_clock(SyncEngineConfig::default(), clock.clone())
        .unwrap()
        .with_violation_observer(observer.clone());
    engine.initialize(FailingTransport, "p1", handler.boxed());

    assert!(engine.send_action("a1", events::TOKEN_MOVE, json!({}), board()));
    assert_violation!(observer, ViolationKind::Transport);

    clock.advance(Duration::from_millis(1500));
    engine.poll();
    assert_eq!(handler.log().rollbacks.len(), 1);
}

// ============================================================================
// State and reconciliation
// ============================================================================

#[test]
fn unchanged_state_produces_no_delta_and_no_notification() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    assert!(t.engine.update_state(&board()).is_none());
    assert!(t.engine.update_state(&board()).is_none());
    assert!(t.engine.update_state(&board()).is_none());
    assert_eq!(t.engine.stats().delta_version, 0);

    let delta = t.engine.update_state(&moved_board(2)).unwrap();
    assert_eq!(delta.version, 1);
    let log = t.handler.log();
    assert_eq!(log.state_updates.len(), 1);
    assert_eq!(log.state_updates[0].0, moved_board(2));
    assert_eq!(log.state_updates[0].1, delta);
}

#[test]
fn two_consecutive_mismatches_signal_desync_once() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine.update_state(&board());
    let local = turnsync::compute_checksum(&board());

    assert!(!t.engine.verify_sync(Checksum::new(1)));
    assert!(t.handler.log().desyncs.is_empty());
    assert!(!t.engine.verify_sync(Checksum::new(2)));
    assert_eq!(
        t.handler.log().desyncs,
        vec![(Some(local), Checksum::new(2))]
    );

    // the counter was reset, so a match followed by one mismatch does not escalate
    assert!(t.engine.verify_sync(local));
    assert!(!t.engine.verify_sync(Checksum::new(3)));
    assert_eq!(t.handler.log().desyncs.len(), 1);
    assert_eq!(
        t.engine.sync_health(),
        SyncHealth::Mismatch { consecutive: 1 }
    );
}

#[test]
fn staleness_requests_force_sync() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine.update_state(&board());
    t.clock.advance(Duration::from_millis(3000));
    assert!(!t.engine.needs_force_sync());
    t.clock.advance(Duration::from_millis(1));
    assert!(t.engine.needs_force_sync());

    assert!(t.engine.verify_sync(turnsync::compute_checksum(&board())));
    assert!(!t.engine.needs_force_sync());
}

// ============================================================================
// Latency
// ============================================================================

#[test]
fn ping_burst_feeds_minimum_to_predictor() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine.start_ping_burst("b1");
    assert_eq!(t.engine.record_burst_ping("b1", 90.0), None);
    assert_eq!(t.engine.record_burst_ping("b1", 42.0), None);
    assert_eq!(t.engine.record_burst_ping("b1", 70.0), Some(42.0));
    assert_eq!(t.engine.stats().smoothed_latency_ms, 42.0);
}

#[test]
fn abandoned_burst_counts_as_loss() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine.record_latency(30.0);
    t.engine.start_ping_burst("b1");
    t.clock.advance(Duration::from_millis(2100));
    t.engine.poll();
    assert!((t.engine.stats().packet_loss - 0.5).abs() < 1e-9);
}

#[test]
fn warmup_primes_animation_lead() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    assert_eq!(t.engine.animation_lead_time(), Duration::from_millis(25));
    let warmup = WarmupResult {
        samples: vec![200.0; 30],
        average_latency: Some(200.0),
        ready: true,
    };
    t.engine.prime_latency(&warmup);
    assert_eq!(t.engine.animation_lead_time(), Duration::from_millis(100));
    assert_eq!(t.engine.stats().predicted_latency_ms, 200);
}

#[test]
fn quality_reflects_recorded_latency() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    for _ in 0..10 {
        t.engine.record_latency(12.0);
    }
    let quality = t.engine.network_quality();
    assert_eq!(quality.grade, turnsync::NetworkGrade::S);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn destroy_cancels_everything_and_is_idempotent() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine.update_state(&board());
    t.engine.send_action("c1", "chat", json!({}), board());
    t.engine
        .send_action("m1", events::TOKEN_MOVE, json!({}), board());
    t.transport.clear();
    t.engine.send_action("c2", "chat", json!({}), board());

    t.engine.destroy();
    t.engine.destroy();
    assert!(!t.engine.is_active());

    t.clock.advance(Duration::from_secs(10));
    t.engine.poll();
    assert!(t.transport.sent().is_empty());
    assert!(t.handler.log().rollbacks.is_empty());
    assert!(!t.engine.send_action("a2", events::TOKEN_MOVE, json!({}), board()));
    assert!(!t.engine.confirm_action("m1"));
    assert_eq!(t.engine.sync_health(), SyncHealth::Pending);
}

#[test]
fn reinitialize_starts_a_fresh_session() {
    let mut t = engine_with_clock(SyncEngineConfig::default(), "p1");
    t.engine.update_state(&board());
    t.engine.update_state(&moved_board(1));
    t.engine.destroy();

    let handler = RecordingHandler::new();
    t.engine
        .initialize(t.transport.clone(), "p1-rejoined", handler.boxed());
    assert_eq!(t.engine.local_id(), Some("p1-rejoined"));
    // the compressor was reset, so the first state is a new baseline
    assert!(t.engine.update_state(&moved_board(1)).is_none());
    assert_eq!(
        t.engine.update_state(&moved_board(2)).map(|d| d.version),
        Some(1)
    );
}
