//! The orchestrator tying every component to one transport and one handler.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, trace};
use web_time::{Duration, Instant};

use crate::checksum::Checksum;
use crate::clock::{millis_since_epoch, Clock, SystemClock};
use crate::delta::{apply_delta_with_observer, DeltaCompressor, StateDelta};
use crate::network::messages::WireMessage;
use crate::network::ping_burst::PingBurstManager;
use crate::network::quality::{NetworkQuality, NetworkQualityGrader};
use crate::network::router::MessageRouter;
use crate::network::warmup::{ConnectionWarmup, WarmupResult};
use crate::optimistic::{ActionStats, OptimisticActionManager, PendingAction, RolledBackAction};
use crate::reconcile::{ChecksumVerdict, StateReconciler};
use crate::{report_violation, report_violation_to};
use crate::sessions::config::SyncEngineConfig;
use crate::sessions::sync_health::SyncHealth;
use crate::telemetry::{
    report_to_observer, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::{SyncError, Transport, TransportError};

/// Receives the engine's notifications. Every method defaults to doing nothing.
#[cfg(feature = "sync-send")]
pub trait SyncHandler: Send {
    /// A local state update produced a delta.
    fn on_state_update(&mut self, _state: &Value, _delta: &StateDelta) {}

    /// An action timed out unconfirmed; restore `action.optimistic_state`.
    fn on_rollback(&mut self, _action: RolledBackAction) {}

    /// Checksums kept disagreeing; request a full state from the authority.
    fn on_desync(&mut self, _local: Option<Checksum>, _remote: Checksum) {}
}

/// Receives the engine's notifications. Every method defaults to doing nothing.
#[cfg(not(feature = "sync-send"))]
pub trait SyncHandler {
    /// A local state update produced a delta.
    fn on_state_update(&mut self, _state: &Value, _delta: &StateDelta) {}

    /// An action timed out unconfirmed; restore `action.optimistic_state`.
    fn on_rollback(&mut self, _action: RolledBackAction) {}

    /// Checksums kept disagreeing; request a full state from the authority.
    fn on_desync(&mut self, _local: Option<Checksum>, _remote: Checksum) {}
}

/// Snapshot of engine statistics, returned by [`SyncEngine::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[must_use = "SyncStats should be inspected or used after being queried"]
pub struct SyncStats {
    /// Optimistic action counters.
    pub actions: ActionStats,
    /// Predicted round trip in whole milliseconds.
    pub predicted_latency_ms: u64,
    /// Median of recent round trips.
    pub smoothed_latency_ms: f64,
    /// Round-trip standard deviation.
    pub jitter_ms: f64,
    /// Latency filter confidence, 0 to 1.
    pub confidence: f64,
    /// Lost pings as a fraction of all pings.
    pub packet_loss: f64,
    /// Version of the last delta produced.
    pub delta_version: u64,
    /// Messages waiting for the batch window.
    pub queued_messages: usize,
}

struct Session<T> {
    transport: T,
    local_id: String,
    handler: Box<dyn SyncHandler>,
}

/// Optimistic state synchronization for one match.
///
/// The engine is poll-driven. It never spawns threads or timers; instead, call
/// [`poll`](Self::poll) regularly (every frame, or when [`next_poll_at`](Self::next_poll_at)
/// comes due) to flush batched messages and fire rollbacks.
///
/// Before [`initialize`](Self::initialize) and after [`destroy`](Self::destroy) every
/// operation is a no-op returning a neutral value.
///
/// ```
/// use serde_json::json;
/// use turnsync::{SyncEngine, SyncEngineConfig, SyncHandler, Transport, TransportError, WireMessage};
///
/// struct Loopback(Vec<WireMessage>);
///
/// impl Transport for Loopback {
///     fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
///         self.0.push(message.clone());
///         Ok(())
///     }
/// }
///
/// struct Ui;
/// impl SyncHandler for Ui {}
///
/// let mut engine = SyncEngine::new(SyncEngineConfig::default())?;
/// engine.initialize(Loopback(Vec::new()), "player-1", Box::new(Ui));
///
/// engine.update_state(&json!({ "turn": 1 }));
/// assert!(engine.send_action("a1", "token_move", json!({ "cell": 5 }), json!({ "turn": 1 })));
/// let delta = engine.update_state(&json!({ "turn": 2 }));
/// assert_eq!(delta.map(|d| d.version), Some(1));
/// # Ok::<(), turnsync::SyncError>(())
/// ```
pub struct SyncEngine<T: Transport> {
    config: SyncEngineConfig,
    clock: Box<dyn Clock>,
    session: Option<Session<T>>,
    compressor: DeltaCompressor,
    grader: NetworkQualityGrader,
    bursts: PingBurstManager,
    router: MessageRouter,
    actions: OptimisticActionManager,
    reconciler: StateReconciler,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl<T: Transport> SyncEngine<T> {
    /// Creates an engine running on the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `config` does not validate.
    pub fn new(config: SyncEngineConfig) -> Result<Self, SyncError> {
        Self::with_clock(config, SystemClock)
    }

    /// Creates an engine reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `config` does not validate.
    pub fn with_clock(
        config: SyncEngineConfig,
        clock: impl Clock + 'static,
    ) -> Result<Self, SyncError> {
        if let Err(err) = config.validate() {
            report_violation!(
                ViolationSeverity::Error,
                ViolationKind::Configuration,
                "rejected engine configuration: {}",
                err
            );
            return Err(err);
        }
        let now = clock.now();
        Ok(Self {
            compressor: DeltaCompressor::new(),
            grader: NetworkQualityGrader::with_config(config.latency),
            bursts: PingBurstManager::with_config(config.ping_burst),
            router: MessageRouter::with_config(config.batch),
            actions: OptimisticActionManager::with_config(config.actions),
            reconciler: StateReconciler::new(config.reconcile, now),
            clock: Box::new(clock),
            session: None,
            violation_observer: None,
            config,
        })
    }

    /// Routes the engine's violations (transport failures, delta mismatches) to `observer`
    /// instead of the default tracing output.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Starts a session on `transport`.
    ///
    /// Initializing an active engine tears the previous session down first, without firing
    /// rollbacks.
    pub fn initialize(
        &mut self,
        transport: T,
        local_id: impl Into<String>,
        handler: Box<dyn SyncHandler>,
    ) {
        if self.is_active() {
            self.destroy();
        }
        let local_id = local_id.into();
        debug!("Sync engine initialized for {}", local_id);
        self.reconciler.reset(self.clock.now());
        self.session = Some(Session {
            transport,
            local_id,
            handler,
        });
    }

    /// Ends the session.
    ///
    /// Queued messages are dropped unsent and pending actions are dropped without rollback.
    /// The compressor, reconciler and latency history are reset and the transport is
    /// released. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.router.clear();
        self.actions.clear();
        self.bursts.clear();
        self.grader.reset();
        self.compressor.reset();
        self.reconciler.reset(self.clock.now());
        debug!("Sync engine destroyed for {}", session.local_id);
    }

    /// Returns true between [`initialize`](Self::initialize) and [`destroy`](Self::destroy).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// The local player id of the active session.
    #[must_use]
    pub fn local_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.local_id.as_str())
    }

    /// The engine's configuration.
    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    /// A warmup runner configured from [`SyncEngineConfig::warmup`].
    ///
    /// Run it against the transport's ping before play starts and hand the result to
    /// [`prime_latency`](Self::prime_latency).
    pub fn warmup(&self) -> ConnectionWarmup {
        ConnectionWarmup::with_config(self.config.warmup)
    }

    /// The observer set with [`with_violation_observer`](Self::with_violation_observer).
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }

    /// Registers an optimistically applied action and sends it.
    ///
    /// `optimistic_state` is the state from before the action; it is handed back through
    /// [`SyncHandler::on_rollback`] if no confirmation arrives in time, and never sent.
    /// Returns false, sending nothing, if the pending-action cap is reached or `action_id` is
    /// already pending.
    pub fn send_action(
        &mut self,
        action_id: &str,
        action_type: &str,
        payload: Value,
        optimistic_state: Value,
    ) -> bool {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::EngineLifecycle,
                "send_action({}) on an inactive engine",
                action_id
            );
            return false;
        };
        let at_capacity = self.actions.pending_count() >= self.config.actions.max_pending_actions;
        if !self.actions.register_action(
            action_id,
            action_type,
            payload.clone(),
            optimistic_state,
            now,
        ) {
            let reason = if at_capacity {
                "pending action limit reached"
            } else {
                "id already pending"
            };
            let violation = InvariantViolation::new(
                ViolationSeverity::Warning,
                ViolationKind::ActionLifecycle,
                format!("rejected action: {}", reason),
                concat!(file!(), ":", line!()),
            )
            .with_context("action_id", action_id)
            .with_context("event", action_type);
            report_to_observer(self.violation_observer.as_ref(), &violation);
            return false;
        }

        let payload = stamp(payload, Some(action_id), &session.local_id);
        let sent = self
            .router
            .route(action_type, payload, &mut session.transport, now);
        self.report_send_failure(sent, action_type, Some(action_id));
        true
    }

    /// Sends a message immediately, without rollback tracking.
    ///
    /// Anything queued is flushed first. Returns false if the engine is inactive or the
    /// transport rejected the message.
    pub fn send_priority_action(&mut self, action_type: &str, payload: Value) -> bool {
        let Some(session) = self.session.as_mut() else {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::EngineLifecycle,
                "send_priority_action({}) on an inactive engine",
                action_type
            );
            return false;
        };
        let message = WireMessage::new(action_type, stamp(payload, None, &session.local_id));
        let sent = self
            .router
            .send_immediate(&message, &mut session.transport);
        let ok = sent.is_ok();
        self.report_send_failure(sent, action_type, None);
        ok
    }

    /// Confirms a pending action. Returns false if it was not pending.
    pub fn confirm_action(&mut self, action_id: &str) -> bool {
        if !self.is_active() {
            return false;
        }
        let now = self.clock.now();
        self.actions.confirm_action(action_id, now)
    }

    /// Returns true if an action of `action_type` is awaiting confirmation.
    #[must_use]
    pub fn has_pending_action(&self, action_type: &str) -> bool {
        self.is_active() && self.actions.has_pending_action(action_type)
    }

    /// Snapshot of the actions awaiting confirmation.
    #[must_use]
    pub fn pending_actions(&self) -> Vec<PendingAction> {
        if self.is_active() {
            self.actions.pending_actions()
        } else {
            Vec::new()
        }
    }

    /// Feeds a round-trip measurement and returns the updated estimate.
    ///
    /// Negative or non-finite samples are reported as [`ViolationKind::LatencySample`] and
    /// ignored.
    pub fn record_latency(&mut self, latency_ms: f64) -> f64 {
        if !self.is_active() || !self.accept_sample(latency_ms) {
            return self.grader.predictor().estimate();
        }
        self.grader.record_ping(latency_ms)
    }

    /// Records a ping that never came back.
    pub fn record_ping_loss(&mut self) {
        if self.is_active() {
            self.grader.record_loss();
        }
    }

    /// Opens a ping burst.
    pub fn start_ping_burst(&mut self, burst_id: &str) {
        if self.is_active() {
            let now = self.clock.now();
            self.bursts.start_burst(burst_id, now);
        }
    }

    /// Adds a sample to a ping burst.
    ///
    /// When the burst completes, its fastest sample is recorded as the latency and returned.
    pub fn record_burst_ping(&mut self, burst_id: &str, latency_ms: f64) -> Option<f64> {
        if !self.is_active()
            || !self.accept_sample(latency_ms)
            || !self.bursts.record_ping(burst_id, latency_ms)
        {
            return None;
        }
        let fastest = self.bursts.burst_result(burst_id)?;
        self.grader.record_ping(fastest);
        Some(fastest)
    }

    /// Feeds the samples of a warmup run to the latency predictor.
    pub fn prime_latency(&mut self, warmup: &WarmupResult) {
        if !self.is_active() {
            return;
        }
        for &sample in &warmup.samples {
            if self.accept_sample(sample) {
                self.grader.record_ping(sample);
            }
        }
    }

    /// Records a new local state.
    ///
    /// The delta and the local checksum are computed from the same snapshot. A produced delta
    /// is passed to [`SyncHandler::on_state_update`] and returned; `None` means the state is
    /// the first baseline or unchanged.
    pub fn update_state(&mut self, state: &Value) -> Option<StateDelta> {
        let session = self.session.as_mut()?;
        self.reconciler.update_local_checksum(state);
        let delta = self.compressor.calculate_delta(state)?;
        trace!(
            "Produced delta v{} with {} changes",
            delta.version,
            delta.changes.len()
        );
        session.handler.on_state_update(state, &delta);
        Some(delta)
    }

    /// Applies a peer's delta to `base` and adopts the result's checksum as the local one.
    ///
    /// A result whose checksum differs from the delta's is still returned, and reported as a
    /// violation.
    pub fn apply_remote_delta(&mut self, base: &Value, delta: &StateDelta) -> Option<Value> {
        if !self.is_active() {
            return None;
        }
        let state = apply_delta_with_observer(base, delta, self.violation_observer.as_ref());
        let local = self.reconciler.update_local_checksum(&state);
        if local != delta.checksum {
            report_violation_to!(
                self.violation_observer,
                ViolationSeverity::Error,
                ViolationKind::ChecksumMismatch,
                "delta v{} applied to checksum {}, expected {}",
                delta.version,
                local,
                delta.checksum
            );
        }
        Some(state)
    }

    /// Compares the local checksum with a peer's. Returns true on a match.
    ///
    /// Repeated mismatches invoke [`SyncHandler::on_desync`].
    pub fn verify_sync(&mut self, remote: Checksum) -> bool {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match self.reconciler.compare_with_remote(remote, now) {
            ChecksumVerdict::Match => true,
            ChecksumVerdict::Mismatch { .. } => false,
            ChecksumVerdict::Desync { local, remote } => {
                session.handler.on_desync(local, remote);
                let local_text = local.map_or_else(|| "none".to_owned(), |c| c.to_string());
                let violation = InvariantViolation::new(
                    ViolationSeverity::Critical,
                    ViolationKind::ChecksumMismatch,
                    "desync detected",
                    concat!(file!(), ":", line!()),
                )
                .with_context("local", local_text)
                .with_context("remote", remote.to_string());
                report_to_observer(self.violation_observer.as_ref(), &violation);
                false
            },
        }
    }

    /// Runs due work: flushes the batch queue, rolls back timed-out actions and evicts
    /// abandoned ping bursts, counting them as lost.
    pub fn poll(&mut self) {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let flushed = self.router.poll(&mut session.transport, now);
        for action in self.actions.expire(now) {
            session.handler.on_rollback(action);
        }
        for _ in 0..self.bursts.cleanup(now) {
            self.grader.record_loss();
        }
        self.report_send_failure(flushed, "batch", None);
    }

    /// The earliest instant at which [`poll`](Self::poll) has work to do.
    #[must_use]
    pub fn next_poll_at(&self) -> Option<Instant> {
        if !self.is_active() {
            return None;
        }
        match (self.router.next_flush_at(), self.actions.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Engine statistics.
    pub fn stats(&self) -> SyncStats {
        if !self.is_active() {
            return SyncStats::default();
        }
        let predictor = self.grader.predictor();
        SyncStats {
            actions: self.actions.stats(),
            predicted_latency_ms: predictor.predict(),
            smoothed_latency_ms: predictor.smoothed_latency(),
            jitter_ms: predictor.jitter(),
            confidence: predictor.confidence(),
            packet_loss: self.grader.packet_loss(),
            delta_version: self.compressor.version(),
            queued_messages: self.router.queued_len(),
        }
    }

    /// How long before the expected confirmation a predicted animation should start.
    #[must_use]
    pub fn animation_lead_time(&self) -> Duration {
        if !self.is_active() {
            return self.config.latency.min_animation_lead;
        }
        self.grader.predictor().animation_lead_time()
    }

    /// Returns true if no checksum has matched for too long.
    #[must_use]
    pub fn needs_force_sync(&self) -> bool {
        self.is_active() && self.reconciler.needs_force_sync(self.clock.now())
    }

    /// Grades the connection. An inactive engine reports the grade of a fresh connection.
    pub fn network_quality(&self) -> NetworkQuality {
        if !self.is_active() {
            return NetworkQualityGrader::with_config(self.config.latency).analyze();
        }
        self.grader.analyze()
    }

    /// Summary of the reconciliation state.
    pub fn sync_health(&self) -> SyncHealth {
        self.reconciler.health()
    }

    /// Checks a latency sample before it reaches the predictor.
    fn accept_sample(&self, latency_ms: f64) -> bool {
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            return true;
        }
        report_violation_to!(
            self.violation_observer,
            ViolationSeverity::Warning,
            ViolationKind::LatencySample,
            "rejected latency sample {}",
            latency_ms
        );
        false
    }

    fn report_send_failure(
        &self,
        result: Result<(), TransportError>,
        event: &str,
        action_id: Option<&str>,
    ) {
        let Err(err) = result else {
            return;
        };
        let mut violation = InvariantViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::Transport,
            format!("send failed: {}", err),
            concat!(file!(), ":", line!()),
        )
        .with_context("event", event);
        if let Some(id) = action_id {
            violation = violation.with_context("action_id", id);
        }
        report_to_observer(self.violation_observer.as_ref(), &violation);
    }
}

/// Attaches sender metadata to an outgoing payload. Non-object payloads are wrapped under
/// `data`.
fn stamp(payload: Value, action_id: Option<&str>, sender_id: &str) -> Value {
    let mut fields = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_owned(), other);
            map
        },
    };
    if let Some(id) = action_id {
        fields.insert("actionId".to_owned(), Value::from(id));
    }
    fields.insert("senderId".to_owned(), Value::from(sender_id));
    fields.insert("timestamp".to_owned(), Value::from(millis_since_epoch()));
    Value::Object(fields)
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
    use crate::clock::ManualClock;
    use crate::telemetry::CollectingObserver;
    use serde_json::json;

    struct NullTransport;

    impl Transport for NullTransport {
        fn send(&mut self, _message: &WireMessage) -> Result<(), TransportError> {
            Ok(())
        }
    }

    struct ClosedTransport;

    impl Transport for ClosedTransport {
        fn send(&mut self, _message: &WireMessage) -> Result<(), TransportError> {
            Err(TransportError::new("closed"))
        }
    }

    struct Quiet;
    impl SyncHandler for Quiet {}

    #[test]
    fn stamp_attaches_metadata() {
        let stamped = stamp(json!({ "cell": 5 }), Some("a1"), "p1");
        assert_eq!(stamped["cell"], json!(5));
        assert_eq!(stamped["actionId"], json!("a1"));
        assert_eq!(stamped["senderId"], json!("p1"));
        assert!(stamped["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn stamp_wraps_scalars() {
        let stamped = stamp(json!(6), None, "p1");
        assert_eq!(stamped["data"], json!(6));
        assert!(stamped.get("actionId").is_none());
        assert!(stamp(Value::Null, None, "p1").get("data").is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = SyncEngineConfig::default();
        config.actions.max_pending_actions = 0;
        assert!(SyncEngine::<NullTransport>::new(config).is_err());
    }

    #[test]
    fn inactive_engine_is_inert() {
        let mut engine = SyncEngine::<NullTransport>::new(SyncEngineConfig::default()).unwrap();
        assert!(!engine.is_active());
        assert!(!engine.send_action("a", "token_move", json!({}), json!({})));
        assert!(!engine.send_priority_action("ping", json!({})));
        assert!(engine.update_state(&json!({ "turn": 1 })).is_none());
        assert!(!engine.verify_sync(Checksum::new(1)));
        assert!(!engine.needs_force_sync());
        assert_eq!(engine.stats(), SyncStats::default());
        assert_eq!(engine.next_poll_at(), None);
        assert_eq!(engine.local_id(), None);
    }

    #[test]
    fn transport_failures_are_reported_not_raised() {
        let observer = Arc::new(CollectingObserver::new());
        let mut engine = SyncEngine::new(SyncEngineConfig::default())
            .unwrap()
            .with_violation_observer(observer.clone());
        engine.initialize(ClosedTransport, "p1", Box::new(Quiet));

        assert!(!engine.send_priority_action("ping", json!({})));
        // the action is still registered and will roll back normally
        assert!(engine.send_action("a1", "token_move", json!({}), json!({})));
        assert_eq!(engine.stats().actions.pending, 1);
        crate::assert_violation!(observer, ViolationKind::Transport);
    }

    #[test]
    fn next_poll_at_tracks_earliest_deadline() {
        let clock = ManualClock::new();
        let now = clock.now();
        let mut engine = SyncEngine::with_clock(SyncEngineConfig::default(), clock).unwrap();
        engine.initialize(NullTransport, "p1", Box::new(Quiet));
        engine.send_action("a1", "token_move", json!({}), json!({}));
        assert_eq!(engine.next_poll_at(), Some(now + Duration::from_millis(1500)));
        engine.send_priority_action("presence", json!({}));
        engine.send_action("a2", "chat", json!({}), json!({}));
        assert_eq!(engine.next_poll_at(), Some(now + Duration::from_millis(4)));
    }

    #[test]
    fn tampered_delta_is_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let mut engine = SyncEngine::new(SyncEngineConfig::default())
            .unwrap()
            .with_violation_observer(observer.clone());
        engine.initialize(NullTransport, "p1", Box::new(Quiet));

        let mut compressor = DeltaCompressor::new();
        compressor.calculate_delta(&json!({ "turn": 1 }));
        let mut delta = compressor.calculate_delta(&json!({ "turn": 2 })).unwrap();
        delta.checksum = Checksum::new(0xdead_beef);

        let applied = engine.apply_remote_delta(&json!({ "turn": 1 }), &delta).unwrap();
        assert_eq!(applied, json!({ "turn": 2 }));
        crate::assert_violation!(observer, ViolationKind::ChecksumMismatch);
    }

    fn observed(observer: &Arc<CollectingObserver>) -> SyncEngine<NullTransport> {
        let mut engine = SyncEngine::new(SyncEngineConfig::default())
            .unwrap()
            .with_violation_observer(observer.clone());
        engine.initialize(NullTransport, "p1", Box::new(Quiet));
        engine
    }

    #[test]
    fn destroy_forgets_connection_history() {
        let mut engine = SyncEngine::<NullTransport>::new(SyncEngineConfig::default()).unwrap();
        engine.initialize(NullTransport, "p1", Box::new(Quiet));
        let fresh = engine.network_quality();
        for _ in 0..10 {
            engine.record_latency(400.0);
        }
        engine.record_ping_loss();
        assert_ne!(engine.network_quality(), fresh);

        engine.destroy();
        assert_eq!(engine.network_quality(), fresh);

        engine.initialize(NullTransport, "p1", Box::new(Quiet));
        assert_eq!(engine.network_quality(), fresh);
        assert_eq!(engine.stats().packet_loss, 0.0);
        assert_eq!(engine.stats().predicted_latency_ms, 50);
    }

    #[test]
    fn warmup_runner_follows_config() {
        let config = SyncEngineConfig::default().with_warmup(crate::WarmupConfig::quick());
        let mut engine = SyncEngine::<NullTransport>::new(config).unwrap();
        engine.initialize(NullTransport, "p1", Box::new(Quiet));

        let mut warmup = engine.warmup();
        let result = warmup.run_blocking(|| Ok::<_, TransportError>(Duration::from_millis(30)));
        assert_eq!(result.samples.len(), 3);
        engine.prime_latency(&result);
        assert_eq!(engine.grader.predictor().sample_count(), 3);
    }

    #[test]
    fn rejected_actions_are_reported_with_context() {
        let observer = Arc::new(CollectingObserver::new());
        let mut engine = observed(&observer);
        assert!(engine.send_action("a1", "token_move", json!({}), json!({})));
        assert!(!engine.send_action("a1", "token_move", json!({}), json!({})));

        let reported = observer.violations_of_kind(ViolationKind::ActionLifecycle);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].context["action_id"], "a1");
        assert!(reported[0].message.contains("already pending"));
    }

    #[test]
    fn sending_on_inactive_engine_is_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let mut engine = observed(&observer);
        engine.destroy();
        assert!(!engine.send_action("a1", "token_move", json!({}), json!({})));
        assert!(!engine.send_priority_action("ping", json!({})));
        assert_eq!(
            observer.violations_of_kind(ViolationKind::EngineLifecycle).len(),
            2
        );
    }

    #[test]
    fn desync_is_reported_as_critical() {
        let observer = Arc::new(CollectingObserver::new());
        let mut engine = observed(&observer);
        engine.update_state(&json!({ "turn": 1 }));
        engine.verify_sync(Checksum::new(7));
        assert!(observer.is_empty());
        engine.verify_sync(Checksum::new(7));

        let reported = observer.violations();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].severity, ViolationSeverity::Critical);
        assert_eq!(reported[0].kind, ViolationKind::ChecksumMismatch);
        assert_eq!(reported[0].context["remote"], "00000007");
    }

    #[test]
    fn engine_violations_reach_installed_observer() {
        let observer = Arc::new(CollectingObserver::new());
        let mut engine = observed(&observer);

        assert_eq!(engine.record_latency(f64::NAN), 50.0);
        crate::assert_violation!(observer, ViolationKind::LatencySample);

        let hostile: StateDelta = serde_json::from_str(
            r#"{"version":1,"timestamp":0,"changes":[{"path":["tokens",18446744073709551615],"newValue":5}],"checksum":"00000000"}"#,
        )
        .unwrap();
        let applied = engine
            .apply_remote_delta(&json!({ "tokens": [0] }), &hostile)
            .unwrap();
        assert_eq!(applied, json!({ "tokens": [0] }));
        crate::assert_violation!(observer, ViolationKind::DeltaApply);
    }

    #[test]
    fn clean_session_reports_nothing() {
        let observer = Arc::new(CollectingObserver::new());
        let mut engine = observed(&observer);
        engine.update_state(&json!({ "turn": 1 }));
        assert!(engine.send_action("a1", "token_move", json!({}), json!({ "turn": 1 })));
        let delta = engine.update_state(&json!({ "turn": 2 })).unwrap();
        assert!(engine.verify_sync(delta.checksum));
        assert!(engine.confirm_action("a1"));
        engine.record_latency(40.0);
        engine.poll();
        crate::assert_no_violations!(observer);
    }
}
