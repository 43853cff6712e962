//! Configuration types for sync engines.
//!
//! Every tunable of the engine lives in one of the structs below. All of them are plain
//! `Copy` values with sensible defaults, a few named presets and a `validate()` method;
//! [`SyncEngineConfig`] aggregates them and is what [`SyncEngine::new`] takes.
//!
//! # Overview
//!
//! | Config Type | Purpose | Key Presets |
//! |-------------|---------|-------------|
//! | `LatencyConfig` | Kalman filter and latency buffers | `lan()`, `mobile()`, `high_latency()` |
//! | `ActionConfig` | Pending action cap and rollback timeout | `lan()`, `high_latency()` |
//! | `ReconcileConfig` | Desync threshold and staleness | `strict()` |
//! | `BatchConfig` | Batch window for normal messages | `immediate()` |
//! | `WarmupConfig` | Warmup ping count and spacing | `quick()` |
//! | `PingBurstConfig` | Ping burst size and timeout | |
//!
//! # Example
//!
//! ```
//! use turnsync::{ActionConfig, SyncEngineConfig};
//! use web_time::Duration;
//!
//! let config = SyncEngineConfig::mobile().with_actions(ActionConfig {
//!     rollback_timeout: Duration::from_millis(2500),
//!     ..ActionConfig::default()
//! });
//! assert!(config.validate().is_ok());
//! ```
//!
//! [`SyncEngine::new`]: crate::SyncEngine::new

use web_time::Duration;

use crate::SyncError;

fn invalid(field: &'static str, reason: impl Into<String>) -> SyncError {
    SyncError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}

fn check_duration(
    field: &'static str,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Result<(), SyncError> {
    if value < min || value > max {
        return Err(invalid(
            field,
            format!(
                "{}ms is outside {}ms..={}ms",
                value.as_millis(),
                min.as_millis(),
                max.as_millis()
            ),
        ));
    }
    Ok(())
}

fn check_count(field: &'static str, value: usize, min: usize, max: usize) -> Result<(), SyncError> {
    if value < min || value > max {
        return Err(invalid(
            field,
            format!("{} is outside {}..={}", value, min, max),
        ));
    }
    Ok(())
}

fn check_positive(field: &'static str, value: f64) -> Result<(), SyncError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(field, format!("{} must be finite and positive", value)));
    }
    Ok(())
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), SyncError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(
            field,
            format!("{} must be finite and non-negative", value),
        ));
    }
    Ok(())
}

/// Configuration for the latency predictor.
///
/// The filter constants control how quickly the estimate follows new samples: a larger
/// `process_noise` relative to `measurement_noise` tracks changes faster but smooths less.
///
/// # Forward Compatibility
///
/// New fields may be added to this struct in future versions. Use the
/// `..LatencyConfig::default()` pattern when constructing instances.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use = "LatencyConfig has no effect unless passed to SyncEngineConfig::with_latency()"]
pub struct LatencyConfig {
    /// Estimate before any sample arrives, in milliseconds.
    ///
    /// Default: 50.0
    pub initial_estimate_ms: f64,

    /// Initial error covariance. Confidence is `1 - covariance`, so the default starts at zero
    /// confidence.
    ///
    /// Default: 1.0
    pub initial_covariance: f64,

    /// How much the true latency is expected to drift between samples.
    ///
    /// Default: 0.1
    pub process_noise: f64,

    /// How noisy individual samples are.
    ///
    /// Default: 0.5
    pub measurement_noise: f64,

    /// Length of the sample history used for jitter.
    ///
    /// Default: 100
    pub history_size: usize,

    /// Length of the short buffer whose median is shown to players.
    ///
    /// Default: 10
    pub jitter_buffer_size: usize,

    /// How many of the most recent history samples jitter is computed over.
    ///
    /// Default: 20
    pub jitter_window: usize,

    /// Lower bound for [`animation_lead_time`](crate::network::latency::LatencyPredictor::animation_lead_time).
    ///
    /// Default: 20ms
    pub min_animation_lead: Duration,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            initial_estimate_ms: 50.0,
            initial_covariance: 1.0,
            process_noise: 0.1,
            measurement_noise: 0.5,
            history_size: 100,
            jitter_buffer_size: 10,
            jitter_window: 20,
            min_animation_lead: Duration::from_millis(20),
        }
    }
}

impl LatencyConfig {
    /// Creates a new `LatencyConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for local network play: starts from a low estimate.
    pub fn lan() -> Self {
        Self {
            initial_estimate_ms: 10.0,
            ..Self::default()
        }
    }

    /// Preset for cellular networks: noisier samples, longer display smoothing.
    pub fn mobile() -> Self {
        Self {
            initial_estimate_ms: 120.0,
            measurement_noise: 2.0,
            jitter_buffer_size: 15,
            min_animation_lead: Duration::from_millis(40),
            ..Self::default()
        }
    }

    /// Preset for long-haul links (150-300ms RTT).
    pub fn high_latency() -> Self {
        Self {
            initial_estimate_ms: 200.0,
            measurement_noise: 1.0,
            min_animation_lead: Duration::from_millis(40),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if a filter constant is not finite, a noise term is
    /// not positive, a buffer is empty, or `jitter_window` exceeds `history_size`.
    pub fn validate(&self) -> Result<(), SyncError> {
        check_non_negative("latency.initial_estimate_ms", self.initial_estimate_ms)?;
        check_non_negative("latency.initial_covariance", self.initial_covariance)?;
        check_positive("latency.process_noise", self.process_noise)?;
        check_positive("latency.measurement_noise", self.measurement_noise)?;
        check_count("latency.history_size", self.history_size, 2, 10_000)?;
        check_count("latency.jitter_buffer_size", self.jitter_buffer_size, 1, 1_000)?;
        check_count("latency.jitter_window", self.jitter_window, 2, self.history_size)?;
        check_duration(
            "latency.min_animation_lead",
            self.min_animation_lead,
            Duration::ZERO,
            Duration::from_secs(1),
        )
    }
}

/// Configuration for the optimistic action manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ActionConfig has no effect unless passed to SyncEngineConfig::with_actions()"]
pub struct ActionConfig {
    /// Maximum number of unconfirmed actions. Registering beyond this is rejected.
    ///
    /// Default: 15
    pub max_pending_actions: usize,

    /// How long an action may stay unconfirmed before it is rolled back.
    ///
    /// Default: 1500ms
    pub rollback_timeout: Duration,

    /// How many recent confirm latencies the average is computed over.
    ///
    /// Default: 50
    pub confirm_sample_size: usize,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            max_pending_actions: 15,
            rollback_timeout: Duration::from_millis(1500),
            confirm_sample_size: 50,
        }
    }
}

impl ActionConfig {
    /// Creates a new `ActionConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for local network play: confirmations arrive fast, so roll back sooner.
    pub fn lan() -> Self {
        Self {
            rollback_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Preset for high latency links: tolerate slower confirmations.
    pub fn high_latency() -> Self {
        Self {
            rollback_timeout: Duration::from_millis(3000),
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the cap is zero or above 1024, the timeout is
    /// outside 1ms to 60s, or the sample size is zero.
    pub fn validate(&self) -> Result<(), SyncError> {
        check_count("actions.max_pending_actions", self.max_pending_actions, 1, 1024)?;
        check_duration(
            "actions.rollback_timeout",
            self.rollback_timeout,
            Duration::from_millis(1),
            Duration::from_secs(60),
        )?;
        check_count("actions.confirm_sample_size", self.confirm_sample_size, 1, 10_000)
    }
}

/// Configuration for the state reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "ReconcileConfig has no effect unless passed to SyncEngineConfig::with_reconcile()"]
pub struct ReconcileConfig {
    /// Consecutive mismatches that escalate to a desync.
    ///
    /// Default: 2
    pub desync_threshold: u32,

    /// Time without a successful reconciliation after which a full resync is requested.
    ///
    /// Default: 3000ms
    pub stale_after: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            desync_threshold: 2,
            stale_after: Duration::from_millis(3000),
        }
    }
}

impl ReconcileConfig {
    /// Creates a new `ReconcileConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Escalates on the first mismatch. Useful in tests and replays where a transient
    /// mismatch cannot happen.
    pub fn strict() -> Self {
        Self {
            desync_threshold: 1,
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the threshold is zero or `stale_after` is
    /// outside 1ms to 10 minutes.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.desync_threshold == 0 {
            return Err(invalid("reconcile.desync_threshold", "must be at least 1"));
        }
        check_duration(
            "reconcile.stale_after",
            self.stale_after,
            Duration::from_millis(1),
            Duration::from_secs(600),
        )
    }
}

/// Configuration for the message router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "BatchConfig has no effect unless passed to SyncEngineConfig::with_batch()"]
pub struct BatchConfig {
    /// How long normal messages are held to be coalesced into one send.
    ///
    /// Default: 4ms
    pub batch_window: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_millis(4),
        }
    }
}

impl BatchConfig {
    /// Creates a new `BatchConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// No batching window: queued messages go out on the next poll.
    pub fn immediate() -> Self {
        Self {
            batch_window: Duration::ZERO,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the window exceeds one second.
    pub fn validate(&self) -> Result<(), SyncError> {
        check_duration(
            "batch.batch_window",
            self.batch_window,
            Duration::ZERO,
            Duration::from_secs(1),
        )
    }
}

/// Configuration for the connection warmup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "WarmupConfig has no effect unless passed to ConnectionWarmup::with_config()"]
pub struct WarmupConfig {
    /// Number of sequential pings.
    ///
    /// Default: 5
    pub ping_count: usize,

    /// Pause between pings.
    ///
    /// Default: 20ms
    pub spacing: Duration,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            ping_count: 5,
            spacing: Duration::from_millis(20),
        }
    }
}

impl WarmupConfig {
    /// Creates a new `WarmupConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Three pings without spacing, for reconnects where a prior estimate exists.
    pub fn quick() -> Self {
        Self {
            ping_count: 3,
            spacing: Duration::ZERO,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `ping_count` is outside 1 to 100 or the spacing
    /// exceeds 5 seconds.
    pub fn validate(&self) -> Result<(), SyncError> {
        check_count("warmup.ping_count", self.ping_count, 1, 100)?;
        check_duration(
            "warmup.spacing",
            self.spacing,
            Duration::ZERO,
            Duration::from_secs(5),
        )
    }
}

/// Configuration for the ping burst manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "PingBurstConfig has no effect unless passed to SyncEngineConfig::with_ping_burst()"]
pub struct PingBurstConfig {
    /// Samples needed to complete a burst.
    ///
    /// Default: 3
    pub burst_size: usize,

    /// Age after which an incomplete burst is evicted.
    ///
    /// Default: 2s
    pub burst_timeout: Duration,
}

impl Default for PingBurstConfig {
    fn default() -> Self {
        Self {
            burst_size: 3,
            burst_timeout: Duration::from_secs(2),
        }
    }
}

impl PingBurstConfig {
    /// Creates a new `PingBurstConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the burst size is outside 1 to 64 or the timeout
    /// is outside 1ms to 60s.
    pub fn validate(&self) -> Result<(), SyncError> {
        check_count("ping_burst.burst_size", self.burst_size, 1, 64)?;
        check_duration(
            "ping_burst.burst_timeout",
            self.burst_timeout,
            Duration::from_millis(1),
            Duration::from_secs(60),
        )
    }
}

/// Complete configuration of a [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[must_use = "SyncEngineConfig has no effect unless passed to SyncEngine::new()"]
pub struct SyncEngineConfig {
    /// Latency predictor settings.
    pub latency: LatencyConfig,
    /// Optimistic action settings.
    pub actions: ActionConfig,
    /// Reconciler settings.
    pub reconcile: ReconcileConfig,
    /// Router settings.
    pub batch: BatchConfig,
    /// Warmup settings.
    pub warmup: WarmupConfig,
    /// Ping burst settings.
    pub ping_burst: PingBurstConfig,
}

impl SyncEngineConfig {
    /// Creates a new `SyncEngineConfig` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for local network play.
    pub fn lan() -> Self {
        Self {
            latency: LatencyConfig::lan(),
            actions: ActionConfig::lan(),
            warmup: WarmupConfig::quick(),
            ..Self::default()
        }
    }

    /// Preset for mobile and cellular networks.
    pub fn mobile() -> Self {
        Self {
            latency: LatencyConfig::mobile(),
            actions: ActionConfig::high_latency(),
            reconcile: ReconcileConfig {
                stale_after: Duration::from_millis(5000),
                ..ReconcileConfig::default()
            },
            ..Self::default()
        }
    }

    /// Preset for high latency links.
    pub fn high_latency() -> Self {
        Self {
            latency: LatencyConfig::high_latency(),
            actions: ActionConfig::high_latency(),
            reconcile: ReconcileConfig {
                stale_after: Duration::from_millis(6000),
                ..ReconcileConfig::default()
            },
            batch: BatchConfig {
                batch_window: Duration::from_millis(10),
            },
            ..Self::default()
        }
    }

    /// Replaces the latency settings.
    pub fn with_latency(mut self, latency: LatencyConfig) -> Self {
        self.latency = latency;
        self
    }

    /// Replaces the action settings.
    pub fn with_actions(mut self, actions: ActionConfig) -> Self {
        self.actions = actions;
        self
    }

    /// Replaces the reconciler settings.
    pub fn with_reconcile(mut self, reconcile: ReconcileConfig) -> Self {
        self.reconcile = reconcile;
        self
    }

    /// Replaces the router settings.
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Replaces the warmup settings.
    pub fn with_warmup(mut self, warmup: WarmupConfig) -> Self {
        self.warmup = warmup;
        self
    }

    /// Replaces the ping burst settings.
    pub fn with_ping_burst(mut self, ping_burst: PingBurstConfig) -> Self {
        self.ping_burst = ping_burst;
        self
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`SyncError::InvalidConfig`] found.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.latency.validate()?;
        self.actions.validate()?;
        self.reconcile.validate()?;
        self.batch.validate()?;
        self.warmup.validate()?;
        self.ping_burst.validate()
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

    fn field_of(err: SyncError) -> &'static str {
        match err {
            SyncError::InvalidConfig { field, .. } => field,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = SyncEngineConfig::default();
        assert_eq!(config.actions.max_pending_actions, 15);
        assert_eq!(config.actions.rollback_timeout, Duration::from_millis(1500));
        assert_eq!(config.reconcile.desync_threshold, 2);
        assert_eq!(config.reconcile.stale_after, Duration::from_millis(3000));
        assert_eq!(config.batch.batch_window, Duration::from_millis(4));
        assert_eq!(config.warmup.ping_count, 5);
        assert_eq!(config.warmup.spacing, Duration::from_millis(20));
        assert_eq!(config.ping_burst.burst_size, 3);
        assert_eq!(config.ping_burst.burst_timeout, Duration::from_secs(2));
        assert_eq!(config.latency.initial_estimate_ms, 50.0);
        assert_eq!(config.latency.min_animation_lead, Duration::from_millis(20));
    }

    #[test]
    fn presets_are_valid() {
        for config in [
            SyncEngineConfig::default(),
            SyncEngineConfig::lan(),
            SyncEngineConfig::mobile(),
            SyncEngineConfig::high_latency(),
        ] {
            assert!(config.validate().is_ok(), "{:?}", config);
        }
        assert!(ReconcileConfig::strict().validate().is_ok());
        assert!(BatchConfig::immediate().validate().is_ok());
    }

    #[test]
    fn zero_pending_cap_is_rejected() {
        let config = SyncEngineConfig::new().with_actions(ActionConfig {
            max_pending_actions: 0,
            ..ActionConfig::default()
        });
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "actions.max_pending_actions"
        );
    }

    #[test]
    fn zero_rollback_timeout_is_rejected() {
        let actions = ActionConfig {
            rollback_timeout: Duration::ZERO,
            ..ActionConfig::default()
        };
        assert_eq!(
            field_of(actions.validate().unwrap_err()),
            "actions.rollback_timeout"
        );
    }

    #[test]
    fn non_finite_noise_is_rejected() {
        let latency = LatencyConfig {
            measurement_noise: f64::NAN,
            ..LatencyConfig::default()
        };
        assert_eq!(
            field_of(latency.validate().unwrap_err()),
            "latency.measurement_noise"
        );
    }

    #[test]
    fn jitter_window_cannot_exceed_history() {
        let latency = LatencyConfig {
            history_size: 10,
            jitter_window: 20,
            ..LatencyConfig::default()
        };
        assert_eq!(
            field_of(latency.validate().unwrap_err()),
            "latency.jitter_window"
        );
    }

    #[test]
    fn zero_desync_threshold_is_rejected() {
        let reconcile = ReconcileConfig {
            desync_threshold: 0,
            ..ReconcileConfig::default()
        };
        let err = reconcile.validate().unwrap_err();
        assert!(err.to_string().contains("reconcile.desync_threshold"));
    }

    #[test]
    fn with_methods_replace_sections() {
        let config = SyncEngineConfig::new()
            .with_batch(BatchConfig::immediate())
            .with_warmup(WarmupConfig::quick());
        assert_eq!(config.batch.batch_window, Duration::ZERO);
        assert_eq!(config.warmup.ping_count, 3);
        assert_eq!(config.actions, ActionConfig::default());
    }
}
