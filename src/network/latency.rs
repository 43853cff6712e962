//! Round-trip latency estimation.
//!
//! [`LatencyPredictor`] runs a scalar Kalman filter over RTT samples. The filter estimate
//! tracks the "true" latency and converges quickly on a stable link; a short ring of the most
//! recent samples backs the median shown to players, and the longer history backs the jitter
//! figure.

use std::collections::VecDeque;
use web_time::Duration;

use crate::report_violation;
use crate::sessions::config::LatencyConfig;
use crate::telemetry::{ViolationKind, ViolationSeverity};

/// Scalar Kalman filter over round-trip-time samples, in milliseconds.
#[derive(Debug, Clone)]
pub struct LatencyPredictor {
    config: LatencyConfig,
    estimate: f64,
    error_covariance: f64,
    history: VecDeque<f64>,
    jitter_buffer: VecDeque<f64>,
}

impl Default for LatencyPredictor {
    fn default() -> Self {
        Self::with_config(LatencyConfig::default())
    }
}

impl LatencyPredictor {
    /// Creates a predictor with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a predictor with the given configuration.
    #[must_use]
    pub fn with_config(config: LatencyConfig) -> Self {
        Self {
            estimate: config.initial_estimate_ms,
            error_covariance: config.initial_covariance,
            history: VecDeque::with_capacity(config.history_size),
            jitter_buffer: VecDeque::with_capacity(config.jitter_buffer_size),
            config,
        }
    }

    /// Feeds one RTT measurement and returns the updated estimate.
    ///
    /// Negative or non-finite samples are rejected and leave the filter untouched.
    pub fn update(&mut self, measurement_ms: f64) -> f64 {
        if !measurement_ms.is_finite() || measurement_ms < 0.0 {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::LatencySample,
                "rejected latency sample {}",
                measurement_ms
            );
            return self.estimate;
        }

        // predict
        let predicted_covariance = self.error_covariance + self.config.process_noise;
        // update
        let gain = predicted_covariance / (predicted_covariance + self.config.measurement_noise);
        self.estimate += gain * (measurement_ms - self.estimate);
        self.error_covariance = (1.0 - gain) * predicted_covariance;

        push_bounded(&mut self.history, measurement_ms, self.config.history_size);
        push_bounded(
            &mut self.jitter_buffer,
            measurement_ms,
            self.config.jitter_buffer_size,
        );
        self.estimate
    }

    /// The current estimate, rounded to whole milliseconds.
    #[must_use]
    pub fn predict(&self) -> u64 {
        self.estimate.max(0.0).round() as u64
    }

    /// The raw filter estimate.
    #[must_use]
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Median of the recent samples; steadier for display than the raw estimate.
    ///
    /// Falls back to the estimate before any sample arrives.
    #[must_use]
    pub fn smoothed_latency(&self) -> f64 {
        if self.jitter_buffer.is_empty() {
            return self.estimate;
        }
        let mut sorted: Vec<f64> = self.jitter_buffer.iter().copied().collect();
        sorted.sort_unstable_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    /// Population standard deviation of the last `jitter_window` samples.
    #[must_use]
    pub fn jitter(&self) -> f64 {
        let window = self.config.jitter_window.min(self.history.len());
        if window < 2 {
            return 0.0;
        }
        let recent = self.history.iter().skip(self.history.len() - window);
        let mean = recent.clone().sum::<f64>() / window as f64;
        let variance = recent.map(|s| (s - mean).powi(2)).sum::<f64>() / window as f64;
        variance.sqrt()
    }

    /// How settled the filter is, from 0 (no idea) to 1.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        (1.0 - self.error_covariance).clamp(0.0, 1.0)
    }

    /// How long before the expected confirmation a predicted animation should start.
    ///
    /// Half the predicted round trip (the one-way leg), never less than
    /// `min_animation_lead`.
    #[must_use]
    pub fn animation_lead_time(&self) -> Duration {
        Duration::from_millis(self.predict() / 2).max(self.config.min_animation_lead)
    }

    /// Number of samples in the long history.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// Forgets every sample and restores the initial estimate.
    pub fn reset(&mut self) {
        *self = Self::with_config(self.config);
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64, capacity: usize) {
    while buffer.len() >= capacity.max(1) {
        buffer.pop_front();
    }
    buffer.push_back(value);
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

    #[test]
    fn starts_at_initial_estimate() {
        let predictor = LatencyPredictor::new();
        assert_eq!(predictor.predict(), 50);
        assert_eq!(predictor.confidence(), 0.0);
        assert_eq!(predictor.jitter(), 0.0);
    }

    #[test]
    fn constant_samples_converge() {
        let mut predictor = LatencyPredictor::new();
        for _ in 0..10 {
            predictor.update(40.0);
        }
        let predicted = predictor.predict() as i64;
        assert!((predicted - 40).abs() <= 2, "predicted {}", predicted);
        assert!(predictor.confidence() > 0.5);
        assert_eq!(predictor.jitter(), 0.0);
    }

    #[test]
    fn alternating_samples_show_jitter() {
        let mut noisy = LatencyPredictor::new();
        let mut steady = LatencyPredictor::new();
        for i in 0..20 {
            noisy.update(if i % 2 == 0 { 10.0 } else { 90.0 });
            steady.update(50.0);
        }
        assert!(noisy.jitter() > steady.jitter());
        assert!((noisy.jitter() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn smoothed_latency_is_median_of_recent() {
        let mut predictor = LatencyPredictor::new();
        for sample in [30.0, 500.0, 32.0, 31.0, 29.0] {
            predictor.update(sample);
        }
        assert_eq!(predictor.smoothed_latency(), 31.0);
    }

    #[test]
    fn buffers_are_bounded() {
        let config = LatencyConfig {
            history_size: 5,
            jitter_buffer_size: 3,
            ..LatencyConfig::default()
        };
        let mut predictor = LatencyPredictor::with_config(config);
        for i in 0..20 {
            predictor.update(f64::from(i));
        }
        assert_eq!(predictor.sample_count(), 5);
        // jitter buffer holds 17, 18, 19
        assert_eq!(predictor.smoothed_latency(), 18.0);
    }

    #[test]
    fn rejects_invalid_samples() {
        let mut predictor = LatencyPredictor::new();
        predictor.update(f64::NAN);
        predictor.update(-5.0);
        predictor.update(f64::INFINITY);
        assert_eq!(predictor.sample_count(), 0);
        assert_eq!(predictor.predict(), 50);
    }

    #[test]
    fn animation_lead_is_half_rtt_with_floor() {
        let mut predictor = LatencyPredictor::new();
        for _ in 0..30 {
            predictor.update(120.0);
        }
        assert_eq!(predictor.animation_lead_time(), Duration::from_millis(60));

        let mut fast = LatencyPredictor::new();
        for _ in 0..30 {
            fast.update(8.0);
        }
        assert_eq!(fast.animation_lead_time(), Duration::from_millis(20));
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut predictor = LatencyPredictor::new();
        predictor.update(200.0);
        predictor.reset();
        assert_eq!(predictor.predict(), 50);
        assert_eq!(predictor.sample_count(), 0);
    }
}
