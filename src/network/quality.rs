//! Human-facing network quality grading.

use serde::Serialize;
use std::fmt;

use super::latency::LatencyPredictor;
use crate::sessions::config::LatencyConfig;

/// Latency penalty bands: `(lower bound ms, penalty per ms above the bound)`.
///
/// Each band applies between its bound and the next band's bound; the last is open-ended.
const LATENCY_BANDS: [(f64, f64); 4] = [(20.0, 0.2), (50.0, 0.4), (100.0, 0.6), (200.0, 1.0)];
const JITTER_PENALTY_PER_MS: f64 = 0.5;
const LOSS_PENALTY_PER_PERCENT: f64 = 5.0;

/// Six-step ordinal connection grade. `S` is best; ordering follows quality (`S > F`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum NetworkGrade {
    /// Unplayable.
    F,
    /// Poor.
    D,
    /// Fair.
    C,
    /// Good.
    B,
    /// Great.
    A,
    /// Excellent.
    S,
}

impl NetworkGrade {
    /// Maps a 0-100 score to a grade.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            95.. => NetworkGrade::S,
            85.. => NetworkGrade::A,
            70.. => NetworkGrade::B,
            55.. => NetworkGrade::C,
            40.. => NetworkGrade::D,
            _ => NetworkGrade::F,
        }
    }

    /// A short description suitable for a connection indicator.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            NetworkGrade::S => "Excellent",
            NetworkGrade::A => "Great",
            NetworkGrade::B => "Good",
            NetworkGrade::C => "Fair",
            NetworkGrade::D => "Poor",
            NetworkGrade::F => "Unplayable",
        }
    }
}

impl PartialOrd for NetworkGrade {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetworkGrade {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl fmt::Display for NetworkGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            NetworkGrade::S => "S",
            NetworkGrade::A => "A",
            NetworkGrade::B => "B",
            NetworkGrade::C => "C",
            NetworkGrade::D => "D",
            NetworkGrade::F => "F",
        };
        f.write_str(letter)
    }
}

/// Result of [`NetworkQualityGrader::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use = "NetworkQuality should be inspected or used after being queried"]
pub struct NetworkQuality {
    /// The grade.
    pub grade: NetworkGrade,
    /// Score from 0 (worst) to 100 (best).
    pub score: u8,
    /// Smoothed latency the score was computed from.
    pub latency_ms: f64,
    /// Jitter the score was computed from.
    pub jitter_ms: f64,
    /// Packet loss ratio, 0 to 1.
    pub packet_loss: f64,
    /// Human-readable description of the grade.
    pub description: &'static str,
}

/// Aggregates latency, jitter and packet loss into a [`NetworkQuality`].
///
/// The grader owns the engine's [`LatencyPredictor`]; every successful ping feeds it.
#[derive(Debug, Clone, Default)]
pub struct NetworkQualityGrader {
    predictor: LatencyPredictor,
    received: u64,
    lost: u64,
}

impl NetworkQualityGrader {
    /// Creates a grader with a default predictor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a grader whose predictor uses `config`.
    #[must_use]
    pub fn with_config(config: LatencyConfig) -> Self {
        Self {
            predictor: LatencyPredictor::with_config(config),
            received: 0,
            lost: 0,
        }
    }

    /// Records a successful ping and returns the updated latency estimate.
    pub fn record_ping(&mut self, latency_ms: f64) -> f64 {
        // rejected samples count as neither success nor loss
        if latency_ms.is_finite() && latency_ms >= 0.0 {
            self.received += 1;
        }
        self.predictor.update(latency_ms)
    }

    /// Records a ping that never came back.
    pub fn record_loss(&mut self) {
        self.lost += 1;
    }

    /// Lost pings as a fraction of all pings, 0 when nothing was recorded.
    #[must_use]
    pub fn packet_loss(&self) -> f64 {
        let total = self.received + self.lost;
        if total == 0 {
            0.0
        } else {
            self.lost as f64 / total as f64
        }
    }

    /// The underlying latency predictor.
    #[must_use]
    pub fn predictor(&self) -> &LatencyPredictor {
        &self.predictor
    }

    /// Scores the connection.
    pub fn analyze(&self) -> NetworkQuality {
        let latency_ms = self.predictor.smoothed_latency();
        let jitter_ms = self.predictor.jitter();
        let packet_loss = self.packet_loss();

        let penalty = latency_penalty(latency_ms)
            + jitter_ms * JITTER_PENALTY_PER_MS
            + packet_loss * 100.0 * LOSS_PENALTY_PER_PERCENT;
        let score = (100.0 - penalty).clamp(0.0, 100.0).round() as u8;
        let grade = NetworkGrade::from_score(score);

        NetworkQuality {
            grade,
            score,
            latency_ms,
            jitter_ms,
            packet_loss,
            description: grade.description(),
        }
    }

    /// Forgets all samples and loss counts.
    pub fn reset(&mut self) {
        self.predictor.reset();
        self.received = 0;
        self.lost = 0;
    }
}

fn latency_penalty(latency_ms: f64) -> f64 {
    let mut penalty = 0.0;
    for (i, &(lower, per_ms)) in LATENCY_BANDS.iter().enumerate() {
        if latency_ms <= lower {
            break;
        }
        let upper = LATENCY_BANDS
            .get(i + 1)
            .map_or(f64::INFINITY, |&(next, _)| next);
        penalty += (latency_ms.min(upper) - lower) * per_ms;
    }
    penalty
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
    fn score_thresholds() {
        assert_eq!(NetworkGrade::from_score(100), NetworkGrade::S);
        assert_eq!(NetworkGrade::from_score(95), NetworkGrade::S);
        assert_eq!(NetworkGrade::from_score(94), NetworkGrade::A);
        assert_eq!(NetworkGrade::from_score(85), NetworkGrade::A);
        assert_eq!(NetworkGrade::from_score(84), NetworkGrade::B);
        assert_eq!(NetworkGrade::from_score(70), NetworkGrade::B);
        assert_eq!(NetworkGrade::from_score(69), NetworkGrade::C);
        assert_eq!(NetworkGrade::from_score(55), NetworkGrade::C);
        assert_eq!(NetworkGrade::from_score(54), NetworkGrade::D);
        assert_eq!(NetworkGrade::from_score(40), NetworkGrade::D);
        assert_eq!(NetworkGrade::from_score(39), NetworkGrade::F);
        assert_eq!(NetworkGrade::from_score(0), NetworkGrade::F);
    }

    #[test]
    fn grades_order_by_quality() {
        assert!(NetworkGrade::S > NetworkGrade::A);
        assert!(NetworkGrade::D > NetworkGrade::F);
        assert_eq!(NetworkGrade::B.to_string(), "B");
    }

    #[test]
    fn latency_bands_are_graduated() {
        assert_eq!(latency_penalty(10.0), 0.0);
        assert_eq!(latency_penalty(20.0), 0.0);
        assert!((latency_penalty(30.0) - 2.0).abs() < 1e-9);
        // 30ms * 0.2 + 50ms * 0.4
        assert!((latency_penalty(100.0) - 26.0).abs() < 1e-9);
        // + 100ms * 0.6 + 50ms * 1.0
        assert!((latency_penalty(250.0) - 136.0).abs() < 1e-9);
    }

    #[test]
    fn fast_stable_link_is_excellent() {
        let mut grader = NetworkQualityGrader::new();
        for _ in 0..20 {
            grader.record_ping(15.0);
        }
        let quality = grader.analyze();
        assert_eq!(quality.grade, NetworkGrade::S);
        assert_eq!(quality.score, 100);
        assert_eq!(quality.description, "Excellent");
    }

    #[test]
    fn packet_loss_is_heavily_penalized() {
        let mut grader = NetworkQualityGrader::new();
        for _ in 0..18 {
            grader.record_ping(15.0);
        }
        grader.record_loss();
        grader.record_loss();
        assert!((grader.packet_loss() - 0.1).abs() < 1e-9);
        // 10% loss * 5 per percent = 50 points
        let quality = grader.analyze();
        assert_eq!(quality.score, 50);
        assert_eq!(quality.grade, NetworkGrade::D);
    }

    #[test]
    fn slow_jittery_link_is_unplayable() {
        let mut grader = NetworkQualityGrader::new();
        for i in 0..20 {
            grader.record_ping(if i % 2 == 0 { 150.0 } else { 350.0 });
        }
        assert_eq!(grader.analyze().grade, NetworkGrade::F);
    }

    #[test]
    fn rejected_samples_do_not_count_as_received() {
        let mut grader = NetworkQualityGrader::new();
        grader.record_ping(f64::NAN);
        grader.record_loss();
        assert_eq!(grader.packet_loss(), 1.0);
    }

    #[test]
    fn reset_clears_counts() {
        let mut grader = NetworkQualityGrader::new();
        grader.record_ping(30.0);
        grader.record_loss();
        grader.reset();
        assert_eq!(grader.packet_loss(), 0.0);
        assert_eq!(grader.predictor().sample_count(), 0);
    }
}
