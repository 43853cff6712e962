//! Grouping of near-simultaneous pings into one measurement.
//!
//! A single ping is easily inflated by whatever the event loop was doing when the reply
//! arrived. Sending a few at once and keeping the fastest filters that out.

use smallvec::SmallVec;
use std::collections::BTreeMap;
use tracing::trace;
use web_time::Instant;

use crate::sessions::config::PingBurstConfig;

#[derive(Debug, Clone)]
struct Burst {
    started: Instant,
    samples: SmallVec<[f64; 4]>,
}

/// Tracks open ping bursts by id.
#[derive(Debug, Clone, Default)]
pub struct PingBurstManager {
    config: PingBurstConfig,
    bursts: BTreeMap<String, Burst>,
}

impl PingBurstManager {
    /// Creates a manager with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager with the given configuration.
    #[must_use]
    pub fn with_config(config: PingBurstConfig) -> Self {
        Self {
            config,
            bursts: BTreeMap::new(),
        }
    }

    /// Opens a measurement window. Starting an id that is already open restarts it.
    pub fn start_burst(&mut self, id: impl Into<String>, now: Instant) {
        self.bursts.insert(
            id.into(),
            Burst {
                started: now,
                samples: SmallVec::new(),
            },
        );
    }

    /// Adds a sample to the window `id`.
    ///
    /// Returns true once the window holds enough samples to produce a result. Unknown ids
    /// are ignored and return false.
    pub fn record_ping(&mut self, id: &str, latency_ms: f64) -> bool {
        match self.bursts.get_mut(id) {
            Some(burst) => {
                burst.samples.push(latency_ms);
                burst.samples.len() >= self.config.burst_size
            },
            None => false,
        }
    }

    /// Closes the window `id` and returns its fastest sample.
    ///
    /// Returns `None` for unknown ids or windows without samples; the window is discarded
    /// either way.
    pub fn burst_result(&mut self, id: &str) -> Option<f64> {
        let burst = self.bursts.remove(id)?;
        burst.samples.into_iter().reduce(f64::min)
    }

    /// Evicts incomplete windows older than the burst timeout. Returns how many were evicted.
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let timeout = self.config.burst_timeout;
        let burst_size = self.config.burst_size;
        let before = self.bursts.len();
        self.bursts.retain(|id, burst| {
            let stale = burst.samples.len() < burst_size
                && now.saturating_duration_since(burst.started) > timeout;
            if stale {
                trace!("Evicting stale ping burst {}", id);
            }
            !stale
        });
        before - self.bursts.len()
    }

    /// Number of open windows.
    #[must_use]
    pub fn active_bursts(&self) -> usize {
        self.bursts.len()
    }

    /// Drops every window.
    pub fn clear(&mut self) {
        self.bursts.clear();
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
    use web_time::Duration;

    #[test]
    fn completes_after_burst_size_and_keeps_minimum() {
        let now = Instant::now();
        let mut manager = PingBurstManager::new();
        manager.start_burst("b1", now);
        assert!(!manager.record_ping("b1", 48.0));
        assert!(!manager.record_ping("b1", 31.0));
        assert!(manager.record_ping("b1", 40.0));
        assert_eq!(manager.burst_result("b1"), Some(31.0));
        assert_eq!(manager.active_bursts(), 0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut manager = PingBurstManager::new();
        assert!(!manager.record_ping("nope", 10.0));
        assert_eq!(manager.burst_result("nope"), None);
    }

    #[test]
    fn empty_burst_has_no_result() {
        let mut manager = PingBurstManager::new();
        manager.start_burst("b", Instant::now());
        assert_eq!(manager.burst_result("b"), None);
        assert_eq!(manager.active_bursts(), 0);
    }

    #[test]
    fn cleanup_evicts_only_stale_incomplete_bursts() {
        let start = Instant::now();
        let mut manager = PingBurstManager::new();
        manager.start_burst("stale", start);
        manager.record_ping("stale", 20.0);
        manager.start_burst("complete", start);
        for _ in 0..3 {
            manager.record_ping("complete", 20.0);
        }
        manager.start_burst("fresh", start + Duration::from_millis(1500));

        assert_eq!(manager.cleanup(start + Duration::from_millis(1000)), 0);
        assert_eq!(manager.cleanup(start + Duration::from_millis(2500)), 1);
        assert_eq!(manager.active_bursts(), 2);
        assert_eq!(manager.burst_result("complete"), Some(20.0));
    }

    #[test]
    fn restarting_a_burst_drops_old_samples() {
        let now = Instant::now();
        let mut manager = PingBurstManager::with_config(PingBurstConfig {
            burst_size: 2,
            ..PingBurstConfig::default()
        });
        manager.start_burst("b", now);
        manager.record_ping("b", 5.0);
        manager.start_burst("b", now);
        assert!(!manager.record_ping("b", 50.0));
        assert!(manager.record_ping("b", 60.0));
        assert_eq!(manager.burst_result("b"), Some(50.0));
    }
}
