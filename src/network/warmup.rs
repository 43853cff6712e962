//! Latency priming on session start.
//!
//! Before the first real action the predictor only knows its initial guess. A short run of
//! sequential pings replaces that guess with measurements, so the first animation lead time
//! is already close to the real link.
//!
//! The runner does not know how to ping. The caller supplies a closure performing one round
//! trip and returning its duration; failures are swallowed, since priming is best-effort.
//!
//! | Runner | Waits with | Availability |
//! |--------|------------|--------------|
//! | [`ConnectionWarmup::run_blocking`] | `std::thread::sleep` | always |
//! | `ConnectionWarmup::run` | `tokio::time::sleep` | `tokio` feature |

use std::fmt::Display;
use tracing::debug;
use web_time::Duration;

use crate::sessions::config::WarmupConfig;

/// Outcome of a warmup run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WarmupResult {
    /// Successful round trips in milliseconds, in the order they completed.
    pub samples: Vec<f64>,
    /// Mean of `samples`, or `None` if every ping failed.
    pub average_latency: Option<f64>,
    /// True once a run has completed.
    pub ready: bool,
}

impl WarmupResult {
    fn from_samples(samples: Vec<f64>) -> Self {
        let average_latency = if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        };
        Self {
            samples,
            average_latency,
            ready: true,
        }
    }
}

/// Runs a fixed number of spaced, sequential pings.
#[derive(Debug, Clone, Default)]
pub struct ConnectionWarmup {
    config: WarmupConfig,
    result: Option<WarmupResult>,
}

impl ConnectionWarmup {
    /// Creates a warmup runner with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a warmup runner with the given configuration.
    #[must_use]
    pub fn with_config(config: WarmupConfig) -> Self {
        Self {
            config,
            result: None,
        }
    }

    /// Runs the warmup on the current thread.
    ///
    /// `send_ping` performs one round trip. Each call waits for the previous one; the runner
    /// sleeps for the configured spacing between calls. Running again replaces the previous
    /// result.
    pub fn run_blocking<F, E>(&mut self, mut send_ping: F) -> WarmupResult
    where
        F: FnMut() -> Result<Duration, E>,
        E: Display,
    {
        let mut samples = Vec::with_capacity(self.config.ping_count);
        for i in 0..self.config.ping_count {
            if i > 0 && !self.config.spacing.is_zero() {
                std::thread::sleep(self.config.spacing);
            }
            record_outcome(&mut samples, i, send_ping());
        }
        self.finish(samples)
    }

    /// Runs the warmup on a Tokio runtime.
    ///
    /// Same contract as [`run_blocking`](Self::run_blocking), awaiting each ping and
    /// yielding to the runtime between them.
    #[cfg(feature = "tokio")]
    pub async fn run<F, Fut, E>(&mut self, mut send_ping: F) -> WarmupResult
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<Duration, E>>,
        E: Display,
    {
        let mut samples = Vec::with_capacity(self.config.ping_count);
        for i in 0..self.config.ping_count {
            if i > 0 && !self.config.spacing.is_zero() {
                tokio::time::sleep(self.config.spacing).await;
            }
            record_outcome(&mut samples, i, send_ping().await);
        }
        self.finish(samples)
    }

    /// Returns true once a run has completed since creation or the last reset.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.ready)
    }

    /// Average of the last run, if it produced any sample.
    #[must_use]
    pub fn average_latency(&self) -> Option<f64> {
        self.result.as_ref().and_then(|r| r.average_latency)
    }

    /// The last result, if any.
    #[must_use]
    pub fn result(&self) -> Option<&WarmupResult> {
        self.result.as_ref()
    }

    /// Forgets the previous result.
    pub fn reset(&mut self) {
        self.result = None;
    }

    fn finish(&mut self, samples: Vec<f64>) -> WarmupResult {
        let result = WarmupResult::from_samples(samples);
        debug!(
            "Warmup finished with {} of {} pings, average {:?}",
            result.samples.len(),
            self.config.ping_count,
            result.average_latency
        );
        self.result = Some(result.clone());
        result
    }
}

fn record_outcome<E: Display>(samples: &mut Vec<f64>, attempt: usize, outcome: Result<Duration, E>) {
    match outcome {
        Ok(rtt) => samples.push(rtt.as_nanos() as f64 / 1_000_000.0),
        Err(err) => debug!("Warmup ping {} failed: {}", attempt, err),
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

    fn quick() -> ConnectionWarmup {
        ConnectionWarmup::with_config(WarmupConfig {
            ping_count: 5,
            spacing: Duration::ZERO,
        })
    }

    #[test]
    fn averages_successful_pings() {
        let mut warmup = quick();
        let mut rtts = [30u64, 40, 50, 60, 70].into_iter();
        let result = warmup.run_blocking(|| {
            rtts.next()
                .map(Duration::from_millis)
                .ok_or("exhausted")
        });
        assert!(result.ready);
        assert_eq!(result.samples.len(), 5);
        assert_eq!(result.average_latency, Some(50.0));
        assert!(warmup.is_ready());
        assert_eq!(warmup.average_latency(), Some(50.0));
    }

    #[test]
    fn failures_are_swallowed() {
        let mut warmup = quick();
        let mut calls = 0;
        let result = warmup.run_blocking(|| {
            calls += 1;
            if calls % 2 == 0 {
                Err("timed out")
            } else {
                Ok(Duration::from_millis(20))
            }
        });
        assert_eq!(calls, 5);
        assert_eq!(result.samples.len(), 3);
        assert_eq!(result.average_latency, Some(20.0));
    }

    #[test]
    fn all_failures_still_complete() {
        let mut warmup = quick();
        let result = warmup.run_blocking(|| Err::<Duration, _>("offline"));
        assert!(result.ready);
        assert_eq!(result.average_latency, None);
    }

    #[test]
    fn rerun_replaces_and_reset_clears() {
        let mut warmup = quick();
        warmup.run_blocking(|| Ok::<_, &str>(Duration::from_millis(100)));
        warmup.run_blocking(|| Ok::<_, &str>(Duration::from_millis(10)));
        assert_eq!(warmup.average_latency(), Some(10.0));
        warmup.reset();
        assert!(!warmup.is_ready());
        assert!(warmup.result().is_none());
    }

    #[test]
    fn spacing_is_applied_between_pings() {
        let mut warmup = ConnectionWarmup::with_config(WarmupConfig {
            ping_count: 3,
            spacing: Duration::from_millis(5),
        });
        let start = std::time::Instant::now();
        warmup.run_blocking(|| Ok::<_, &str>(Duration::from_millis(1)));
        assert!(start.elapsed() >= std::time::Duration::from_millis(10));
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn async_run_awaits_each_ping() {
        let mut warmup = ConnectionWarmup::with_config(WarmupConfig {
            ping_count: 4,
            spacing: Duration::from_millis(1),
        });
        let mut sent = 0u64;
        let result = warmup
            .run(|| {
                sent += 1;
                let rtt = sent * 10;
                async move {
                    tokio::task::yield_now().await;
                    if rtt == 30 {
                        Err("lost")
                    } else {
                        Ok(Duration::from_millis(rtt))
                    }
                }
            })
            .await;
        assert_eq!(result.samples, vec![10.0, 20.0, 40.0]);
        assert!(warmup.is_ready());
    }
}
