//! Checksum-based divergence detection.

use serde_json::Value;
use tracing::debug;
use web_time::Instant;

use crate::checksum::{compute_checksum, Checksum};
use crate::sessions::config::ReconcileConfig;
use crate::sessions::sync_health::SyncHealth;

/// Outcome of comparing the local checksum with a peer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumVerdict {
    /// The checksums agree.
    Match,
    /// The checksums differ, but not often enough in a row to call it a desync.
    Mismatch {
        /// Mismatches in a row, including this one.
        consecutive: u32,
    },
    /// Repeated mismatches: the states have diverged and need a full resync.
    Desync {
        /// Local checksum at detection.
        local: Option<Checksum>,
        /// Remote checksum at detection.
        remote: Checksum,
    },
}

impl ChecksumVerdict {
    /// Returns true for [`ChecksumVerdict::Match`].
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, ChecksumVerdict::Match)
    }
}

/// Compares local state fingerprints against those reported by a peer.
///
/// A single mismatch is tolerated, since a checksum can cross a state update in flight. Only
/// `desync_threshold` mismatches in a row escalate.
#[derive(Debug, Clone)]
pub struct StateReconciler {
    config: ReconcileConfig,
    local: Option<Checksum>,
    consecutive_mismatches: u32,
    last_reconciled: Option<Instant>,
    last_desync: Option<(Option<Checksum>, Checksum)>,
    // staleness is measured from here until the first match
    epoch: Instant,
}

impl StateReconciler {
    /// Creates a reconciler; `now` starts the staleness clock.
    #[must_use]
    pub fn new(config: ReconcileConfig, now: Instant) -> Self {
        Self {
            config,
            local: None,
            consecutive_mismatches: 0,
            last_reconciled: None,
            last_desync: None,
            epoch: now,
        }
    }

    /// Recomputes the local checksum from `state`.
    pub fn update_local_checksum(&mut self, state: &Value) -> Checksum {
        let checksum = compute_checksum(state);
        self.local = Some(checksum);
        checksum
    }

    /// Sets the local checksum directly.
    pub fn set_local_checksum(&mut self, checksum: Checksum) {
        self.local = Some(checksum);
    }

    /// Compares the local checksum with a peer's.
    ///
    /// With no local checksum yet, any remote checksum counts as a mismatch.
    pub fn compare_with_remote(&mut self, remote: Checksum, now: Instant) -> ChecksumVerdict {
        if self.local == Some(remote) {
            self.consecutive_mismatches = 0;
            self.last_reconciled = Some(now);
            self.last_desync = None;
            return ChecksumVerdict::Match;
        }

        self.consecutive_mismatches += 1;
        if self.consecutive_mismatches >= self.config.desync_threshold {
            debug!(
                "Desync detected after {} mismatches: local {:?}, remote {}",
                self.consecutive_mismatches, self.local, remote
            );
            self.consecutive_mismatches = 0;
            self.last_desync = Some((self.local, remote));
            return ChecksumVerdict::Desync {
                local: self.local,
                remote,
            };
        }

        debug!(
            "Checksum mismatch {}/{}: local {:?}, remote {}",
            self.consecutive_mismatches, self.config.desync_threshold, self.local, remote
        );
        ChecksumVerdict::Mismatch {
            consecutive: self.consecutive_mismatches,
        }
    }

    /// Returns true if no reconciliation succeeded within `stale_after`.
    #[must_use]
    pub fn needs_force_sync(&self, now: Instant) -> bool {
        let since = self.last_reconciled.unwrap_or(self.epoch);
        now.saturating_duration_since(since) > self.config.stale_after
    }

    /// Clears all reconciliation state and restarts the staleness clock.
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(self.config, now);
    }

    /// The stored local checksum.
    #[must_use]
    pub fn local_checksum(&self) -> Option<Checksum> {
        self.local
    }

    /// Current run of mismatches.
    #[must_use]
    pub fn consecutive_mismatches(&self) -> u32 {
        self.consecutive_mismatches
    }

    /// When checksums last matched.
    #[must_use]
    pub fn last_reconciled(&self) -> Option<Instant> {
        self.last_reconciled
    }

    /// Summary of the reconciliation state.
    pub fn health(&self) -> SyncHealth {
        if let Some((local, remote)) = self.last_desync {
            return SyncHealth::DesyncDetected { local, remote };
        }
        if self.consecutive_mismatches > 0 {
            return SyncHealth::Mismatch {
                consecutive: self.consecutive_mismatches,
            };
        }
        if self.last_reconciled.is_some() {
            SyncHealth::InSync
        } else {
            SyncHealth::Pending
        }
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
    use serde_json::json;
    use web_time::Duration;

    fn reconciler(now: Instant) -> StateReconciler {
        StateReconciler::new(ReconcileConfig::default(), now)
    }

    #[test]
    fn matching_checksum_reconciles() {
        let now = Instant::now();
        let mut rec = reconciler(now);
        let local = rec.update_local_checksum(&json!({ "turn": 3 }));
        assert_eq!(rec.compare_with_remote(local, now), ChecksumVerdict::Match);
        assert_eq!(rec.last_reconciled(), Some(now));
        assert_eq!(rec.health(), SyncHealth::InSync);
    }

    #[test]
    fn single_mismatch_is_tolerated() {
        let now = Instant::now();
        let mut rec = reconciler(now);
        rec.set_local_checksum(Checksum::new(1));
        assert_eq!(
            rec.compare_with_remote(Checksum::new(2), now),
            ChecksumVerdict::Mismatch { consecutive: 1 }
        );
        assert_eq!(rec.health(), SyncHealth::Mismatch { consecutive: 1 });
    }

    #[test]
    fn two_consecutive_mismatches_desync_and_reset_counter() {
        let now = Instant::now();
        let mut rec = reconciler(now);
        rec.set_local_checksum(Checksum::new(1));
        rec.compare_with_remote(Checksum::new(2), now);
        assert_eq!(
            rec.compare_with_remote(Checksum::new(3), now),
            ChecksumVerdict::Desync {
                local: Some(Checksum::new(1)),
                remote: Checksum::new(3),
            }
        );
        assert_eq!(rec.consecutive_mismatches(), 0);
        assert!(matches!(rec.health(), SyncHealth::DesyncDetected { .. }));
    }

    #[test]
    fn isolated_mismatch_after_match_does_not_desync() {
        let now = Instant::now();
        let mut rec = reconciler(now);
        rec.set_local_checksum(Checksum::new(1));
        rec.compare_with_remote(Checksum::new(9), now);
        assert!(rec.compare_with_remote(Checksum::new(1), now).is_match());
        assert_eq!(
            rec.compare_with_remote(Checksum::new(9), now),
            ChecksumVerdict::Mismatch { consecutive: 1 }
        );
    }

    #[test]
    fn missing_local_checksum_counts_as_mismatch() {
        let now = Instant::now();
        let mut rec = reconciler(now);
        assert_eq!(
            rec.compare_with_remote(Checksum::new(7), now),
            ChecksumVerdict::Mismatch { consecutive: 1 }
        );
    }

    #[test]
    fn staleness_is_measured_from_last_match() {
        let start = Instant::now();
        let mut rec = reconciler(start);
        assert!(!rec.needs_force_sync(start + Duration::from_millis(3000)));
        assert!(rec.needs_force_sync(start + Duration::from_millis(3001)));

        rec.set_local_checksum(Checksum::new(1));
        let matched = start + Duration::from_millis(4000);
        rec.compare_with_remote(Checksum::new(1), matched);
        assert!(!rec.needs_force_sync(matched + Duration::from_millis(2000)));
        assert!(rec.needs_force_sync(matched + Duration::from_millis(3500)));
    }

    #[test]
    fn reset_clears_everything() {
        let start = Instant::now();
        let mut rec = reconciler(start);
        rec.set_local_checksum(Checksum::new(1));
        rec.compare_with_remote(Checksum::new(2), start);
        let later = start + Duration::from_secs(10);
        rec.reset(later);
        assert_eq!(rec.local_checksum(), None);
        assert_eq!(rec.consecutive_mismatches(), 0);
        assert_eq!(rec.health(), SyncHealth::Pending);
        assert!(!rec.needs_force_sync(later + Duration::from_millis(100)));
    }

    #[test]
    fn strict_config_escalates_immediately() {
        let now = Instant::now();
        let mut rec = StateReconciler::new(ReconcileConfig::strict(), now);
        rec.set_local_checksum(Checksum::new(1));
        assert!(matches!(
            rec.compare_with_remote(Checksum::new(2), now),
            ChecksumVerdict::Desync { .. }
        ));
    }
}
