//! Synchronization health status.
//!
//! This module provides the [`SyncHealth`] enum summarizing what the last checksum
//! comparisons with a peer said about the shared game state.

use crate::checksum::Checksum;

/// Health status of synchronization with a remote peer.
///
/// # Example
///
/// ```ignore
/// match engine.sync_health() {
///     SyncHealth::InSync => {},
///     SyncHealth::DesyncDetected { .. } => request_full_state(),
///     SyncHealth::Mismatch { .. } | SyncHealth::Pending => {
///         // wait for the next checksum
///     },
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHealth {
    /// Checksums matched at the most recent comparison.
    ///
    /// This does not guarantee the states agree right now, only at the last comparison.
    InSync,

    /// No comparison has succeeded yet.
    ///
    /// This typically occurs early in a match, or right after a reset.
    Pending,

    /// The latest comparisons disagreed, but not often enough to call it a desync.
    Mismatch {
        /// Mismatches in a row.
        consecutive: u32,
    },

    /// Checksums kept differing: the states have diverged.
    ///
    /// Stays reported until the next match or reset.
    DesyncDetected {
        /// The local checksum when the desync was detected, if one had been computed.
        local: Option<Checksum>,
        /// The checksum the peer reported.
        remote: Checksum,
    },
}

impl SyncHealth {
    /// Returns true for [`SyncHealth::InSync`].
    #[must_use]
    pub const fn is_in_sync(&self) -> bool {
        matches!(self, SyncHealth::InSync)
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

    #[test]
    fn sync_health_desync_inequality() {
        let a = SyncHealth::DesyncDetected {
            local: Some(Checksum::new(0x1234)),
            remote: Checksum::new(0x5678),
        };
        let b = SyncHealth::DesyncDetected {
            local: Some(Checksum::new(0x1234)),
            remote: Checksum::new(0x9999),
        };
        assert_ne!(a, b);
    }

    #[test]
    fn sync_health_different_variants_not_equal() {
        assert_ne!(SyncHealth::InSync, SyncHealth::Pending);
        assert_ne!(
            SyncHealth::Pending,
            SyncHealth::Mismatch { consecutive: 1 }
        );
        assert!(SyncHealth::InSync.is_in_sync());
        assert!(!SyncHealth::Mismatch { consecutive: 1 }.is_in_sync());
    }

    #[test]
    fn sync_health_debug_format() {
        let desync = SyncHealth::DesyncDetected {
            local: None,
            remote: Checksum::new(42),
        };
        let debug_str = format!("{:?}", desync);
        assert!(debug_str.contains("DesyncDetected"));
        assert!(debug_str.contains("remote"));
    }
}
