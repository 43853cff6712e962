//! # turnsync
//!
//! Optimistic state synchronization for turn-based multiplayer board games played over an
//! unreliable broadcast channel.
//!
//! A player's own actions are applied locally before any peer has seen them. The engine keeps
//! a snapshot from before each action and hands it back if no confirmation arrives in time;
//! it ships only the parts of the game state that changed; it estimates the round trip so
//! animations can start early; and it compares state checksums with peers to detect
//! divergence.
//!
//! The engine is poll-driven. It owns no threads and no timers: the host calls
//! [`SyncEngine::poll`] from its own loop, and every deadline is measured against an injected
//! [`Clock`](clock::Clock).
//!
//! ```
//! use serde_json::json;
//! use turnsync::prelude::*;
//!
//! struct Channel;
//! impl Transport for Channel {
//!     fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
//!         // hand `message.to_broadcast()` to the realtime channel here
//!         Ok(())
//!     }
//! }
//!
//! struct Board;
//! impl SyncHandler for Board {
//!     fn on_rollback(&mut self, action: RolledBackAction) {
//!         // restore action.optimistic_state
//!     }
//! }
//!
//! let mut engine = SyncEngine::new(SyncEngineConfig::default())?;
//! engine.initialize(Channel, "player-1", Box::new(Board));
//! engine.update_state(&json!({ "tokens": [0, 0] }));
//! engine.send_action("move-1", "token_move", json!({ "token": 0, "to": 5 }),
//!     json!({ "tokens": [0, 0] }));
//! engine.poll();
//! # Ok::<(), SyncError>(())
//! ```

#![forbid(unsafe_code)] // let us try
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use checksum::{compute_checksum, Checksum};
pub use delta::{
    apply_delta, apply_delta_with_observer, DeltaChange, DeltaCompressor, Path, PathSegment,
    StateDelta,
};
pub use error::{SyncError, TransportError};
pub use network::latency::LatencyPredictor;
pub use network::messages::{MessagePriority, WireMessage};
pub use network::ping_burst::PingBurstManager;
pub use network::quality::{NetworkGrade, NetworkQuality, NetworkQualityGrader};
pub use network::router::MessageRouter;
pub use network::warmup::{ConnectionWarmup, WarmupResult};
pub use optimistic::{ActionStats, OptimisticActionManager, PendingAction, RolledBackAction};
pub use reconcile::{ChecksumVerdict, StateReconciler};
pub use sessions::config::{
    ActionConfig, BatchConfig, LatencyConfig, PingBurstConfig, ReconcileConfig,
    SyncEngineConfig, WarmupConfig,
};
pub use sessions::sync_engine::{SyncEngine, SyncHandler, SyncStats};
pub use sessions::sync_health::SyncHealth;

pub mod checksum;
pub mod clock;
pub mod delta;
#[doc(hidden)]
pub mod error;
pub mod hash;
pub mod optimistic;
pub mod prelude;
pub mod reconcile;
pub mod telemetry;
pub mod timer;
pub mod sessions {
    //! The engine, its configuration and its health summary.
    pub mod config;
    pub mod sync_engine;
    pub mod sync_health;
}
pub mod network {
    //! Latency estimation, connection grading and outgoing message scheduling.
    pub mod latency;
    /// Wire message shape, event names and priority classes.
    pub mod messages;
    pub mod ping_burst;
    pub mod quality;
    pub mod router;
    pub mod warmup;
}

/// A `Result` whose error defaults to [`SyncError`].
pub type SyncResult<T, E = SyncError> = Result<T, E>;

/// The channel the engine writes to.
///
/// Implement this for whatever carries broadcasts between players: a realtime channel, a
/// websocket, an in-memory loopback in tests. Delivery may be unordered and unreliable; the
/// engine relies on rollback and checksums, never on retransmission. Inbound messages are not
/// part of this trait: the host feeds them back through [`SyncEngine::confirm_action`],
/// [`SyncEngine::apply_remote_delta`] and [`SyncEngine::verify_sync`].
#[cfg(feature = "sync-send")]
pub trait Transport: Send {
    /// Hands `message` to the channel.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the channel rejected the message. The engine logs and
    /// drops it.
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError>;
}

/// The channel the engine writes to.
///
/// Implement this for whatever carries broadcasts between players: a realtime channel, a
/// websocket, an in-memory loopback in tests. Delivery may be unordered and unreliable; the
/// engine relies on rollback and checksums, never on retransmission. Inbound messages are not
/// part of this trait: the host feeds them back through [`SyncEngine::confirm_action`],
/// [`SyncEngine::apply_remote_delta`] and [`SyncEngine::verify_sync`].
#[cfg(not(feature = "sync-send"))]
pub trait Transport {
    /// Hands `message` to the channel.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the channel rejected the message. The engine logs and
    /// drops it.
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        (**self).send(message)
    }
}

/// Internal module exposing implementation details for testing and fuzzing.
///
/// **This module is NOT part of the public API** and carries no stability guarantees.
#[doc(hidden)]
pub mod __internal {
    pub use crate::hash::{fnv1a_hash, DeterministicHasher};
    pub use crate::timer::Deadlines;
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

    struct Counting(usize);

    impl Transport for Counting {
        fn send(&mut self, _message: &WireMessage) -> Result<(), TransportError> {
            self.0 += 1;
            Ok(())
        }
    }

    #[test]
    fn boxed_transports_forward() {
        let mut boxed: Box<Counting> = Box::new(Counting(0));
        boxed.send(&WireMessage::new("ping", json!({}))).unwrap();
        assert_eq!(boxed.0, 1);
    }

    #[test]
    fn sync_result_defaults_to_sync_error() {
        fn parse(s: &str) -> SyncResult<Checksum> {
            s.parse()
        }
        assert!(parse("0000002a").is_ok());
        assert!(parse("xyz").is_err());
    }
}
