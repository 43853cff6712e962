//! Convenient re-exports for common usage.
//!
//! ```rust
//! use turnsync::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Engine**: [`SyncEngine`], [`SyncHandler`], [`SyncStats`], [`SyncHealth`]
//! - **Core traits**: [`Transport`]
//! - **Wire types**: [`WireMessage`], [`StateDelta`], [`Checksum`]
//! - **Callback payloads**: [`RolledBackAction`]
//! - **Network**: [`ConnectionWarmup`], [`WarmupResult`], [`NetworkQuality`], [`NetworkGrade`]
//! - **Error handling**: [`SyncError`], [`TransportError`], [`SyncResult`]
//! - **Configuration**: [`SyncEngineConfig`]

pub use crate::checksum::Checksum;
pub use crate::delta::StateDelta;
pub use crate::error::{SyncError, TransportError};
pub use crate::network::messages::WireMessage;
pub use crate::network::quality::{NetworkGrade, NetworkQuality};
pub use crate::network::warmup::{ConnectionWarmup, WarmupResult};
pub use crate::optimistic::RolledBackAction;
pub use crate::sessions::config::SyncEngineConfig;
pub use crate::sessions::sync_engine::{SyncEngine, SyncHandler, SyncStats};
pub use crate::sessions::sync_health::SyncHealth;
pub use crate::{SyncResult, Transport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_exposes_engine_types() {
        let config = SyncEngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(Checksum::new(0).to_string(), "00000000");
    }
}
