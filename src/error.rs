use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Failure reported by a [`Transport`](crate::Transport) when a broadcast could not be handed off.
///
/// The engine never retries on this error. It is logged and swallowed; an action whose
/// message never left is rolled back by the normal timeout like any other unconfirmed action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportError {
    /// Why the transport rejected the message.
    pub context: String,
}

impl TransportError {
    /// Creates a new transport error with the given context.
    #[must_use]
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport error: {}", self.context)
    }
}

impl Error for TransportError {}

/// This enum contains all error messages this library can return.
///
/// Most engine operations do not return errors at all: failures in the realtime path
/// degrade to signals (a `false` return, a rollback, a desync callback). `SyncError` is used
/// where a `Result` is the honest signature, such as validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncError {
    /// A configuration value is out of range or inconsistent with another value.
    InvalidConfig {
        /// The offending field, e.g. `"actions.max_pending_actions"`.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// A checksum string could not be parsed.
    InvalidChecksum {
        /// The rejected input.
        input: String,
    },
    /// The transport rejected a message.
    Transport(TransportError),
}

impl Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for {}: {}", field, reason)
            },
            SyncError::InvalidChecksum { input } => {
                write!(
                    f,
                    "Invalid checksum {:?}: expected 8 hexadecimal characters",
                    input
                )
            },
            SyncError::Transport(err) => write!(f, "{}", err),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        SyncError::Transport(err)
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
    fn invalid_config_display_names_field() {
        let err = SyncError::InvalidConfig {
            field: "actions.max_pending_actions",
            reason: "must be at least 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("actions.max_pending_actions"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn transport_error_converts_and_exposes_source() {
        let err: SyncError = TransportError::new("channel closed").into();
        assert_eq!(err.to_string(), "Transport error: channel closed");
        assert!(err.source().is_some());
    }

    #[test]
    fn invalid_checksum_has_no_source() {
        let err = SyncError::InvalidChecksum {
            input: "xyz".to_string(),
        };
        assert!(err.source().is_none());
        assert!(err.to_string().contains("xyz"));
    }
}
