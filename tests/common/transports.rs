//! In-memory transports.

use parking_lot::Mutex;
use std::sync::Arc;
use turnsync::{Transport, TransportError, WireMessage};

/// Records every message. Clones share the same log, so a test keeps one handle and gives
/// the other to the engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<WireMessage>>>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<WireMessage> {
        self.sent.lock().clone()
    }

    /// Event names in send order.
    pub fn events(&self) -> Vec<String> {
        self.sent.lock().iter().map(|m| m.event.clone()).collect()
    }

    /// Every message with batches expanded, in delivery order.
    pub fn delivered(&self) -> Vec<WireMessage> {
        self.sent
            .lock()
            .iter()
            .cloned()
            .flat_map(WireMessage::unbatch)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Rejects every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingTransport;

impl Transport for FailingTransport {
    fn send(&mut self, _message: &WireMessage) -> Result<(), TransportError> {
        Err(TransportError::new("channel closed"))
    }
}
