//! A handler that records every notification.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use turnsync::{Checksum, RolledBackAction, StateDelta, SyncHandler};

/// Everything a [`RecordingHandler`] has been told.
#[derive(Debug, Clone, Default)]
pub struct HandlerLog {
    pub state_updates: Vec<(Value, StateDelta)>,
    pub rollbacks: Vec<RolledBackAction>,
    pub desyncs: Vec<(Option<Checksum>, Checksum)>,
}

/// Records notifications into a shared [`HandlerLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    log: Arc<Mutex<HandlerLog>>,
}

#[allow(dead_code)]
impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the log so far.
    pub fn log(&self) -> HandlerLog {
        self.log.lock().clone()
    }

    /// Boxes a clone for [`turnsync::SyncEngine::initialize`].
    pub fn boxed(&self) -> Box<dyn SyncHandler> {
        Box::new(self.clone())
    }
}

impl SyncHandler for RecordingHandler {
    fn on_state_update(&mut self, state: &Value, delta: &StateDelta) {
        self.log
            .lock()
            .state_updates
            .push((state.clone(), delta.clone()));
    }

    fn on_rollback(&mut self, action: RolledBackAction) {
        self.log.lock().rollbacks.push(action);
    }

    fn on_desync(&mut self, local: Option<Checksum>, remote: Checksum) {
        self.log.lock().desyncs.push((local, remote));
    }
}
