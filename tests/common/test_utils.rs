//! Shared test utilities for integration tests.

use serde_json::{json, Value};
use turnsync::clock::ManualClock;
use turnsync::{SyncEngine, SyncEngineConfig};

use super::handlers::RecordingHandler;
use super::transports::RecordingTransport;

/// An initialized engine together with the handles a test drives it through.
#[allow(dead_code)]
pub struct TestEngine {
    pub engine: SyncEngine<RecordingTransport>,
    pub clock: ManualClock,
    pub transport: RecordingTransport,
    pub handler: RecordingHandler,
}

/// Routes engine logs to the test harness output, captured unless a test fails.
#[allow(dead_code)]
pub fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .finish();
    // another test in this binary may have installed it already
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Builds and initializes an engine on a manual clock.
#[allow(dead_code)]
pub fn engine_with_clock(config: SyncEngineConfig, local_id: &str) -> TestEngine {
    init_tracing();
    let clock = ManualClock::new();
    let transport = RecordingTransport::new();
    let handler = RecordingHandler::new();
    let mut engine = SyncEngine::with_clock(config, clock.clone()).unwrap();
    engine.initialize(transport.clone(), local_id, handler.boxed());
    TestEngine {
        engine,
        clock,
        transport,
        handler,
    }
}

/// A two-player board with every token at home.
#[allow(dead_code)]
pub fn board() -> Value {
    json!({
        "turn": 1,
        "dice": null,
        "players": [
            { "id": "p1", "tokens": [0, 0, 0, 0] },
            { "id": "p2", "tokens": [0, 0, 0, 0] }
        ]
    })
}

/// [`board`] with the first token of player one moved to `cell`.
#[allow(dead_code)]
pub fn moved_board(cell: u64) -> Value {
    let mut state = board();
    state["players"][0]["tokens"][0] = json!(cell);
    state["dice"] = json!(cell);
    state
}
