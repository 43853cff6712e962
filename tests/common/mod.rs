//! Common test infrastructure shared across integration tests.
//!
//! This module provides:
//! - `transports`: in-memory transports that record or reject messages
//! - `handlers`: a handler recording every engine notification
//! - `test_utils`: engine construction helpers driven by a manual clock
//!
//! # Usage
//!
//! ```ignore
//! #[path = "common/mod.rs"]
//! mod common;
//! use common::{engine_with_clock, RecordingHandler, RecordingTransport};
//! ```

pub mod handlers;
pub mod test_utils;
pub mod transports;

// Not every integration crate uses every helper.
#[allow(unused_imports)]
pub use handlers::{HandlerLog, RecordingHandler};
#[allow(unused_imports)]
pub use test_utils::{board, engine_with_clock, init_tracing, moved_board, TestEngine};
#[allow(unused_imports)]
pub use transports::{FailingTransport, RecordingTransport};
