//! Priority routing and batching of outgoing messages.
//!
//! Gameplay-critical events go out at once. Everything else waits in a queue for a short
//! batch window so that a burst of chatter costs one send instead of many. A critical event
//! first flushes whatever is queued, so it is never reordered ahead of messages submitted
//! before it, yet it never waits for the next window either.

use serde_json::Value;
use tracing::trace;
use web_time::Instant;

use super::messages::{MessagePriority, WireMessage};
use crate::sessions::config::BatchConfig;
use crate::timer::Deadlines;
use crate::{Transport, TransportError};

#[derive(Debug, Clone)]
struct Queued {
    priority: MessagePriority,
    seq: u64,
    message: WireMessage,
}

/// Routes messages to a [`Transport`], batching non-critical ones.
///
/// The router owns no transport; every method that may send borrows one. Failures are
/// returned to the caller and the affected messages are dropped, never retried.
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    config: BatchConfig,
    queue: Vec<Queued>,
    next_seq: u64,
    epoch: u64,
    flush_at: Deadlines<u64>,
}

impl MessageRouter {
    /// Creates a router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router with the given configuration.
    #[must_use]
    pub fn with_config(config: BatchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Sends or enqueues a message depending on its event's priority.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if a send attempted by this call failed.
    pub fn route<T: Transport + ?Sized>(
        &mut self,
        event: impl Into<String>,
        payload: Value,
        transport: &mut T,
        now: Instant,
    ) -> Result<(), TransportError> {
        let message = WireMessage::new(event, payload);
        let priority = message.priority();
        if priority == MessagePriority::Critical {
            return self.send_immediate(&message, transport);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Queued {
            priority,
            seq,
            message,
        });
        if self.flush_at.is_empty() {
            self.epoch += 1;
            self.flush_at
                .schedule(self.epoch, now + self.config.batch_window);
        }
        Ok(())
    }

    /// Flushes the queue, then sends `message` regardless of its priority.
    ///
    /// # Errors
    ///
    /// Returns the first transport error. The message is still attempted if the flush failed.
    pub fn send_immediate<T: Transport + ?Sized>(
        &mut self,
        message: &WireMessage,
        transport: &mut T,
    ) -> Result<(), TransportError> {
        let flushed = self.flush(transport);
        trace!("Sending {} immediately", message.event);
        let sent = transport.send(message);
        flushed.and(sent)
    }

    /// Flushes the queue if its batch window has elapsed.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the flush failed.
    pub fn poll<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: Instant,
    ) -> Result<(), TransportError> {
        if self.flush_at.pop_due(now).is_empty() {
            return Ok(());
        }
        self.flush(transport)
    }

    /// Sends everything queued, most urgent first, as a single message.
    ///
    /// A lone message is sent as itself; several are wrapped in one `batch` message. Does
    /// nothing when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns the transport's error. The queue is dropped either way.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<(), TransportError> {
        self.flush_at.clear();
        if self.queue.is_empty() {
            return Ok(());
        }
        let mut queued = std::mem::take(&mut self.queue);
        queued.sort_by_key(|q| (q.priority, q.seq));
        let mut messages: Vec<WireMessage> = queued.into_iter().map(|q| q.message).collect();

        trace!("Flushing {} queued messages", messages.len());
        match messages.pop() {
            Some(only) if messages.is_empty() => transport.send(&only),
            Some(last) => {
                messages.push(last);
                transport.send(&WireMessage::batch(messages))
            },
            None => Ok(()),
        }
    }

    /// Drops the queue and its pending flush without sending anything.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.flush_at.clear();
    }

    /// Number of queued messages.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// When the queue will be flushed, if anything is queued.
    #[must_use]
    pub fn next_flush_at(&self) -> Option<Instant> {
        self.flush_at.next_deadline()
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
    use crate::network::messages::events;
    use serde_json::json;
    use web_time::Duration;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<WireMessage>,
        fail: bool,
    }

    impl Transport for Recorder {
        fn send(&mut self, message: &WireMessage) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::new("channel closed"));
            }
            self.sent.push(message.clone());
            Ok(())
        }
    }

    #[test]
    fn critical_events_bypass_the_queue() {
        let now = Instant::now();
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        router
            .route(events::TOKEN_MOVE, json!({ "cell": 5 }), &mut transport, now)
            .unwrap();
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(router.queued_len(), 0);
        assert_eq!(router.next_flush_at(), None);
    }

    #[test]
    fn normal_events_wait_for_the_window() {
        let now = Instant::now();
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        router.route("chat", json!(1), &mut transport, now).unwrap();
        router.route("chat", json!(2), &mut transport, now).unwrap();
        assert!(transport.sent.is_empty());
        assert_eq!(router.next_flush_at(), Some(now + Duration::from_millis(4)));

        router
            .poll(&mut transport, now + Duration::from_millis(3))
            .unwrap();
        assert!(transport.sent.is_empty());

        router
            .poll(&mut transport, now + Duration::from_millis(4))
            .unwrap();
        assert_eq!(transport.sent.len(), 1);
        assert_eq!(transport.sent[0].event, events::BATCH);
        assert_eq!(router.queued_len(), 0);
    }

    #[test]
    fn critical_event_flushes_earlier_messages_first() {
        let now = Instant::now();
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        for i in 0..3 {
            router.route("chat", json!(i), &mut transport, now).unwrap();
        }
        router
            .route(events::DICE_ROLL_START, json!({}), &mut transport, now)
            .unwrap();

        assert_eq!(transport.sent.len(), 2);
        assert_eq!(transport.sent[0].event, events::BATCH);
        assert_eq!(transport.sent[1].event, events::DICE_ROLL_START);
        assert_eq!(router.next_flush_at(), None);
    }

    #[test]
    fn batch_orders_by_priority_then_submission() {
        let now = Instant::now();
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        router
            .route(events::PRESENCE, json!("p1"), &mut transport, now)
            .unwrap();
        router.route("chat", json!("c1"), &mut transport, now).unwrap();
        router
            .route(events::TELEMETRY, json!("t1"), &mut transport, now)
            .unwrap();
        router.route("chat", json!("c2"), &mut transport, now).unwrap();
        router.flush(&mut transport).unwrap();

        let parts = transport.sent.pop().unwrap().unbatch();
        let payloads: Vec<&Value> = parts.iter().map(|m| &m.payload).collect();
        assert_eq!(
            payloads,
            vec![&json!("c1"), &json!("c2"), &json!("p1"), &json!("t1")]
        );
    }

    #[test]
    fn single_queued_message_is_sent_unwrapped() {
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        router
            .route("chat", json!("solo"), &mut transport, Instant::now())
            .unwrap();
        router.flush(&mut transport).unwrap();
        assert_eq!(transport.sent, vec![WireMessage::new("chat", json!("solo"))]);
    }

    #[test]
    fn flush_on_empty_queue_is_a_no_op() {
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        router.flush(&mut transport).unwrap();
        router.flush(&mut transport).unwrap();
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn clear_drops_without_sending() {
        let now = Instant::now();
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        router.route("chat", json!(1), &mut transport, now).unwrap();
        router.clear();
        router
            .poll(&mut transport, now + Duration::from_secs(1))
            .unwrap();
        assert!(transport.sent.is_empty());
        assert_eq!(router.next_flush_at(), None);
    }

    #[test]
    fn failures_are_returned_and_queue_dropped() {
        let now = Instant::now();
        let mut router = MessageRouter::new();
        let mut transport = Recorder {
            fail: true,
            ..Recorder::default()
        };
        router.route("chat", json!(1), &mut transport, now).unwrap();
        assert!(router.flush(&mut transport).is_err());
        assert_eq!(router.queued_len(), 0);
    }

    #[test]
    fn new_window_starts_after_a_flush() {
        let now = Instant::now();
        let mut router = MessageRouter::new();
        let mut transport = Recorder::default();
        router.route("chat", json!(1), &mut transport, now).unwrap();
        router.flush(&mut transport).unwrap();
        let later = now + Duration::from_millis(50);
        router.route("chat", json!(2), &mut transport, later).unwrap();
        assert_eq!(
            router.next_flush_at(),
            Some(later + Duration::from_millis(4))
        );
    }
}
