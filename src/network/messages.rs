use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Event names understood by every peer.
pub mod events {
    /// A player started rolling the dice.
    pub const DICE_ROLL_START: &str = "dice_roll_start";
    /// The dice came to rest.
    pub const DICE_ROLL_RESULT: &str = "dice_roll_result";
    /// A token was picked up.
    pub const TOKEN_SELECT: &str = "token_select";
    /// A token was moved.
    pub const TOKEN_MOVE: &str = "token_move";
    /// A turn ended.
    pub const TURN_COMPLETE: &str = "turn_complete";
    /// The match ended.
    pub const GAME_END: &str = "game_end";
    /// Latency probe.
    pub const PING: &str = "ping";
    /// Reply to a latency probe.
    pub const PONG: &str = "pong";
    /// Client-side metrics.
    pub const TELEMETRY: &str = "telemetry";
    /// Presence heartbeat.
    pub const PRESENCE: &str = "presence";
    /// Several queued messages sent as one.
    pub const BATCH: &str = "batch";
}

/// Events that are sent immediately instead of waiting for the batch window.
pub const PRIORITY_EVENTS: [&str; 8] = [
    events::DICE_ROLL_START,
    events::DICE_ROLL_RESULT,
    events::TOKEN_SELECT,
    events::TOKEN_MOVE,
    events::TURN_COMPLETE,
    events::GAME_END,
    events::PING,
    events::PONG,
];

/// Scheduling class of an outgoing message.
///
/// Ordered by urgency: `Critical < Normal < Low`, which is also the order a batch is sent in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessagePriority {
    /// Gameplay-critical; bypasses the batch queue.
    Critical,
    /// Everything not otherwise classified.
    Normal,
    /// Background traffic such as telemetry and presence.
    Low,
}

impl MessagePriority {
    /// Classifies an event name.
    #[must_use]
    pub fn classify(event: &str) -> Self {
        if PRIORITY_EVENTS.contains(&event) {
            MessagePriority::Critical
        } else if event == events::TELEMETRY || event == events::PRESENCE {
            MessagePriority::Low
        } else {
            MessagePriority::Normal
        }
    }
}

/// A message as it crosses the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub payload: Value,
}

impl WireMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// The scheduling class of this message's event.
    #[must_use]
    pub fn priority(&self) -> MessagePriority {
        MessagePriority::classify(&self.event)
    }

    /// Wraps several messages into one `batch` message.
    #[must_use]
    pub fn batch(messages: Vec<WireMessage>) -> Self {
        let messages: Vec<Value> = messages
            .into_iter()
            .map(|m| json!({ "event": m.event, "payload": m.payload }))
            .collect();
        Self::new(events::BATCH, json!({ "messages": messages }))
    }

    /// Expands a `batch` message into its parts; any other message is returned alone.
    ///
    /// Malformed entries inside a batch are skipped.
    #[must_use]
    pub fn unbatch(self) -> Vec<WireMessage> {
        if self.event != events::BATCH {
            return vec![self];
        }
        match self.payload {
            Value::Object(mut map) => match map.remove("messages") {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// The broadcast envelope handed to a channel: `{"type": "broadcast", "event", "payload"}`.
    #[must_use]
    pub fn to_broadcast(&self) -> Value {
        json!({
            "type": "broadcast",
            "event": self.event,
            "payload": self.payload,
        })
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
    fn classifies_events() {
        for event in PRIORITY_EVENTS {
            assert_eq!(MessagePriority::classify(event), MessagePriority::Critical);
        }
        assert_eq!(
            MessagePriority::classify(events::TELEMETRY),
            MessagePriority::Low
        );
        assert_eq!(
            MessagePriority::classify(events::PRESENCE),
            MessagePriority::Low
        );
        assert_eq!(
            MessagePriority::classify("chat_message"),
            MessagePriority::Normal
        );
    }

    #[test]
    fn priorities_sort_by_urgency() {
        let mut priorities = vec![
            MessagePriority::Low,
            MessagePriority::Critical,
            MessagePriority::Normal,
        ];
        priorities.sort();
        assert_eq!(
            priorities,
            vec![
                MessagePriority::Critical,
                MessagePriority::Normal,
                MessagePriority::Low
            ]
        );
    }

    #[test]
    fn broadcast_envelope_shape() {
        let message = WireMessage::new("token_move", json!({ "cell": 5 }));
        assert_eq!(
            message.to_broadcast(),
            json!({ "type": "broadcast", "event": "token_move", "payload": { "cell": 5 } })
        );
    }

    #[test]
    fn batch_expands_back_into_parts() {
        let parts = vec![
            WireMessage::new("chat", json!("hi")),
            WireMessage::new("presence", json!({ "online": true })),
        ];
        let batch = WireMessage::batch(parts.clone());
        assert_eq!(batch.event, events::BATCH);
        assert_eq!(batch.payload["messages"].as_array().unwrap().len(), 2);
        assert_eq!(batch.unbatch(), parts);
    }

    #[test]
    fn unbatch_passes_plain_messages_through() {
        let message = WireMessage::new("chat", Value::Null);
        assert_eq!(message.clone().unbatch(), vec![message]);
        let broken = WireMessage::new(events::BATCH, json!({ "messages": 3 }));
        assert!(broken.unbatch().is_empty());
    }
}
