//! Locally applied actions awaiting confirmation.
//!
//! When a player acts, the game applies the result immediately and registers the action here
//! together with a snapshot of the state from before it. Either a confirmation arrives in
//! time, or the deadline passes and the action is handed back for rollback. Exactly one of
//! the two happens per action, unless the manager is cleared first.

use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, trace};
use web_time::{Duration, Instant};

use crate::sessions::config::ActionConfig;
use crate::timer::Deadlines;

/// An action applied locally but not yet confirmed by the authority.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    /// Unique id of the action.
    pub id: String,
    /// Game-defined action type, e.g. `"token_move"`.
    pub action_type: String,
    /// Payload as sent.
    pub payload: Value,
    /// When the action was registered.
    pub created_at: Instant,
    /// State to restore if the action is rolled back. Never transmitted.
    pub optimistic_state: Value,
    /// Whether the action was confirmed. Actions leave the pending set when confirmed, so
    /// snapshots returned by [`OptimisticActionManager::pending_actions`] report `false`.
    pub confirmed: bool,
    /// Retransmissions of this action. Reliability is rollback-based, so this stays 0.
    pub retries: u32,
}

/// An action that timed out unconfirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct RolledBackAction {
    /// Id of the action.
    pub id: String,
    /// Game-defined action type.
    pub action_type: String,
    /// The snapshot passed at registration.
    pub optimistic_state: Value,
    /// How long the action was pending.
    pub pending_for: Duration,
}

/// Aggregate counters of an [`OptimisticActionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[must_use = "ActionStats should be inspected or used after being queried"]
pub struct ActionStats {
    /// Actions currently pending.
    pub pending: usize,
    /// Actions confirmed since creation.
    pub confirmed: u64,
    /// Actions rolled back since creation.
    pub rollbacks: u64,
    /// Mean confirm latency over recent confirmations, rounded to whole milliseconds.
    pub average_confirm_ms: u64,
    /// When the last confirmation arrived.
    pub last_sync: Option<Instant>,
}

/// Tracks pending actions and their rollback deadlines.
#[derive(Debug, Clone, Default)]
pub struct OptimisticActionManager {
    config: ActionConfig,
    // registration order
    pending: Vec<PendingAction>,
    deadlines: Deadlines<String>,
    confirm_latencies: VecDeque<Duration>,
    confirmed: u64,
    rollbacks: u64,
    last_sync: Option<Instant>,
}

impl OptimisticActionManager {
    /// Creates a manager with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager with the given configuration.
    #[must_use]
    pub fn with_config(config: ActionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Registers an optimistically applied action and starts its rollback deadline.
    ///
    /// Returns false, registering nothing, if the pending set is full or `id` is already
    /// pending.
    pub fn register_action(
        &mut self,
        id: impl Into<String>,
        action_type: impl Into<String>,
        payload: Value,
        optimistic_state: Value,
        now: Instant,
    ) -> bool {
        let id = id.into();
        if self.pending.len() >= self.config.max_pending_actions {
            debug!(
                "Rejecting action {}: {} actions already pending",
                id,
                self.pending.len()
            );
            return false;
        }
        if self.deadlines.contains(&id) {
            debug!("Rejecting action {}: id already pending", id);
            return false;
        }

        self.deadlines
            .schedule(id.clone(), now + self.config.rollback_timeout);
        trace!("Registered action {}", id);
        self.pending.push(PendingAction {
            id,
            action_type: action_type.into(),
            payload,
            created_at: now,
            optimistic_state,
            confirmed: false,
            retries: 0,
        });
        true
    }

    /// Confirms a pending action, cancelling its rollback.
    ///
    /// Returns false for ids that are not pending (never registered, already confirmed or
    /// already rolled back); that case changes nothing.
    pub fn confirm_action(&mut self, id: &str, now: Instant) -> bool {
        let Some(index) = self.pending.iter().position(|a| a.id == id) else {
            return false;
        };
        let mut action = self.pending.remove(index);
        action.confirmed = true;
        self.deadlines.cancel(&action.id);

        let latency = now.saturating_duration_since(action.created_at);
        while self.confirm_latencies.len() >= self.config.confirm_sample_size.max(1) {
            self.confirm_latencies.pop_front();
        }
        self.confirm_latencies.push_back(latency);
        self.confirmed += 1;
        self.last_sync = Some(now);
        trace!("Confirmed action {} after {:?}", action.id, latency);
        true
    }

    /// Removes every action whose deadline has passed and returns them for rollback.
    ///
    /// Actions are returned in deadline order.
    pub fn expire(&mut self, now: Instant) -> Vec<RolledBackAction> {
        let mut rolled_back = Vec::new();
        for id in self.deadlines.pop_due(now) {
            let Some(index) = self.pending.iter().position(|a| a.id == id) else {
                continue;
            };
            if self.pending.get(index).is_some_and(|a| a.confirmed) {
                continue;
            }
            let action = self.pending.remove(index);
            self.rollbacks += 1;
            let pending_for = now.saturating_duration_since(action.created_at);
            debug!(
                "Rolling back action {} ({}) after {:?} unconfirmed",
                action.id, action.action_type, pending_for
            );
            rolled_back.push(RolledBackAction {
                id: action.id,
                action_type: action.action_type,
                optimistic_state: action.optimistic_state,
                pending_for,
            });
        }
        rolled_back
    }

    /// Returns true if an action of `action_type` is pending.
    #[must_use]
    pub fn has_pending_action(&self, action_type: &str) -> bool {
        self.pending
            .iter()
            .any(|a| !a.confirmed && a.action_type == action_type)
    }

    /// Snapshot of the pending actions in registration order.
    #[must_use]
    pub fn pending_actions(&self) -> Vec<PendingAction> {
        self.pending.clone()
    }

    /// Number of pending actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// The earliest rollback deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.next_deadline()
    }

    /// Aggregate counters.
    pub fn stats(&self) -> ActionStats {
        let average_confirm_ms = if self.confirm_latencies.is_empty() {
            0
        } else {
            let total: f64 = self
                .confirm_latencies
                .iter()
                .map(|d| d.as_secs_f64() * 1000.0)
                .sum();
            (total / self.confirm_latencies.len() as f64).round() as u64
        };
        ActionStats {
            pending: self.pending.len(),
            confirmed: self.confirmed,
            rollbacks: self.rollbacks,
            average_confirm_ms,
            last_sync: self.last_sync,
        }
    }

    /// Drops every pending action without rolling any back.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadlines.clear();
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
    use serde_json::json;

    fn register(manager: &mut OptimisticActionManager, id: &str, now: Instant) -> bool {
        manager.register_action(id, "token_move", json!({}), json!({ "before": id }), now)
    }

    #[test]
    fn rejects_beyond_the_cap() {
        let now = Instant::now();
        let mut manager = OptimisticActionManager::new();
        for i in 0..15 {
            assert!(register(&mut manager, &format!("a{}", i), now));
        }
        assert!(!register(&mut manager, "a15", now));
        assert_eq!(manager.pending_count(), 15);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let now = Instant::now();
        let mut manager = OptimisticActionManager::new();
        assert!(register(&mut manager, "a", now));
        assert!(!register(&mut manager, "a", now));
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn confirmed_action_never_rolls_back() {
        let now = Instant::now();
        let mut manager = OptimisticActionManager::new();
        register(&mut manager, "a", now);
        assert!(manager.confirm_action("a", now + Duration::from_millis(80)));
        assert!(manager.expire(now + Duration::from_secs(10)).is_empty());
        assert!(!manager.confirm_action("a", now + Duration::from_millis(90)));

        let stats = manager.stats();
        assert_eq!(stats.confirmed, 1);
        assert_eq!(stats.rollbacks, 0);
        assert_eq!(stats.average_confirm_ms, 80);
        assert_eq!(stats.last_sync, Some(now + Duration::from_millis(80)));
    }

    #[test]
    fn timeout_rolls_back_exactly_once_with_snapshot() {
        let now = Instant::now();
        let mut manager = OptimisticActionManager::new();
        register(&mut manager, "a", now);

        assert!(manager.expire(now + Duration::from_millis(1499)).is_empty());
        let rolled = manager.expire(now + Duration::from_millis(1500));
        assert_eq!(rolled.len(), 1);
        assert_eq!(rolled[0].optimistic_state, json!({ "before": "a" }));
        assert_eq!(rolled[0].pending_for, Duration::from_millis(1500));

        assert!(manager.expire(now + Duration::from_secs(5)).is_empty());
        assert!(!manager.confirm_action("a", now + Duration::from_secs(5)));
        assert_eq!(manager.stats().rollbacks, 1);
    }

    #[test]
    fn expire_returns_actions_in_deadline_order() {
        let start = Instant::now();
        let mut manager = OptimisticActionManager::new();
        register(&mut manager, "second", start + Duration::from_millis(10));
        register(&mut manager, "first", start);
        let ids: Vec<String> = manager
            .expire(start + Duration::from_secs(2))
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn pending_queries() {
        let now = Instant::now();
        let mut manager = OptimisticActionManager::new();
        manager.register_action("r", "dice_roll", json!(1), json!(null), now);
        register(&mut manager, "m", now);
        assert!(manager.has_pending_action("dice_roll"));
        assert!(!manager.has_pending_action("game_end"));
        let ids: Vec<String> = manager.pending_actions().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["r", "m"]);
        assert_eq!(
            manager.next_deadline(),
            Some(now + Duration::from_millis(1500))
        );
    }

    #[test]
    fn clear_drops_without_rollback() {
        let now = Instant::now();
        let mut manager = OptimisticActionManager::new();
        register(&mut manager, "a", now);
        register(&mut manager, "b", now);
        manager.clear();
        assert!(manager.expire(now + Duration::from_secs(5)).is_empty());
        assert_eq!(manager.stats().rollbacks, 0);
        assert_eq!(manager.next_deadline(), None);
    }

    #[test]
    fn confirm_latency_samples_are_bounded() {
        let now = Instant::now();
        let mut manager = OptimisticActionManager::with_config(ActionConfig {
            confirm_sample_size: 2,
            ..ActionConfig::default()
        });
        for (i, ms) in [1000u64, 100, 200].into_iter().enumerate() {
            let id = format!("a{}", i);
            register(&mut manager, &id, now);
            manager.confirm_action(&id, now + Duration::from_millis(ms));
        }
        assert_eq!(manager.stats().average_confirm_ms, 150);
        assert_eq!(manager.stats().confirmed, 3);
    }
}
