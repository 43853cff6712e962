//! Keyed, cancellable deadlines.
//!
//! The engine never hands closures to a timer. Instead each component schedules a deadline
//! under a key (an action id, a queue epoch) and the owner asks which keys are due when it is
//! polled. Cancelling is removing the key; clearing drops every outstanding deadline at once,
//! which is what teardown relies on.

use std::collections::{BTreeMap, BTreeSet};
use web_time::Instant;

/// A set of keyed deadlines, ordered by due time then insertion.
///
/// Scheduling a key that already has a deadline replaces the old one.
#[derive(Debug, Clone)]
pub struct Deadlines<K: Ord + Clone> {
    by_due: BTreeSet<(Instant, u64, K)>,
    by_key: BTreeMap<K, (Instant, u64)>,
    next_seq: u64,
}

impl<K: Ord + Clone> Default for Deadlines<K> {
    fn default() -> Self {
        Self {
            by_due: BTreeSet::new(),
            by_key: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Ord + Clone> Deadlines<K> {
    /// Creates an empty deadline set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `key` to become due at `at`.
    pub fn schedule(&mut self, key: K, at: Instant) {
        self.cancel(&key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_due.insert((at, seq, key.clone()));
        self.by_key.insert(key, (at, seq));
    }

    /// Cancels the deadline for `key`. Returns whether one existed.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.by_key.remove(key) {
            Some((at, seq)) => {
                self.by_due.remove(&(at, seq, key.clone()));
                true
            },
            None => false,
        }
    }

    /// Removes and returns every key due at or before `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<K> {
        let mut due = Vec::new();
        while let Some(first) = self.by_due.first() {
            if first.0 > now {
                break;
            }
            if let Some((_, _, key)) = self.by_due.pop_first() {
                self.by_key.remove(&key);
                due.push(key);
            }
        }
        due
    }

    /// Returns the earliest outstanding deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_due.first().map(|(at, _, _)| *at)
    }

    /// Returns whether `key` has an outstanding deadline.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Number of outstanding deadlines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Returns true if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Drops every outstanding deadline.
    pub fn clear(&mut self) {
        self.by_due.clear();
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use web_time::Duration;

    #[test]
    fn pops_only_due_keys_in_order() {
        let start = Instant::now();
        let mut deadlines = Deadlines::new();
        deadlines.schedule("late", start + Duration::from_millis(30));
        deadlines.schedule("early", start + Duration::from_millis(10));
        deadlines.schedule("mid", start + Duration::from_millis(20));

        assert!(deadlines.pop_due(start).is_empty());
        assert_eq!(
            deadlines.pop_due(start + Duration::from_millis(20)),
            vec!["early", "mid"]
        );
        assert_eq!(deadlines.len(), 1);
        assert_eq!(
            deadlines.next_deadline(),
            Some(start + Duration::from_millis(30))
        );
    }

    #[test]
    fn equal_deadlines_fire_in_schedule_order() {
        let at = Instant::now();
        let mut deadlines = Deadlines::new();
        deadlines.schedule(3, at);
        deadlines.schedule(1, at);
        deadlines.schedule(2, at);
        assert_eq!(deadlines.pop_due(at), vec![3, 1, 2]);
    }

    #[test]
    fn cancel_prevents_firing() {
        let at = Instant::now();
        let mut deadlines = Deadlines::new();
        deadlines.schedule("a", at);
        assert!(deadlines.cancel(&"a"));
        assert!(!deadlines.cancel(&"a"));
        assert!(deadlines.pop_due(at).is_empty());
    }

    #[test]
    fn reschedule_replaces_previous_deadline() {
        let start = Instant::now();
        let mut deadlines = Deadlines::new();
        deadlines.schedule("a", start);
        deadlines.schedule("a", start + Duration::from_secs(1));
        assert!(deadlines.pop_due(start).is_empty());
        assert_eq!(deadlines.len(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let at = Instant::now();
        let mut deadlines = Deadlines::new();
        deadlines.schedule(1, at);
        deadlines.schedule(2, at);
        deadlines.clear();
        assert!(deadlines.is_empty());
        assert!(deadlines.pop_due(at).is_empty());
        assert_eq!(deadlines.next_deadline(), None);
    }
}
