//! Deadline queue for the engine's timers.
//!
//! Each key has at most one deadline; scheduling a key again replaces it.

use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;

use airturn_types::{Port, WriteType};

/// What a timer is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TimerKey {
    /// No advertisement for the lost window.
    Lost(String),
    /// Connect, interrogation or disconnect took too long.
    Link(String),
    /// A write was not acknowledged.
    Write(String, WriteType),
    /// Next repeat of a held port.
    Repeat(String, Port),
}

impl TimerKey {
    pub fn peripheral_id(&self) -> &str {
        match self {
            TimerKey::Lost(id)
            | TimerKey::Link(id)
            | TimerKey::Write(id, _)
            | TimerKey::Repeat(id, _) => id,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    by_deadline: BTreeMap<(Instant, u64), TimerKey>,
    by_key: HashMap<TimerKey, (Instant, u64)>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn schedule(&mut self, key: TimerKey, at: Instant) {
        self.cancel(&key);
        let slot = (at, self.next_seq);
        self.next_seq += 1;
        self.by_deadline.insert(slot, key.clone());
        self.by_key.insert(key, slot);
    }

    /// Returns true if the timer was pending.
    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        match self.by_key.remove(key) {
            Some(slot) => {
                self.by_deadline.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Cancel every timer for one peripheral.
    pub fn cancel_peripheral(&mut self, id: &str) {
        self.cancel_where(|key| key.peripheral_id() == id);
    }

    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&TimerKey) -> bool) {
        let doomed: Vec<TimerKey> = self.by_key.keys().filter(|k| predicate(k)).cloned().collect();
        for key in doomed {
            self.cancel(&key);
        }
    }

    pub fn is_scheduled(&self, key: &TimerKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.by_deadline.keys().next().map(|(at, _)| *at)
    }

    /// Remove and return the earliest timer due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerKey> {
        let (&slot, _) = self.by_deadline.iter().next()?;
        if slot.0 > now {
            return None;
        }
        let key = self.by_deadline.remove(&slot)?;
        self.by_key.remove(&key);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }
}
