//! A small in-memory event log mutating operations append to, for the
//! embedding node's own indexer to drain. Modelled on
//! `bleep_core::observability::ObservableEvent`: immutable once recorded,
//! cheap to construct, never gates consensus state itself.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq: u64,
    pub kind: String,
    pub detail: String,
    pub block_height: u64,
}

/// Bounded ring buffer of recent events. Eviction drops the oldest entry
/// once the cap is reached, matching the anomaly-alert retention rule
/// elsewhere in this workspace (capped at 1000 most recent).
pub struct EventLog {
    cap: usize,
    next_seq: Mutex<u64>,
    events: Mutex<VecDeque<Event>>,
}

impl EventLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_seq: Mutex::new(0),
            events: Mutex::new(VecDeque::with_capacity(cap)),
        }
    }

    pub fn record(&self, kind: impl Into<String>, detail: impl Into<String>, block_height: u64) -> u64 {
        let mut seq_guard = self.next_seq.lock();
        let seq = *seq_guard;
        *seq_guard += 1;
        drop(seq_guard);

        let event = Event {
            seq,
            kind: kind.into(),
            detail: detail.into(),
            block_height,
        };
        let mut events = self.events.lock();
        if events.len() >= self.cap {
            events.pop_front();
        }
        events.push_back(event);
        seq
    }

    pub fn recent(&self, n: usize) -> Vec<Event> {
        let events = self.events.lock();
        events.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let log = EventLog::new(2);
        log.record("a", "first", 1);
        log.record("b", "second", 2);
        log.record("c", "third", 3);
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, "c");
        assert_eq!(recent[1].kind, "b");
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let log = EventLog::new(10);
        let s1 = log.record("a", "", 1);
        let s2 = log.record("b", "", 2);
        assert!(s2 > s1);
    }
}
