//! Bounded transition history
//!
//! Diagnostics only: the state machine never reads its own history to make a
//! decision. Records are kept in a ring buffer; once full, the oldest record
//! is dropped for every new one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use super::table::{NegotiationState, Trigger};

/// Maximum number of transitions kept per connection
pub const HISTORY_SIZE_LIMIT: usize = 200;

/// One executed transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    /// Monotonic sequence number, starting at 0
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub from: NegotiationState,
    pub to: NegotiationState,
    pub trigger: Trigger,
}

impl std::fmt::Display for TransitionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} -> {} ({})",
            self.sequence, self.from, self.to, self.trigger
        )
    }
}

/// Ring buffer of executed transitions
#[derive(Debug, Clone)]
pub struct TransitionHistory {
    records: VecDeque<TransitionRecord>,
    max_transitions: usize,
    next_sequence: u64,
    /// Transitions recorded since creation, including evicted ones
    pub total_transitions: u64,
    /// `error` transitions recorded since creation
    pub total_errors: u64,
}

impl TransitionHistory {
    pub fn new(max_transitions: usize) -> Self {
        let max_transitions = max_transitions.clamp(1, HISTORY_SIZE_LIMIT);
        Self {
            records: VecDeque::with_capacity(max_transitions),
            max_transitions,
            next_sequence: 0,
            total_transitions: 0,
            total_errors: 0,
        }
    }

    /// Append a transition, evicting the oldest record when full.
    /// Returns the sequence number assigned to the record.
    pub fn record(&mut self, from: NegotiationState, to: NegotiationState, trigger: Trigger) -> u64 {
        if self.records.len() >= self.max_transitions {
            self.records.pop_front();
        }

        let record = TransitionRecord {
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            from,
            to,
            trigger,
        };
        self.next_sequence += 1;
        self.total_transitions += 1;
        if trigger == Trigger::Error {
            self.total_errors += 1;
        }

        self.records.push_back(record);
        self.next_sequence - 1
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_transitions
    }

    /// Records from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.records.back()
    }

    /// Up to `count` records, most recent first
    pub fn get_recent(&self, count: usize) -> Vec<TransitionRecord> {
        self.records.iter().rev().take(count).cloned().collect()
    }

    /// Records of `error` transitions still in the buffer
    pub fn get_errors(&self) -> Vec<TransitionRecord> {
        self.records
            .iter()
            .filter(|r| r.trigger == Trigger::Error)
            .cloned()
            .collect()
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_transitions == 0 {
            0.0
        } else {
            self.total_errors as f64 / self.total_transitions as f64
        }
    }

    /// Export the buffered records as JSON for postmortem dumps
    pub fn export_json(&self) -> serde_json::Result<String> {
        let records: Vec<_> = self.records.iter().collect();
        serde_json::to_string_pretty(&records)
    }
}

impl Default for TransitionHistory {
    fn default() -> Self {
        Self::new(HISTORY_SIZE_LIMIT)
    }
}
