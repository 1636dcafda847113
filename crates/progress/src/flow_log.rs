//! Bounded, newest-first log of human-readable progress messages.

use chrono::Utc;
use devflow_core::Time;
use serde::Serialize;
use std::collections::VecDeque;

/// One flow log line.
#[derive(Debug, Clone, Serialize)]
pub struct FlowEntry {
    /// When the message was added
    pub timestamp: Time,
    /// Message text
    pub message: String,
}

/// Keeps the most recent messages, newest first.
#[derive(Debug, Clone)]
pub struct FlowLog {
    entries: VecDeque<FlowEntry>,
    max_entries: usize,
}

impl FlowLog {
    /// Create a log holding at most `max_entries` messages.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
        }
    }

    /// Add a message, dropping the oldest when full.
    pub fn add_message(&mut self, message: impl Into<String>) {
        self.entries.push_front(FlowEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
        self.entries.truncate(self.max_entries);
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &FlowEntry> {
        self.entries.iter()
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FlowLog {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_newest_first_and_bounded() {
        let mut log = FlowLog::new(3);
        for i in 0..5 {
            log.add_message(format!("message {}", i));
        }
        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["message 4", "message 3", "message 2"]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_default_capacity() {
        let mut log = FlowLog::default();
        assert!(log.is_empty());
        for i in 0..20 {
            log.add_message(i.to_string());
        }
        assert_eq!(log.len(), 10);
    }
}
