//! Ordered per-run event journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::obs;

/// A single journal entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineEvent {
    /// 1-based position in the run.
    pub seq: u64,

    /// Event kind, e.g. `state_changed`, `deploy_finished`.
    pub kind: String,

    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

/// Append-only event list for one run.
#[derive(Debug, Default)]
pub struct RunJournal {
    events: Vec<PipelineEvent>,
}

impl RunJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number.
    pub fn record(&mut self, kind: &str, payload: serde_json::Value) -> u64 {
        let seq = self.events.len() as u64 + 1;
        self.events.push(PipelineEvent {
            seq,
            kind: kind.to_string(),
            payload,
            timestamp: Utc::now(),
        });
        obs::emit_event_appended(kind, seq);
        seq
    }

    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<PipelineEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sequence_numbers_are_contiguous() {
        let mut journal = RunJournal::new();
        assert_eq!(journal.record("a", json!({})), 1);
        assert_eq!(journal.record("b", json!({ "x": 1 })), 2);

        let kinds: Vec<&str> = journal.events().iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["a", "b"]);
        assert_eq!(journal.into_events()[1].payload["x"], 1);
    }
}
