//! Event types emitted by the sync engine

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::{SyncDirection, SyncHistory, SyncState};
use crate::watcher::FileEvent;

/// Everything a subscriber can observe, one variant per event name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A sync pass is about to run
    #[serde(rename = "sync:start")]
    SyncStart {
        direction: SyncDirection,
        timestamp: DateTime<Local>,
    },
    /// A sync pass finished successfully (including dry runs)
    #[serde(rename = "sync:complete")]
    SyncComplete { history: SyncHistory },
    /// A sync pass gave up
    #[serde(rename = "sync:error")]
    SyncError { error: String, context: ErrorContext },
    /// The watcher reported the TODO file changed
    #[serde(rename = "file:changed")]
    FileChanged { event: FileEvent },
    /// Tasks were written to the database by a file→database pass
    #[serde(rename = "db:changed")]
    DbChanged { task_ids: Vec<String> },
    #[serde(rename = "state:updated")]
    StateUpdated { state: SyncState },
}

/// Where a `sync:error` came from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub direction: SyncDirection,
    pub attempts: u32,
    pub retryable: bool,
    /// Id of the failed history row
    pub history_id: String,
}

impl SyncEvent {
    /// Wire name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::SyncStart { .. } => "sync:start",
            SyncEvent::SyncComplete { .. } => "sync:complete",
            SyncEvent::SyncError { .. } => "sync:error",
            SyncEvent::FileChanged { .. } => "file:changed",
            SyncEvent::DbChanged { .. } => "db:changed",
            SyncEvent::StateUpdated { .. } => "state:updated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncEvent::SyncComplete { .. } | SyncEvent::SyncError { .. })
    }
}

/// Wrapper for JSONL logging with timestamp
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: SyncEvent,
}

impl EventLogEntry {
    pub fn new(event: SyncEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = SyncEvent::DbChanged {
            task_ids: vec!["a".to_string()],
        };
        assert_eq!(event.event_type(), "db:changed");
        assert!(!event.is_terminal());

        let event = SyncEvent::StateUpdated {
            state: SyncState::default(),
        };
        assert_eq!(event.event_type(), "state:updated");
    }

    #[test]
    fn test_serialized_tag_matches_event_type() {
        let event = SyncEvent::SyncStart {
            direction: SyncDirection::FileToApp,
            timestamp: Local::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"sync:start\""));
        assert!(json.contains("\"direction\":\"file_to_app\""));

        let back: SyncEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_log_entry_has_timestamp() {
        let entry = EventLogEntry::new(SyncEvent::SyncError {
            error: "boom".to_string(),
            context: ErrorContext {
                direction: SyncDirection::AppToFile,
                attempts: 4,
                retryable: true,
                history_id: "h1".to_string(),
            },
        });
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"ts\""));
        assert!(json.contains("sync:error"));
    }
}
