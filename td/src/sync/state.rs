//! Sync state and history
//!
//! [`SyncState`] only changes through the transition methods below, each of
//! which consumes the old value and returns the next one with `version` bumped.
//! The orchestrator holds the single live copy.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::types::SyncDirection;

/// History rows retained before the oldest is dropped
pub const HISTORY_CAPACITY: usize = 100;

/// Error messages retained in [`SyncState::errors`]
pub const MAX_STATE_ERRORS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// True only while a pass is executing
    pub syncing: bool,
    /// Passes requested but not yet finished, including the running one
    pub pending_operations: u32,
    /// Conflicts the last file→database pass left for a human
    pub unresolved_conflicts: u32,
    /// Most recent failure messages, oldest first
    pub errors: Vec<String>,
    pub last_sync_at: Option<DateTime<Local>>,
    /// Bumped on every transition
    pub version: u64,
}

impl SyncState {
    /// A pass was requested
    pub fn enqueued(mut self) -> Self {
        self.pending_operations += 1;
        self.bump()
    }

    /// The requested pass acquired the sync slot and is running
    pub fn started(mut self) -> Self {
        self.syncing = true;
        self.bump()
    }

    /// The running pass succeeded
    pub fn completed(mut self, at: DateTime<Local>, unresolved_conflicts: u32) -> Self {
        self.finish();
        self.last_sync_at = Some(at);
        self.unresolved_conflicts = unresolved_conflicts;
        self.errors.clear();
        self.bump()
    }

    /// The running pass gave up
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.finish();
        self.errors.push(error.into());
        if self.errors.len() > MAX_STATE_ERRORS {
            let excess = self.errors.len() - MAX_STATE_ERRORS;
            self.errors.drain(..excess);
        }
        self.bump()
    }

    fn finish(&mut self) {
        self.syncing = false;
        self.pending_operations = self.pending_operations.saturating_sub(1);
    }

    fn bump(mut self) -> Self {
        self.version += 1;
        self
    }
}

/// One row per finished sync pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistory {
    pub id: String,
    pub started_at: DateTime<Local>,
    pub completed_at: DateTime<Local>,
    pub direction: SyncDirection,
    pub tasks_changed: usize,
    pub tasks_created: usize,
    pub tasks_updated: usize,
    pub tasks_deleted: usize,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
    pub dry_run: bool,
}

/// Change counts of a single pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn changed(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

impl SyncHistory {
    pub fn new(direction: SyncDirection, started_at: DateTime<Local>, completed_at: DateTime<Local>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            started_at,
            completed_at,
            direction,
            tasks_changed: 0,
            tasks_created: 0,
            tasks_updated: 0,
            tasks_deleted: 0,
            success: false,
            error: None,
            duration_ms: 0,
            attempts: 0,
            dry_run: false,
        }
    }

    pub fn with_counts(mut self, counts: ChangeCounts) -> Self {
        self.tasks_created = counts.created;
        self.tasks_updated = counts.updated;
        self.tasks_deleted = counts.deleted;
        self.tasks_changed = counts.changed();
        self
    }

    pub fn succeeded(mut self) -> Self {
        self.success = true;
        self.error = None;
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Ring buffer of [`SyncHistory`], oldest dropped first
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<SyncHistory>,
    capacity: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl HistoryLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, entry: SyncHistory) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The last `limit` rows (all when `None`), oldest first
    pub fn recent(&self, limit: Option<usize>) -> Vec<SyncHistory> {
        let skip = limit.map_or(0, |n| self.entries.len().saturating_sub(n));
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
