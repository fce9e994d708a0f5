//! Bidirectional sync between the TODO file and the task database
//!
//! - [`SyncOrchestrator`] - lifecycle, retries, events, state and history
//! - [`reconcile`] - pure file→database planning
//! - [`resolver`] - conflict resolution strategies for matched tasks

mod error;
mod orchestrator;
pub mod reconcile;
pub mod resolver;
mod state;
mod types;

pub use error::SyncError;
pub use orchestrator::{DRAIN_POLL_INTERVAL, DRAIN_TIMEOUT, SyncOrchestrator};
pub use reconcile::{ReconcilePlan, Reconciler};
pub use resolver::{
    ConflictResolver, DbWinsResolver, FieldConflict, FileWinsResolver, Resolution, TaskFields, ThreeWayMergeResolver,
    resolver_for,
};
pub use state::{ChangeCounts, HISTORY_CAPACITY, HistoryLog, SyncHistory, SyncState};
pub use types::{ConflictPolicy, SyncDirection, SyncStrategy};
