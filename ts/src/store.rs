//! The `Database` seam consumed by the sync engine

use async_trait::async_trait;
use thiserror::Error;

use crate::task::{NewTask, Task, TaskUpdate};

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Store is not connected")]
    NotConnected,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from store operations
pub type StoreResponse<T> = Result<T, StoreError>;

/// Narrow task database interface
///
/// Implementations must be safe to share across tasks; the orchestrator holds
/// an `Arc<dyn Database>`.
#[async_trait]
pub trait Database: Send + Sync {
    /// Whether the store is ready to serve requests
    async fn is_connected(&self) -> bool;

    /// Open or re-open the underlying connection
    async fn connect(&self) -> StoreResponse<()>;

    /// All tasks on a board, including soft-deleted ones, in creation order
    async fn get_tasks_by_board(&self, board_id: &str) -> StoreResponse<Vec<Task>>;

    /// Insert a task and return the stored record
    async fn create_task(&self, new: NewTask) -> StoreResponse<Task>;

    /// Apply a partial update and return the stored record
    async fn update_task(&self, id: &str, update: TaskUpdate) -> StoreResponse<Task>;
}
