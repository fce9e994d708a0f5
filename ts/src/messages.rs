//! SQLite store actor messages
//!
//! Commands and replies for the actor that owns the connection.

use tokio::sync::oneshot;

use crate::store::StoreResponse;
use crate::task::{NewTask, Task, TaskUpdate};

/// Commands sent to the SQLite actor
#[derive(Debug)]
pub enum StoreCommand {
    GetTasksByBoard {
        board_id: String,
        reply: oneshot::Sender<StoreResponse<Vec<Task>>>,
    },
    CreateTask {
        new: NewTask,
        reply: oneshot::Sender<StoreResponse<Task>>,
    },
    UpdateTask {
        id: String,
        update: TaskUpdate,
        reply: oneshot::Sender<StoreResponse<Task>>,
    },
    Shutdown,
}
