//! TaskStore - the task database behind todosync
//!
//! Owns the canonical [`Task`] entity and the narrow [`Database`] interface the
//! sync engine consumes, with two backends:
//!
//! - [`MemoryStore`] - volatile, for tests and dry runs
//! - [`SqliteStore`] - persistent, an actor owning a `rusqlite` connection

mod memory;
mod messages;
mod sqlite;
mod store;
mod task;

pub use memory::MemoryStore;
pub use messages::StoreCommand;
pub use sqlite::SqliteStore;
pub use store::{Database, StoreError, StoreResponse};
pub use task::{NewTask, Task, TaskPriority, TaskStatus, TaskUpdate};
