//! In-memory task store

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{Database, StoreError, StoreResponse};
use crate::task::{NewTask, Task, TaskUpdate};

/// Volatile store backed by a `Vec`, preserving insertion order
///
/// Starts disconnected so callers exercise the `connect` path the same way
/// they would against SQLite.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<Task>>,
    connected: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing tasks (already connected)
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            connected: AtomicBool::new(true),
        }
    }

    /// Snapshot of every stored task
    pub async fn all(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }
}

#[async_trait]
impl Database for MemoryStore {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> StoreResponse<()> {
        debug!("MemoryStore::connect: called");
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_tasks_by_board(&self, board_id: &str) -> StoreResponse<Vec<Task>> {
        debug!(%board_id, "MemoryStore::get_tasks_by_board: called");
        if !self.is_connected().await {
            return Err(StoreError::NotConnected);
        }
        let tasks = self.tasks.lock().await;
        Ok(tasks.iter().filter(|t| t.board_id == board_id).cloned().collect())
    }

    async fn create_task(&self, new: NewTask) -> StoreResponse<Task> {
        debug!(title = %new.title, "MemoryStore::create_task: called");
        if !self.is_connected().await {
            return Err(StoreError::NotConnected);
        }
        let task = Task::from_new(uuid::Uuid::now_v7().to_string(), new, Local::now());
        self.tasks.lock().await.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &str, update: TaskUpdate) -> StoreResponse<Task> {
        debug!(%id, "MemoryStore::update_task: called");
        if !self.is_connected().await {
            return Err(StoreError::NotConnected);
        }
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.apply(&update);
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskPriority, TaskStatus};

    #[tokio::test]
    async fn test_requires_connect() {
        let store = MemoryStore::new();
        assert!(!store.is_connected().await);
        assert!(matches!(
            store.get_tasks_by_board("default").await,
            Err(StoreError::NotConnected)
        ));

        store.connect().await.unwrap();
        assert!(store.get_tasks_by_board("default").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_and_list_by_board() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();

        store.create_task(NewTask::new("a", "todo", "First")).await.unwrap();
        store.create_task(NewTask::new("b", "todo", "Other board")).await.unwrap();
        store.create_task(NewTask::new("a", "todo", "Second")).await.unwrap();

        let tasks = store.get_tasks_by_board("a").await.unwrap();
        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_update_task() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();
        let task = store.create_task(NewTask::new("a", "todo", "Fix")).await.unwrap();

        let updated = store
            .update_task(
                &task.id,
                TaskUpdate {
                    status: Some(TaskStatus::InProgress),
                    priority: Some(TaskPriority::High),
                    ..TaskUpdate::touch(Local::now())
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.priority, TaskPriority::High);
    }

    #[tokio::test]
    async fn test_update_missing_task() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();
        let result = store.update_task("missing", TaskUpdate::touch(Local::now())).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
