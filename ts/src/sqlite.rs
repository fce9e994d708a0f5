//! SqliteStore - actor that owns a SQLite connection
//!
//! `rusqlite::Connection` is not `Sync`, so a single blocking task owns it and
//! processes commands sent over a channel.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::messages::StoreCommand;
use crate::store::{Database, StoreError, StoreResponse};
use crate::task::{NewTask, Task, TaskUpdate};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    board_id     TEXT NOT NULL,
    column_id    TEXT NOT NULL,
    title        TEXT NOT NULL,
    status       TEXT NOT NULL,
    priority     TEXT NOT NULL,
    labels       TEXT NOT NULL DEFAULT '[]',
    due_date     TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    completed_at TEXT,
    deleted_at   TEXT
);
CREATE INDEX IF NOT EXISTS idx_tasks_board ON tasks(board_id);
"#;

const COLUMNS: &str = "id, board_id, column_id, title, status, priority, labels, due_date, \
                       created_at, updated_at, completed_at, deleted_at";

/// Handle to the SQLite-backed task store
///
/// The connection is opened lazily by [`Database::connect`].
pub struct SqliteStore {
    path: PathBuf,
    tx: Mutex<Option<mpsc::Sender<StoreCommand>>>,
}

impl SqliteStore {
    /// Create a handle for the database at `path` without opening it
    pub fn new(path: impl AsRef<Path>) -> Self {
        debug!(path = %path.as_ref().display(), "SqliteStore::new: called");
        Self {
            path: path.as_ref().to_path_buf(),
            tx: Mutex::new(None),
        }
    }

    /// Open the database immediately
    pub async fn open(path: impl AsRef<Path>) -> StoreResponse<Self> {
        let store = Self::new(path);
        store.connect().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the actor; later calls fail with `NotConnected` until reconnected
    pub async fn shutdown(&self) {
        debug!("SqliteStore::shutdown: called");
        if let Some(tx) = self.tx.lock().await.take() {
            let _ = tx.send(StoreCommand::Shutdown).await;
        }
    }

    async fn sender(&self) -> StoreResponse<mpsc::Sender<StoreCommand>> {
        self.tx
            .lock()
            .await
            .as_ref()
            .filter(|tx| !tx.is_closed())
            .cloned()
            .ok_or(StoreError::NotConnected)
    }
}

#[async_trait]
impl Database for SqliteStore {
    async fn is_connected(&self) -> bool {
        self.sender().await.is_ok()
    }

    async fn connect(&self) -> StoreResponse<()> {
        debug!(path = %self.path.display(), "SqliteStore::connect: called");
        let mut guard = self.tx.lock().await;
        if guard.as_ref().is_some_and(|tx| !tx.is_closed()) {
            debug!("SqliteStore::connect: already connected");
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, ?parent, "SqliteStore::connect: could not create parent directory");
            }
        }

        let conn = Connection::open(&self.path)?;
        conn.execute_batch(SCHEMA)?;

        let (tx, rx) = mpsc::channel(64);
        tokio::task::spawn_blocking(move || actor_loop(conn, rx));
        *guard = Some(tx);

        info!(path = %self.path.display(), "SqliteStore connected");
        Ok(())
    }

    async fn get_tasks_by_board(&self, board_id: &str) -> StoreResponse<Vec<Task>> {
        debug!(%board_id, "SqliteStore::get_tasks_by_board: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()
            .await?
            .send(StoreCommand::GetTasksByBoard {
                board_id: board_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    async fn create_task(&self, new: NewTask) -> StoreResponse<Task> {
        debug!(title = %new.title, "SqliteStore::create_task: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()
            .await?
            .send(StoreCommand::CreateTask { new, reply: reply_tx })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    async fn update_task(&self, id: &str, update: TaskUpdate) -> StoreResponse<Task> {
        debug!(%id, "SqliteStore::update_task: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender()
            .await?
            .send(StoreCommand::UpdateTask {
                id: id.to_string(),
                update,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }
}

fn actor_loop(conn: Connection, mut rx: mpsc::Receiver<StoreCommand>) {
    debug!("SqliteStore actor started");

    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            StoreCommand::GetTasksByBoard { board_id, reply } => {
                debug!(%board_id, "actor_loop: GetTasksByBoard command");
                let _ = reply.send(select_by_board(&conn, &board_id));
            }
            StoreCommand::CreateTask { new, reply } => {
                debug!(title = %new.title, "actor_loop: CreateTask command");
                let task = Task::from_new(uuid::Uuid::now_v7().to_string(), new, Local::now());
                let _ = reply.send(insert(&conn, &task).map(|_| task));
            }
            StoreCommand::UpdateTask { id, update, reply } => {
                debug!(%id, "actor_loop: UpdateTask command");
                let _ = reply.send(apply_update(&conn, &id, &update));
            }
            StoreCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                break;
            }
        }
    }

    debug!("SqliteStore actor stopped");
}

fn select_by_board(conn: &Connection, board_id: &str) -> StoreResponse<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM tasks WHERE board_id = ?1 ORDER BY rowid"
    ))?;
    let rows = stmt.query_map(params![board_id], read_row)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?.into_task()?);
    }
    Ok(tasks)
}

fn select_by_id(conn: &Connection, id: &str) -> StoreResponse<Option<Task>> {
    let row = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            read_row,
        )
        .optional()?;
    row.map(TaskRow::into_task).transpose()
}

fn insert(conn: &Connection, task: &Task) -> StoreResponse<()> {
    conn.execute(
        &format!("INSERT INTO tasks ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
        params![
            task.id,
            task.board_id,
            task.column_id,
            task.title,
            task.status.to_string(),
            task.priority.to_string(),
            serde_json::to_string(&task.labels)?,
            task.due_date.map(|d| d.to_string()),
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
            task.completed_at.map(|d| d.to_rfc3339()),
            task.deleted_at.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(())
}

fn apply_update(conn: &Connection, id: &str, update: &TaskUpdate) -> StoreResponse<Task> {
    let mut task = select_by_id(conn, id)?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    task.apply(update);
    conn.execute(
        "UPDATE tasks SET title = ?2, status = ?3, priority = ?4, labels = ?5, due_date = ?6, \
         updated_at = ?7, completed_at = ?8, deleted_at = ?9 WHERE id = ?1",
        params![
            task.id,
            task.title,
            task.status.to_string(),
            task.priority.to_string(),
            serde_json::to_string(&task.labels)?,
            task.due_date.map(|d| d.to_string()),
            task.updated_at.to_rfc3339(),
            task.completed_at.map(|d| d.to_rfc3339()),
            task.deleted_at.map(|d| d.to_rfc3339()),
        ],
    )?;
    Ok(task)
}

/// Raw column values as read from a row
struct TaskRow {
    id: String,
    board_id: String,
    column_id: String,
    title: String,
    status: String,
    priority: String,
    labels: String,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
    deleted_at: Option<String>,
}

impl TaskRow {
    fn into_task(self) -> StoreResponse<Task> {
        Ok(Task {
            id: self.id,
            board_id: self.board_id,
            column_id: self.column_id,
            title: self.title,
            status: self.status.parse().map_err(StoreError::InvalidValue)?,
            priority: self.priority.parse().map_err(StoreError::InvalidValue)?,
            labels: serde_json::from_str(&self.labels)?,
            due_date: self.due_date.as_deref().map(parse_date).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            deleted_at: self.deleted_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        board_id: row.get(1)?,
        column_id: row.get(2)?,
        title: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        labels: row.get(6)?,
        due_date: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
        deleted_at: row.get(11)?,
    })
}

fn parse_timestamp(s: &str) -> StoreResponse<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|e| StoreError::InvalidValue(format!("timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> StoreResponse<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| StoreError::InvalidValue(format!("date '{}': {}", s, e)))
}
