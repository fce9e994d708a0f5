//! File watching collaborator
//!
//! A [`FileWatcher`] delivers already debounced and throttled [`FileEvent`]s
//! for a single file over an `mpsc` channel.

mod notify_watcher;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use notify_watcher::NotifyWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEventKind {
    /// The file was modified or replaced
    Change,
    /// The file appeared
    Add,
    /// The watcher itself failed
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    /// File size when the event was delivered, if it could be read
    pub size: Option<u64>,
    pub error: Option<String>,
}

impl FileEvent {
    pub fn change(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileEventKind::Change,
            path: path.into(),
            size: None,
            error: None,
        }
    }

    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FileEventKind::Add,
            ..Self::change(path)
        }
    }

    pub fn error(path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            kind: FileEventKind::Error,
            error: Some(error.into()),
            ..Self::change(path)
        }
    }

    /// Change and add events should trigger a sync; errors should not
    pub fn triggers_sync(&self) -> bool {
        matches!(self.kind, FileEventKind::Change | FileEventKind::Add)
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Already watching {0}")]
    AlreadyWatching(PathBuf),

    #[error("Cannot watch {0}: no parent directory")]
    NoParent(PathBuf),
}

#[async_trait]
pub trait FileWatcher: Send + Sync {
    /// Begin delivering events for `path` to `events`
    async fn start(&self, path: &Path, events: mpsc::Sender<FileEvent>) -> Result<(), WatchError>;

    /// Stop delivering events; a no-op when not started
    async fn stop(&self);

    fn is_watching(&self) -> bool;
}
