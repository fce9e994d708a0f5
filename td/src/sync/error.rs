//! Sync engine error types

use std::path::PathBuf;

use taskstore::StoreError;
use thiserror::Error;

use crate::markdown::GenerateError;
use crate::path::PathError;
use crate::watcher::WatchError;

/// Errors that can occur during a sync pass or orchestrator call
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sync orchestrator is not running")]
    NotRunning,

    #[error("Security violation: {0}")]
    Security(PathError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Content rejected: {}", .0.join("; "))]
    InvalidContent(Vec<String>),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Sync failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SyncError> },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Io { .. } => true,
            SyncError::Store(e) => !matches!(
                e,
                StoreError::NotFound(_) | StoreError::InvalidValue(_) | StoreError::Serialization(_)
            ),
            SyncError::Configuration(_) => false,
            SyncError::NotRunning => false,
            SyncError::Security(_) => false,
            SyncError::InvalidContent(_) => false,
            SyncError::Watch(_) => false,
            SyncError::RetriesExhausted { .. } => false,
        }
    }

    /// Innermost error, looking through `RetriesExhausted`
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

impl From<PathError> for SyncError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::Io(source) => SyncError::Io {
                path: PathBuf::new(),
                source,
            },
            PathError::FileTooLarge { path, size, max } => {
                SyncError::InvalidContent(vec![format!("{} is {} bytes, limit is {} bytes", path.display(), size, max)])
            }
            other => SyncError::Security(other),
        }
    }
}

impl From<GenerateError> for SyncError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::Path(e) => e.into(),
            GenerateError::Write { path, source } => SyncError::Io { path, source },
        }
    }
}
