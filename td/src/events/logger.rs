//! Event Logger - persists events to a JSONL file
//!
//! Subscribes to the [`EventBus`] and appends one [`EventLogEntry`] per line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::Context;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EventLogEntry, SyncEvent};

pub struct EventLogger {
    path: PathBuf,
    /// Opened on the first write
    writer: Option<BufWriter<File>>,
}

impl EventLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "EventLogger::new: creating logger");
        Self { path, writer: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_event(&mut self, event: &SyncEvent) -> eyre::Result<()> {
        debug!(event_type = event.event_type(), "EventLogger::write_event");
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => {
                if let Some(parent) = self.path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .context(format!("Failed to open event log {}", self.path.display()))?;
                self.writer.insert(BufWriter::new(file))
            }
        };

        let json = serde_json::to_string(&EventLogEntry::new(event.clone()))?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    /// Consume events from the bus until it closes
    pub async fn run(mut self, event_bus: Arc<EventBus>) {
        debug!("EventLogger::run: starting event logger");
        let mut rx = event_bus.subscribe();

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(event_type = event.event_type(), error = %e, "EventLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "EventLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

/// Read back a JSONL event log; unparsable lines are skipped
pub fn read_events(path: impl AsRef<Path>) -> eyre::Result<Vec<EventLogEntry>> {
    let path = path.as_ref();
    debug!(?path, "read_events: reading log file");

    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_events: failed to parse line"),
        }
    }

    debug!(count = entries.len(), "read_events: loaded entries");
    Ok(entries)
}

/// Spawn an [`EventLogger`] writing to `path` as a background task
pub fn spawn_event_logger(event_bus: Arc<EventBus>, path: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(path);
    tokio::spawn(async move {
        logger.run(event_bus).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncState;
    use tempfile::tempdir;

    #[test]
    fn test_writer_opens_lazily() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("logs").join("events.jsonl");
        let mut logger = EventLogger::new(&path);
        assert!(!path.exists());

        logger
            .write_event(&SyncEvent::DbChanged {
                task_ids: vec!["t1".to_string()],
            })
            .unwrap();
        assert!(path.exists());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("db:changed"));
        assert!(content.contains("t1"));
    }

    #[test]
    fn test_read_events_skips_garbage() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("events.jsonl");
        let mut logger = EventLogger::new(&path);
        logger
            .write_event(&SyncEvent::StateUpdated {
                state: SyncState::default(),
            })
            .unwrap();
        drop(logger);

        let mut content = fs::read_to_string(&path).unwrap();
        content.push_str("not json\n\n");
        fs::write(&path, content).unwrap();

        let entries = read_events(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event.event_type(), "state:updated");
        assert!(read_events(temp.path().join("missing.jsonl")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_until_bus_closes() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("events.jsonl");
        let bus = Arc::new(EventBus::new(16));

        let handle = spawn_event_logger(bus.clone(), &path);
        while bus.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }
        bus.emit(SyncEvent::DbChanged { task_ids: Vec::new() });
        bus.close();
        handle.await.unwrap();

        assert_eq!(read_events(&path).unwrap().len(), 1);
    }
}
