//! `notify`-backed watcher with debounce and throttle
//!
//! The parent directory is watched rather than the file itself so atomic
//! replace-by-rename (which our own writer uses) keeps being observed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{FileEvent, FileEventKind, FileWatcher, WatchError};

/// Raw events buffered between the notify thread and the debounce loop
const RAW_CHANNEL_CAPACITY: usize = 100;

struct ActiveWatch {
    // Dropping the watcher closes the raw channel, which ends the loop
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

pub struct NotifyWatcher {
    debounce: Duration,
    throttle: Duration,
    active: Mutex<Option<ActiveWatch>>,
}

impl NotifyWatcher {
    pub fn new(debounce: Duration, throttle: Duration) -> Self {
        debug!(?debounce, ?throttle, "NotifyWatcher::new: called");
        Self {
            debounce,
            throttle,
            active: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FileWatcher for NotifyWatcher {
    async fn start(&self, path: &Path, events: mpsc::Sender<FileEvent>) -> Result<(), WatchError> {
        debug!(?path, "NotifyWatcher::start: called");
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.is_some() {
            return Err(WatchError::AlreadyWatching(path.to_path_buf()));
        }

        let (dir, file_name) = match (path.parent(), path.file_name()) {
            (Some(dir), Some(name)) => (dir.to_path_buf(), name.to_os_string()),
            _ => return Err(WatchError::NoParent(path.to_path_buf())),
        };

        let (raw_tx, raw_rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = raw_tx.blocking_send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let debouncer = Debouncer {
            target: path.to_path_buf(),
            file_name,
            debounce: self.debounce,
            throttle: self.throttle,
        };
        let task = tokio::spawn(debouncer.run(raw_rx, events));

        info!(path = %path.display(), "Watching TODO file");
        *active = Some(ActiveWatch { watcher, task });
        Ok(())
    }

    async fn stop(&self) {
        debug!("NotifyWatcher::stop: called");
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(ActiveWatch { watcher, task }) = active {
            drop(watcher);
            if let Err(e) = task.await {
                warn!(error = %e, "NotifyWatcher: debounce task ended abnormally");
            }
            info!("Stopped watching TODO file");
        }
    }

    fn is_watching(&self) -> bool {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

struct Debouncer {
    target: PathBuf,
    file_name: OsString,
    debounce: Duration,
    throttle: Duration,
}

impl Debouncer {
    async fn run(self, mut raw: mpsc::Receiver<Result<Event, notify::Error>>, out: mpsc::Sender<FileEvent>) {
        debug!(target = ?self.target, "Debouncer::run: started");
        let mut pending: Option<FileEventKind> = None;
        let mut last_event = Instant::now();
        let mut last_emit: Option<Instant> = None;

        loop {
            let deadline = self.deadline(last_event, last_emit);

            tokio::select! {
                received = raw.recv() => {
                    match received {
                        Some(Ok(event)) => {
                            if !self.concerns_target(&event) {
                                continue;
                            }
                            if let Some(kind) = classify(&event.kind) {
                                // A creation anywhere in the burst wins
                                pending = Some(match (pending, kind) {
                                    (Some(FileEventKind::Add), _) => FileEventKind::Add,
                                    (_, kind) => kind,
                                });
                                last_event = Instant::now();
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "Debouncer: watcher error");
                            if out.send(FileEvent::error(&self.target, e.to_string())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline), if pending.is_some() => {
                    let Some(kind) = pending.take() else { continue };
                    let size = tokio::fs::metadata(&self.target).await.ok().map(|m| m.len());
                    let event = FileEvent {
                        kind,
                        path: self.target.clone(),
                        size,
                        error: None,
                    };
                    debug!(?event, "Debouncer: delivering event");
                    if out.send(event).await.is_err() {
                        break;
                    }
                    last_emit = Some(Instant::now());
                }
            }
        }
        debug!("Debouncer::run: stopped");
    }

    /// Quiet period after the last raw event, pushed back to honor the throttle
    fn deadline(&self, last_event: Instant, last_emit: Option<Instant>) -> Instant {
        let quiet = last_event + self.debounce;
        match last_emit {
            Some(at) => quiet.max(at + self.throttle),
            None => quiet,
        }
    }

    fn concerns_target(&self, event: &Event) -> bool {
        event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|name| name == self.file_name))
    }
}

fn classify(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Add),
        EventKind::Modify(_) => Some(FileEventKind::Change),
        _ => None,
    }
}
