//! SyncOrchestrator - drives sync passes between the TODO file and the task database
//!
//! Lifecycle: `idle` → [`start`](SyncOrchestrator::start) → running, where each
//! pass flips `syncing` for its duration → [`stop`](SyncOrchestrator::stop).
//!
//! Passes are serialized: a pass waits for the previous one to finish before it
//! reads the file or the database. Each pass retries transient failures with
//! exponential backoff and reports its outcome as exactly one `sync:complete`
//! or `sync:error` event plus one history row.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use chrono::Local;
use taskstore::{Database, Task, TaskUpdate};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::SyncError;
use super::reconcile::Reconciler;
use super::resolver::{ConflictResolver, TaskFields, resolver_for};
use super::state::{ChangeCounts, HistoryLog, SyncHistory, SyncState};
use super::types::SyncDirection;
use crate::config::{RetryPolicy, SyncConfig};
use crate::events::{ErrorContext, EventBus, SyncEvent};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::markdown::{HtmlSanitizer, MarkdownGenerator, MarkdownParser};
use crate::path::PathValidator;
use crate::watcher::{FileEvent, FileWatcher, NotifyWatcher};

/// How long `stop()` waits for in-flight passes
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while draining
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

const FILE_EVENT_CHANNEL_CAPACITY: usize = 32;

/// Result of one successful attempt
#[derive(Debug, Default)]
struct PassOutcome {
    counts: ChangeCounts,
    unresolved_conflicts: u32,
    task_ids: Vec<String>,
    dry_run: bool,
}

/// Removes its operation from the active set when dropped
struct OperationGuard<'a> {
    operations: &'a Mutex<HashMap<String, SyncDirection>>,
    id: String,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

pub struct SyncOrchestrator {
    config: SyncConfig,
    retry: RetryPolicy,
    parser: MarkdownParser,
    generator: MarkdownGenerator,
    validator: PathValidator,
    fs: Arc<dyn FileSystem>,
    db: Arc<dyn Database>,
    watcher: Arc<dyn FileWatcher>,
    resolver: Arc<dyn ConflictResolver>,
    bus: Arc<EventBus>,
    running: AtomicBool,
    state: Mutex<SyncState>,
    history: Mutex<HistoryLog>,
    /// Fields both sides agreed on after the last pass, keyed by task id
    base: Mutex<HashMap<String, TaskFields>>,
    /// Held for the whole of a pass
    sync_lock: tokio::sync::Mutex<()>,
    active_operations: Mutex<HashMap<String, SyncDirection>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncOrchestrator {
    /// Orchestrator over the local filesystem with a `notify` watcher
    ///
    /// Fails only when the sandbox base directory cannot be made absolute.
    pub fn new(config: SyncConfig, db: Arc<dyn Database>) -> Result<Self, SyncError> {
        debug!(?config, "SyncOrchestrator::new: called");
        let validator = PathValidator::new(&config.base_dir)?;
        let watcher = NotifyWatcher::new(config.debounce(), config.throttle());

        Ok(Self {
            retry: RetryPolicy::default(),
            parser: MarkdownParser::new(config.limits()),
            generator: MarkdownGenerator::new(Arc::new(HtmlSanitizer), config.title.clone()),
            validator,
            fs: Arc::new(LocalFileSystem),
            db,
            watcher: Arc::new(watcher),
            resolver: resolver_for(config.strategy),
            bus: Arc::new(EventBus::with_default_capacity()),
            running: AtomicBool::new(false),
            state: Mutex::new(SyncState::default()),
            history: Mutex::new(HistoryLog::default()),
            base: Mutex::new(HashMap::new()),
            sync_lock: tokio::sync::Mutex::new(()),
            active_operations: Mutex::new(HashMap::new()),
            watch_task: Mutex::new(None),
            config,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn FileWatcher>) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.bus.subscribe()
    }

    /// Connect the database, start watching, and run an initial file→database
    /// pass when the direction allows it and the file exists
    ///
    /// A failing initial pass is reported through events and logs; the
    /// orchestrator still starts.
    pub async fn start(self: &Arc<Self>) -> Result<(), SyncError> {
        debug!("SyncOrchestrator::start: called");
        if self.is_active() {
            debug!("SyncOrchestrator::start: already running");
            return Ok(());
        }
        self.validate_config()?;

        if !self.db.is_connected().await {
            self.db.connect().await?;
        }

        let path = self.validator.validate_async(&self.config.todo_path).await?;
        let (tx, rx) = mpsc::channel(FILE_EVENT_CHANNEL_CAPACITY);
        self.watcher.start(&path, tx).await?;

        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(watch_loop(Arc::downgrade(self), rx));
        *self.watch_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        info!(path = %path.display(), direction = %self.config.direction, "Sync orchestrator started");

        if self.config.direction.allows_file_to_app() && self.fs.exists(&path).await {
            if let Err(e) = self.sync_file_to_db().await {
                warn!(error = %e, "Initial sync failed");
            }
        }
        Ok(())
    }

    /// Wait (bounded by [`DRAIN_TIMEOUT`]) for in-flight passes, then stop
    /// watching
    pub async fn stop(&self) {
        debug!("SyncOrchestrator::stop: called");
        if !self.is_active() {
            return;
        }

        let deadline = Instant::now() + DRAIN_TIMEOUT;
        loop {
            let active = self.active_operations.lock().unwrap_or_else(|e| e.into_inner()).len();
            if active == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(active, "Stopping with sync operations still in flight");
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        self.watcher.stop().await;
        self.running.store(false, Ordering::SeqCst);

        let handle = self.watch_task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle
            && tokio::time::timeout(DRAIN_TIMEOUT, handle).await.is_err()
        {
            warn!("Watch loop did not finish in time");
        }
        info!("Sync orchestrator stopped");
    }

    /// [`stop`](Self::stop), then detach every event subscriber
    pub async fn dispose(&self) {
        debug!("SyncOrchestrator::dispose: called");
        self.stop().await;
        self.bus.close();
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn sync_state(&self) -> SyncState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The last `limit` history rows (all when `None`), oldest first
    pub fn sync_history(&self, limit: Option<usize>) -> Vec<SyncHistory> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).recent(limit)
    }

    /// Manually run a file→database pass
    pub async fn trigger_file_to_db_sync(&self) -> Result<SyncHistory, SyncError> {
        debug!("SyncOrchestrator::trigger_file_to_db_sync: called");
        self.ensure_running()?;
        if !self.config.direction.allows_file_to_app() {
            return Err(SyncError::Configuration(format!(
                "direction {} does not sync file to app",
                self.config.direction
            )));
        }
        self.sync_file_to_db().await
    }

    /// Manually run a database→file pass over the board's current tasks
    pub async fn trigger_db_to_file_sync(&self) -> Result<SyncHistory, SyncError> {
        debug!("SyncOrchestrator::trigger_db_to_file_sync: called");
        self.ensure_running()?;
        if !self.config.direction.allows_app_to_file() {
            return Err(SyncError::Configuration(format!(
                "direction {} does not sync app to file",
                self.config.direction
            )));
        }
        self.run_pass(SyncDirection::AppToFile, || self.db_to_file_attempt(None))
            .await
    }

    /// React to a watcher event; ignored unless running
    pub async fn handle_file_change(&self, event: FileEvent) {
        debug!(?event, "SyncOrchestrator::handle_file_change: called");
        if !self.is_active() {
            debug!("SyncOrchestrator::handle_file_change: not running, ignoring");
            return;
        }

        self.bus.emit(SyncEvent::FileChanged { event: event.clone() });
        if !event.triggers_sync() {
            warn!(path = %event.path.display(), error = ?event.error, "File watcher reported an error");
            return;
        }
        if !self.config.direction.allows_file_to_app() {
            return;
        }

        // Outcome already went out as an event and a history row
        if let Err(e) = self.sync_file_to_db().await {
            debug!(error = %e, "SyncOrchestrator::handle_file_change: pass failed");
        }
    }

    /// Parse the TODO file and reconcile it into the database
    pub async fn sync_file_to_db(&self) -> Result<SyncHistory, SyncError> {
        debug!("SyncOrchestrator::sync_file_to_db: called");
        self.run_pass(SyncDirection::FileToApp, || self.file_to_db_attempt())
            .await
    }

    /// Write `tasks` to the TODO file
    pub async fn sync_db_to_file(&self, tasks: Vec<Task>) -> Result<SyncHistory, SyncError> {
        debug!(count = tasks.len(), "SyncOrchestrator::sync_db_to_file: called");
        self.run_pass(SyncDirection::AppToFile, || self.db_to_file_attempt(Some(tasks.as_slice())))
            .await
    }

    fn validate_config(&self) -> Result<(), SyncError> {
        if self.config.todo_path.as_os_str().is_empty() {
            return Err(SyncError::Configuration("todo-path is required".to_string()));
        }
        if self.config.board_id.trim().is_empty() {
            return Err(SyncError::Configuration("board-id is required".to_string()));
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), SyncError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SyncError::NotRunning)
        }
    }

    /// Advance the state through `transition` and publish the result
    fn transition(&self, transition: impl FnOnce(SyncState) -> SyncState) {
        let state = {
            let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let next = transition(std::mem::take(&mut *guard));
            *guard = next.clone();
            next
        };
        self.bus.emit(SyncEvent::StateUpdated { state });
    }

    fn register_operation(&self, direction: SyncDirection) -> OperationGuard<'_> {
        let id = uuid::Uuid::now_v7().to_string();
        self.active_operations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), direction);
        OperationGuard {
            operations: &self.active_operations,
            id,
        }
    }

    /// One serialized pass: retry `attempt` with backoff, then record and
    /// announce the outcome
    async fn run_pass<'a, F, Fut>(&'a self, direction: SyncDirection, mut attempt: F) -> Result<SyncHistory, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PassOutcome, SyncError>> + 'a,
    {
        let _operation = self.register_operation(direction);
        self.transition(SyncState::enqueued);
        let _slot = self.sync_lock.lock().await;

        let started_at = Local::now();
        let timer = Instant::now();
        self.bus.emit(SyncEvent::SyncStart {
            direction,
            timestamp: started_at,
        });
        self.transition(SyncState::started);

        let mut attempts = 0;
        let mut result = Err(SyncError::NotRunning);
        for n in 0..=self.retry.max_retries {
            if n > 0 {
                let delay = self.retry.backoff(n);
                warn!(attempt = n, backoff_ms = delay.as_millis() as u64, %direction, "Retrying sync pass");
                tokio::time::sleep(delay).await;
            }
            attempts = n + 1;
            result = attempt().await;
            match &result {
                Ok(_) => break,
                Err(e) if e.is_retryable() => {
                    error!(attempt = attempts, error = %e, %direction, "Sync attempt failed");
                }
                Err(e) => {
                    error!(error = %e, %direction, "Sync attempt failed, not retrying");
                    break;
                }
            }
        }

        let completed_at = Local::now();
        let mut history = SyncHistory::new(direction, started_at, completed_at);
        history.attempts = attempts;
        history.duration_ms = timer.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                history = history.with_counts(outcome.counts).succeeded();
                history.dry_run = outcome.dry_run;
                self.record(history.clone());
                self.transition(|s| s.completed(completed_at, outcome.unresolved_conflicts));
                if !outcome.task_ids.is_empty() {
                    self.bus.emit(SyncEvent::DbChanged {
                        task_ids: outcome.task_ids,
                    });
                }
                info!(
                    %direction,
                    created = history.tasks_created,
                    updated = history.tasks_updated,
                    deleted = history.tasks_deleted,
                    duration_ms = history.duration_ms,
                    dry_run = history.dry_run,
                    "Sync pass complete"
                );
                self.bus.emit(SyncEvent::SyncComplete {
                    history: history.clone(),
                });
                Ok(history)
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let err = if retryable {
                    SyncError::RetriesExhausted {
                        attempts,
                        last: Box::new(e),
                    }
                } else {
                    e
                };
                history = history.failed(err.to_string());
                self.record(history.clone());
                self.transition(|s| s.failed(err.to_string()));
                self.bus.emit(SyncEvent::SyncError {
                    error: err.to_string(),
                    context: ErrorContext {
                        direction,
                        attempts,
                        retryable,
                        history_id: history.id.clone(),
                    },
                });
                Err(err)
            }
        }
    }

    fn record(&self, history: SyncHistory) {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).push(history);
    }

    async fn file_to_db_attempt(&self) -> Result<PassOutcome, SyncError> {
        debug!("SyncOrchestrator::file_to_db_attempt: called");
        let path = self.validator.validate_async(&self.config.todo_path).await?;

        let stat = self.fs.stat(&path).await.map_err(|e| SyncError::io(&path, e))?;
        let max_bytes = self.parser.limits().max_file_size_bytes();
        if stat.size > max_bytes {
            return Err(SyncError::InvalidContent(vec![format!(
                "File size ({} bytes) exceeds maximum ({} bytes)",
                stat.size, max_bytes
            )]));
        }

        let content = self.fs.read_file(&path).await.map_err(|e| SyncError::io(&path, e))?;
        let report = self.parser.validate(&content);
        for warning in &report.warnings {
            warn!(path = %path.display(), %warning, "TODO file");
        }
        if !report.valid {
            return Err(SyncError::InvalidContent(report.errors));
        }

        let parsed = self.parser.extract_tasks(&self.parser.parse(&content));
        let existing = self.db.get_tasks_by_board(&self.config.board_id).await?;
        let now = Local::now();

        let plan = {
            let base = self.base.lock().unwrap_or_else(|e| e.into_inner());
            Reconciler {
                board_id: &self.config.board_id,
                column_id: &self.config.column_id,
                resolver: self.resolver.as_ref(),
                policy: self.config.conflict_resolution,
                sanitizer: self.generator.sanitizer(),
                base: &base,
            }
            .plan(&parsed, &existing, now)
        };
        let unresolved_conflicts = plan.unresolved_conflicts() as u32;

        if self.config.dry_run {
            info!(
                created = plan.creates.len(),
                updated = plan.updates.len(),
                deleted = plan.deletes.len(),
                "Dry run, database left untouched"
            );
            return Ok(PassOutcome {
                counts: plan.counts(),
                unresolved_conflicts,
                task_ids: Vec::new(),
                dry_run: true,
            });
        }

        let counts = plan.counts();
        let mut task_ids = Vec::with_capacity(counts.changed());

        for new in plan.creates {
            let task = self.db.create_task(new).await?;
            debug!(id = %task.id, title = %task.title, "Created task from file");
            self.remember(&task.id, Some(TaskFields::from(&task)));
            task_ids.push(task.id);
        }

        for planned in plan.updates {
            self.db.update_task(&planned.id, planned.update).await?;
            debug!(id = %planned.id, title = %planned.title, "Updated task from file");
            if !plan.contested.contains(&planned.id) {
                self.remember(&planned.id, Some(planned.fields));
            }
            task_ids.push(planned.id);
        }

        for (id, fields) in plan.unchanged {
            if !plan.contested.contains(&id) {
                self.remember(&id, Some(fields));
            }
        }

        for id in plan.deletes {
            self.db.update_task(&id, TaskUpdate::soft_delete(now)).await?;
            debug!(%id, "Soft-deleted task missing from file");
            self.remember(&id, None);
            task_ids.push(id);
        }

        Ok(PassOutcome {
            counts,
            unresolved_conflicts,
            task_ids,
            dry_run: false,
        })
    }

    async fn db_to_file_attempt(&self, tasks: Option<&[Task]>) -> Result<PassOutcome, SyncError> {
        debug!("SyncOrchestrator::db_to_file_attempt: called");
        let fetched;
        let tasks = match tasks {
            Some(tasks) => tasks,
            None => {
                fetched = self.db.get_tasks_by_board(&self.config.board_id).await?;
                fetched.as_slice()
            }
        };
        let written: Vec<&Task> = tasks.iter().filter(|t| !t.is_deleted()).collect();
        let unresolved_conflicts = self.sync_state().unresolved_conflicts;
        let counts = ChangeCounts {
            updated: written.len(),
            ..ChangeCounts::default()
        };

        if self.config.dry_run {
            let path = self.validator.validate_async(&self.config.todo_path).await?;
            let rendered = self.generator.render(tasks, Local::now());
            info!(path = %path.display(), bytes = rendered.len(), "Dry run, TODO file left untouched");
            return Ok(PassOutcome {
                counts,
                unresolved_conflicts,
                task_ids: Vec::new(),
                dry_run: true,
            });
        }

        self.generator
            .generate(tasks, &self.config.todo_path, &self.validator, self.fs.as_ref())
            .await?;
        for task in &written {
            self.remember(&task.id, Some(TaskFields::from(*task)));
        }

        Ok(PassOutcome {
            counts,
            unresolved_conflicts,
            task_ids: Vec::new(),
            dry_run: false,
        })
    }

    fn remember(&self, id: &str, fields: Option<TaskFields>) {
        let mut base = self.base.lock().unwrap_or_else(|e| e.into_inner());
        match fields {
            Some(fields) => {
                base.insert(id.to_string(), fields);
            }
            None => {
                base.remove(id);
            }
        }
    }
}

/// Forward watcher events until the watcher goes away or the orchestrator is dropped
async fn watch_loop(orchestrator: Weak<SyncOrchestrator>, mut events: mpsc::Receiver<FileEvent>) {
    debug!("watch_loop: started");
    while let Some(event) = events.recv().await {
        let Some(orchestrator) = orchestrator.upgrade() else {
            break;
        };
        orchestrator.handle_file_change(event).await;
    }
    debug!("watch_loop: stopped");
}
