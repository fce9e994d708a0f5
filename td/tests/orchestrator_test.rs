//! Integration tests for the sync orchestrator
//!
//! These run full passes against a `MemoryStore` and a temp directory, with the
//! watcher replaced so passes only happen when a test asks for them.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use taskstore::{Database, MemoryStore, NewTask, TaskPriority, TaskStatus};
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

use todosync::config::{RetryPolicy, SyncConfig};
use todosync::fs::{FileStat, FileSystem, LocalFileSystem};
use todosync::sync::{SyncDirection, SyncError, SyncOrchestrator};
use todosync::watcher::{FileEvent, FileWatcher, WatchError};
use todosync::{PathError, SyncEvent};

// =============================================================================
// Fixtures
// =============================================================================

/// Watcher that never fires
struct IdleWatcher;

#[async_trait]
impl FileWatcher for IdleWatcher {
    async fn start(&self, _: &Path, _: mpsc::Sender<FileEvent>) -> Result<(), WatchError> {
        Ok(())
    }

    async fn stop(&self) {}

    fn is_watching(&self) -> bool {
        false
    }
}

/// Local disk whose reads fail until `failures` runs out
struct FlakyFileSystem {
    failures: AtomicU32,
    reads: AtomicU32,
}

impl FlakyFileSystem {
    fn failing(times: u32) -> Self {
        Self {
            failures: AtomicU32::new(times),
            reads: AtomicU32::new(0),
        }
    }

    fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystem for FlakyFileSystem {
    async fn read_file(&self, path: &Path) -> io::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(io::Error::other("simulated read failure"));
        }
        LocalFileSystem.read_file(path).await
    }

    async fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        LocalFileSystem.write_file(path, content).await
    }

    async fn stat(&self, path: &Path) -> io::Result<FileStat> {
        LocalFileSystem.stat(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        LocalFileSystem.exists(path).await
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
    }
}

struct Harness {
    temp: TempDir,
    store: Arc<MemoryStore>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    fn new(content: Option<&str>) -> Self {
        Self::build(content, None, |_| {})
    }

    fn build(
        content: Option<&str>,
        fs: Option<Arc<dyn FileSystem>>,
        configure: impl FnOnce(&mut SyncConfig),
    ) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        if let Some(content) = content {
            std::fs::write(temp.path().join("TODO.md"), content).unwrap();
        }

        let mut config = SyncConfig {
            base_dir: temp.path().to_path_buf(),
            ..SyncConfig::default()
        };
        configure(&mut config);

        let store = Arc::new(MemoryStore::new());
        let mut orchestrator = SyncOrchestrator::new(config, store.clone())
            .unwrap()
            .with_watcher(Arc::new(IdleWatcher))
            .with_retry_policy(fast_retry());
        if let Some(fs) = fs {
            orchestrator = orchestrator.with_file_system(fs);
        }

        Self {
            temp,
            store,
            orchestrator: Arc::new(orchestrator),
        }
    }

    fn todo_path(&self) -> std::path::PathBuf {
        self.temp.path().join("TODO.md")
    }

    fn write_todo(&self, content: &str) {
        std::fs::write(self.todo_path(), content).unwrap();
    }

    fn read_todo(&self) -> String {
        std::fs::read_to_string(self.todo_path()).unwrap()
    }
}

fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count(events: &[SyncEvent], event_type: &str) -> usize {
    events.iter().filter(|e| e.event_type() == event_type).count()
}

// =============================================================================
// Retry Tests
// =============================================================================

#[tokio::test]
async fn test_transient_failures_are_retried_to_success() {
    let fs = Arc::new(FlakyFileSystem::failing(2));
    let harness = Harness::build(Some("- [ ] One\n"), Some(fs.clone()), |_| {});
    let mut rx = harness.orchestrator.subscribe();

    harness.orchestrator.start().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(count(&events, "sync:complete"), 1);
    assert_eq!(count(&events, "sync:error"), 0);
    assert_eq!(fs.reads(), 3);

    let history = harness.orchestrator.sync_history(None);
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert_eq!(history[0].attempts, 3);
    assert_eq!(harness.store.get_tasks_by_board("default").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_persistent_failure_reports_once() {
    let fs = Arc::new(FlakyFileSystem::failing(u32::MAX));
    let harness = Harness::build(Some("- [ ] One\n"), Some(fs.clone()), |_| {});
    let mut rx = harness.orchestrator.subscribe();

    // Initial sync failure does not fail start
    harness.orchestrator.start().await.unwrap();
    assert!(harness.orchestrator.is_active());

    let events = drain(&mut rx);
    assert_eq!(count(&events, "sync:error"), 1);
    assert_eq!(count(&events, "sync:complete"), 0);
    assert_eq!(fs.reads(), fast_retry().total_attempts());

    let context = events.iter().find_map(|e| match e {
        SyncEvent::SyncError { context, .. } => Some(context.clone()),
        _ => None,
    });
    let context = context.unwrap();
    assert_eq!(context.attempts, 4);
    assert!(context.retryable);

    let history = harness.orchestrator.sync_history(None);
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert_eq!(history[0].id, context.history_id);

    let state = harness.orchestrator.sync_state();
    assert!(!state.syncing);
    assert_eq!(state.errors.len(), 1);
}

#[tokio::test]
async fn test_manual_trigger_surfaces_exhausted_retries() {
    let fs = Arc::new(FlakyFileSystem::failing(u32::MAX));
    let harness = Harness::build(None, Some(fs), |_| {});
    harness.orchestrator.start().await.unwrap();
    harness.write_todo("- [ ] One\n");

    let result = harness.orchestrator.trigger_file_to_db_sync().await;
    match result {
        Err(SyncError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 4);
            assert!(matches!(*last, SyncError::Io { .. }));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

// =============================================================================
// End-to-End Tests
// =============================================================================

#[tokio::test]
async fn test_file_to_db_end_to_end() {
    let harness = Harness::new(Some(
        "## 🔥 最優先\n- [ ] Fix bug due: 2025-12-31 priority: high #urgent\n- [x] Done task\n",
    ));
    harness.orchestrator.start().await.unwrap();

    let tasks = harness.store.get_tasks_by_board("default").await.unwrap();
    assert_eq!(tasks.len(), 2);

    let fix = &tasks[0];
    assert_eq!(fix.title, "Fix bug");
    assert_eq!(fix.status, TaskStatus::Todo);
    assert_eq!(fix.priority, TaskPriority::High);
    assert_eq!(fix.labels, vec!["urgent"]);
    assert_eq!(fix.due_date, NaiveDate::from_ymd_opt(2025, 12, 31));

    let done = &tasks[1];
    assert_eq!(done.title, "Done task");
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.priority, TaskPriority::Critical);
    assert!(done.completed_at.is_some());
}

#[tokio::test]
async fn test_removed_lines_are_soft_deleted() {
    let harness = Harness::new(Some("- [ ] Keep\n- [ ] Drop\n"));
    let mut rx = harness.orchestrator.subscribe();
    harness.orchestrator.start().await.unwrap();

    harness.write_todo("- [x] Keep\n");
    let history = harness.orchestrator.trigger_file_to_db_sync().await.unwrap();
    assert_eq!(history.tasks_updated, 1);
    assert_eq!(history.tasks_deleted, 1);

    let tasks = harness.store.get_tasks_by_board("default").await.unwrap();
    assert_eq!(tasks.len(), 2, "soft delete keeps the row");
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert!(tasks[1].is_deleted());
    assert!(tasks[1].deleted_at.is_some());

    let changed: Vec<Vec<String>> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::DbChanged { task_ids } => Some(task_ids),
            _ => None,
        })
        .collect();
    assert_eq!(changed.len(), 2);
    assert!(changed[1].contains(&tasks[1].id));
}

#[tokio::test]
async fn test_db_to_file_round_trip_is_stable() {
    let harness = Harness::new(Some(
        "## Inbox\n- [ ] Write report priority: high #docs\n- [~] Review PR\n- [x] Send invoice\n",
    ));
    harness.orchestrator.start().await.unwrap();

    let written = harness.orchestrator.trigger_db_to_file_sync().await.unwrap();
    assert_eq!(written.direction, SyncDirection::AppToFile);
    assert_eq!(written.tasks_updated, 3);

    let content = harness.read_todo();
    assert!(content.starts_with("# TODO\n"));
    assert!(content.contains("<!-- total_todos: 2 -->"));
    assert!(content.contains("## ⚡ High\n\n- [ ] Write report #docs"));
    assert!(content.contains("- [~] Review PR"));
    assert!(content.find("## ✅ Completed").unwrap() < content.find("- [x] Send invoice").unwrap());

    let reread = harness.orchestrator.trigger_file_to_db_sync().await.unwrap();
    assert_eq!(reread.tasks_changed, 0);
    assert_eq!(harness.store.get_tasks_by_board("default").await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_titles_with_metadata_lookalikes_keep_identity() {
    let harness = Harness::new(None);
    harness.orchestrator.start().await.unwrap();

    let mut ids = Vec::new();
    for title in ["Fix issue #42", "Meet due: 2025-01-01 Bob", "Read <b>book</b>"] {
        let task = harness.store.create_task(NewTask::new("default", "todo", title)).await.unwrap();
        ids.push(task.id);
    }

    harness.orchestrator.trigger_db_to_file_sync().await.unwrap();
    let content = harness.read_todo();
    assert!(content.contains(r"- [ ] Fix issue \#42 (created"));
    assert!(content.contains(r"- [ ] Meet due\: 2025-01-01 Bob (created"));
    assert!(content.contains("- [ ] Read book (created"));

    let reread = harness.orchestrator.trigger_file_to_db_sync().await.unwrap();
    assert_eq!(reread.tasks_created, 0);
    assert_eq!(reread.tasks_updated, 0);
    assert_eq!(reread.tasks_deleted, 0);

    let tasks = harness.store.get_tasks_by_board("default").await.unwrap();
    assert_eq!(tasks.len(), 3);
    for (task, id) in tasks.iter().zip(&ids) {
        assert_eq!(&task.id, id);
        assert!(!task.is_deleted(), "{} was deleted", task.title);
        assert!(task.labels.is_empty());
        assert!(task.due_date.is_none());
    }
}

#[tokio::test]
async fn test_blank_file_does_not_wipe_the_board() {
    let harness = Harness::new(Some("- [ ] A\n- [ ] B\n"));
    harness.orchestrator.start().await.unwrap();

    for blank in ["\n", "  \n\n"] {
        harness.write_todo(blank);
        let result = harness.orchestrator.trigger_file_to_db_sync().await;
        assert!(matches!(result, Err(SyncError::InvalidContent(_))), "{:?}", result);
    }

    let tasks = harness.store.get_tasks_by_board("default").await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| !t.is_deleted()));
}

#[tokio::test]
async fn test_file_to_app_never_writes_the_file() {
    let harness = Harness::build(Some("- [ ] One\n"), None, |c| c.direction = SyncDirection::FileToApp);
    harness.orchestrator.start().await.unwrap();

    assert!(matches!(
        harness.orchestrator.trigger_db_to_file_sync().await,
        Err(SyncError::Configuration(_))
    ));
    assert_eq!(harness.read_todo(), "- [ ] One\n");
}

#[tokio::test]
async fn test_stop_then_triggers_fail() {
    let harness = Harness::new(None);
    harness.orchestrator.start().await.unwrap();
    harness.orchestrator.stop().await;

    assert!(!harness.orchestrator.is_active());
    assert!(matches!(
        harness.orchestrator.trigger_file_to_db_sync().await,
        Err(SyncError::NotRunning)
    ));
}

// =============================================================================
// Security Tests
// =============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escaping_base_is_rejected() {
    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("secret.md"), "- [ ] Secret\n").unwrap();

    let harness = Harness::build(None, None, |c| c.todo_path = "link.md".into());
    std::os::unix::fs::symlink(outside.path().join("secret.md"), harness.temp.path().join("link.md")).unwrap();

    let result = harness.orchestrator.start().await;
    assert!(matches!(result, Err(SyncError::Security(PathError::SymlinkTraversal { .. }))));
    assert!(harness.store.get_tasks_by_board("default").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_content_is_not_retried() {
    let fs = Arc::new(FlakyFileSystem::failing(0));
    let harness = Harness::build(Some(""), Some(fs.clone()), |_| {});
    harness.orchestrator.start().await.unwrap();

    assert_eq!(fs.reads(), 1);
    let history = harness.orchestrator.sync_history(None);
    assert_eq!(history.len(), 1);
    assert!(!history[0].success);
    assert_eq!(history[0].attempts, 1);
}
