//! todosync - bidirectional sync between a Markdown TODO file and a task database
//!
//! A TODO file like
//!
//! ```markdown
//! ## Work
//! - [ ] Write report priority: high due: 2025-02-01 #docs
//! - [x] Send invoice
//! ```
//!
//! is parsed into tasks, reconciled against a [`taskstore::Database`], and
//! regenerated from the database when the application side changes.
//!
//! # Modules
//!
//! - [`markdown`] - TODO dialect parser, metadata extraction, generator
//! - [`path`] - sandbox for every path the engine reads or writes
//! - [`fs`] - filesystem collaborator trait
//! - [`watcher`] - debounced/throttled file change notifications
//! - [`sync`] - orchestrator, reconciliation, conflict resolution
//! - [`events`] - broadcast event bus and JSONL event log
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod fs;
pub mod markdown;
pub mod path;
pub mod sync;
pub mod watcher;

// Re-export commonly used types
pub use config::{Config, ParseLimits, RetryPolicy, StoreConfig, SyncConfig};
pub use events::{EventBus, SyncEvent};
pub use fs::{FileSystem, LocalFileSystem};
pub use markdown::{MarkdownGenerator, MarkdownParser, ParsedTask};
pub use path::{PathError, PathValidator};
pub use sync::{SyncDirection, SyncError, SyncHistory, SyncOrchestrator, SyncState};
pub use watcher::{FileEvent, FileWatcher, NotifyWatcher};
