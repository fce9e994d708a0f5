//! Typed events from the sync engine
//!
//! The orchestrator emits a [`SyncEvent`] for every lifecycle step onto an
//! [`EventBus`] (a `tokio::sync::broadcast` channel). The CLI, the
//! [`EventLogger`] and tests subscribe.
//!
//! ```text
//!   SyncOrchestrator ──emit──▶ EventBus ──▶ EventLogger (events.jsonl)
//!                                     ├──▶ CLI progress output
//!                                     └──▶ tests
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use logger::{EventLogger, read_events, spawn_event_logger};
pub use types::{ErrorContext, EventLogEntry, SyncEvent};
