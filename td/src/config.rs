//! todosync configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::sync::{ConflictPolicy, SyncDirection, SyncStrategy};

/// Environment override for [`ParseLimits::max_file_size_mb`]
pub const ENV_MAX_FILE_SIZE_MB: &str = "TODO_MAX_FILE_SIZE_MB";

/// Environment override for [`ParseLimits::max_tasks`]
pub const ENV_MAX_TASKS: &str = "TODO_MAX_TASKS";

const DEFAULT_MAX_FILE_SIZE_MB: u64 = 5;
const DEFAULT_MAX_TASKS: usize = 10_000;

/// Main todosync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Sync engine configuration
    pub sync: SyncConfig,

    /// Retry behavior for sync passes
    pub retry: RetryPolicy,

    /// Task database location
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then `./.todosync.yml`, then
    /// `~/.config/todosync/todosync.yml`, then defaults. The
    /// `TODO_MAX_FILE_SIZE_MB`/`TODO_MAX_TASKS` environment overrides are
    /// applied once here and never read again.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.sync.apply_env_overrides();
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".todosync.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("todosync").join("todosync.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Read just the log level, before logging is initialized
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = config_path.cloned().unwrap_or_else(|| PathBuf::from(".todosync.yml"));
        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }
}

/// Sync engine configuration; immutable once handed to the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sandbox root; every file the engine touches must resolve inside it
    #[serde(rename = "base-dir")]
    pub base_dir: PathBuf,

    /// TODO file, relative to `base_dir`
    #[serde(rename = "todo-path")]
    pub todo_path: PathBuf,

    pub direction: SyncDirection,

    pub strategy: SyncStrategy,

    #[serde(rename = "conflict-resolution")]
    pub conflict_resolution: ConflictPolicy,

    /// Quiet period before a burst of file events is delivered
    #[serde(rename = "debounce-ms")]
    pub debounce_ms: u64,

    /// Minimum gap between two delivered file events
    #[serde(rename = "throttle-ms")]
    pub throttle_ms: u64,

    #[serde(rename = "max-file-size-mb")]
    pub max_file_size_mb: u64,

    #[serde(rename = "max-tasks")]
    pub max_tasks: usize,

    /// Parse/generate without mutating the database or the file
    #[serde(rename = "dry-run")]
    pub dry_run: bool,

    /// Board the TODO file mirrors
    #[serde(rename = "board-id")]
    pub board_id: String,

    /// Column assigned to tasks created from the file
    #[serde(rename = "column-id")]
    pub column_id: String,

    /// Title line of generated files
    pub title: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            todo_path: PathBuf::from("TODO.md"),
            direction: SyncDirection::default(),
            strategy: SyncStrategy::default(),
            conflict_resolution: ConflictPolicy::default(),
            debounce_ms: 500,
            throttle_ms: 1000,
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            max_tasks: DEFAULT_MAX_TASKS,
            dry_run: false,
            board_id: "default".to_string(),
            column_id: "todo".to_string(),
            title: "TODO".to_string(),
        }
    }
}

impl SyncConfig {
    /// Limits handed to the parser
    pub fn limits(&self) -> ParseLimits {
        ParseLimits {
            max_file_size_mb: self.max_file_size_mb,
            max_tasks: self.max_tasks,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    fn apply_env_overrides(&mut self) {
        let limits = ParseLimits::from_env_or(self.limits());
        self.max_file_size_mb = limits.max_file_size_mb;
        self.max_tasks = limits.max_tasks;
    }
}

/// Size and count ceilings enforced by `MarkdownParser::validate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseLimits {
    pub max_file_size_mb: u64,
    pub max_tasks: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            max_tasks: DEFAULT_MAX_TASKS,
        }
    }
}

impl ParseLimits {
    /// Defaults overridden by `TODO_MAX_FILE_SIZE_MB` / `TODO_MAX_TASKS`
    pub fn from_env() -> Self {
        Self::from_env_or(Self::default())
    }

    /// `fallback` overridden by the environment; unparsable values are ignored
    pub fn from_env_or(fallback: Self) -> Self {
        let max_file_size_mb = read_env(ENV_MAX_FILE_SIZE_MB).unwrap_or(fallback.max_file_size_mb);
        let max_tasks = read_env(ENV_MAX_TASKS).unwrap_or(fallback.max_tasks);
        debug!(max_file_size_mb, max_tasks, "ParseLimits::from_env_or: resolved");
        Self {
            max_file_size_mb,
            max_tasks,
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(%name, %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Exponential backoff for sync pass retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `min(initial * 2^(attempt-1), max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let ms = self.initial_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }

    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Task database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: PathBuf,

    /// JSONL event log; disabled when unset
    #[serde(rename = "event-log")]
    pub event_log: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/todosync on Linux)
        let data_dir = dirs::data_dir()
            .map(|d| d.join("todosync"))
            .unwrap_or_else(|| PathBuf::from(".todosync"));

        Self {
            path: data_dir.join("tasks.db"),
            event_log: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.todo_path, PathBuf::from("TODO.md"));
        assert_eq!(config.sync.direction, SyncDirection::Bidirectional);
        assert_eq!(config.sync.max_file_size_mb, 5);
        assert_eq!(config.sync.max_tasks, 10_000);
        assert_eq!(config.retry.max_retries, 3);
        assert!(!config.sync.dry_run);
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
log-level: debug
sync:
  todo-path: notes/TODO.md
  direction: file_to_app
  strategy: merge
  conflict-resolution: prefer-db
  debounce-ms: 250
  dry-run: true
retry:
  max-retries: 1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.sync.todo_path, PathBuf::from("notes/TODO.md"));
        assert_eq!(config.sync.direction, SyncDirection::FileToApp);
        assert_eq!(config.sync.strategy, SyncStrategy::Merge);
        assert_eq!(config.sync.conflict_resolution, ConflictPolicy::PreferDb);
        assert_eq!(config.sync.debounce_ms, 250);
        assert!(config.sync.dry_run);
        assert_eq!(config.retry.max_retries, 1);
        // Unspecified fields keep defaults
        assert_eq!(config.sync.throttle_ms, 1000);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
        assert_eq!(policy.backoff(3), Duration::from_millis(4000));
        assert_eq!(policy.backoff(4), Duration::from_millis(8000));
        assert_eq!(policy.backoff(5), Duration::from_millis(10_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(10_000));
        assert_eq!(policy.total_attempts(), 4);
    }

    #[test]
    #[serial]
    fn test_limits_from_env() {
        // SAFETY: serialized with other env-mutating tests
        unsafe {
            std::env::set_var(ENV_MAX_FILE_SIZE_MB, "1");
            std::env::set_var(ENV_MAX_TASKS, "not-a-number");
        }
        let limits = ParseLimits::from_env();
        unsafe {
            std::env::remove_var(ENV_MAX_FILE_SIZE_MB);
            std::env::remove_var(ENV_MAX_TASKS);
        }
        assert_eq!(limits.max_file_size_mb, 1);
        assert_eq!(limits.max_tasks, 10_000);
        assert_eq!(limits.max_file_size_bytes(), 1024 * 1024);
    }

    #[test]
    fn test_max_file_size_bytes_saturates() {
        let limits = ParseLimits {
            max_file_size_mb: u64::MAX,
            max_tasks: 1,
        };
        assert_eq!(limits.max_file_size_bytes(), u64::MAX);
    }

    #[test]
    #[serial]
    fn test_load_explicit_path_applies_env() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("todosync.yml");
        fs::write(&path, "sync:\n  max-tasks: 50\n").unwrap();

        unsafe {
            std::env::set_var(ENV_MAX_TASKS, "7");
        }
        let config = Config::load(Some(&path));
        unsafe {
            std::env::remove_var(ENV_MAX_TASKS);
        }
        let config = config.unwrap();
        assert_eq!(config.sync.max_tasks, 7);
        assert_eq!(config.sync.limits().max_tasks, 7);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/todosync.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
