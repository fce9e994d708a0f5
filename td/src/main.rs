//! td - Markdown TODO file ⇄ task database sync
//!
//! CLI entry point.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result, bail};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use taskstore::{Database, SqliteStore};
use todosync::cli::{
    Cli, Command, OutputFormat, after_help, format_history, format_task_groups, format_validation, parse_json,
};
use todosync::config::Config;
use todosync::events::{EventBus, SyncEvent, spawn_event_logger};
use todosync::markdown::MarkdownParser;
use todosync::path::PathValidator;
use todosync::sync::SyncOrchestrator;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("todosync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("todosync.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Parse { file, format } => cmd_parse(&config, &file, format).await,
        Command::Validate { file } => cmd_validate(&config, &file).await,
        Command::Sync {
            direction,
            dry_run,
            once,
            todo,
        } => {
            let mut config = config;
            if let Some(direction) = direction {
                config.sync.direction = direction;
            }
            if let Some(todo) = todo {
                config.sync.todo_path = todo;
            }
            config.sync.dry_run |= dry_run;
            cmd_sync(config, once).await
        }
        Command::Export { dry_run, todo } => {
            let mut config = config;
            if let Some(todo) = todo {
                config.sync.todo_path = todo;
            }
            config.sync.dry_run |= dry_run;
            cmd_export(config).await
        }
    }
}

/// Read a TODO file through the sandbox
async fn read_todo(config: &Config, file: &Path) -> Result<String> {
    let validator = PathValidator::new(&config.sync.base_dir)?;
    let path = validator.validate_async(file).await?;
    validator
        .validate_file_size(&path, config.sync.limits().max_file_size_bytes())
        .await?;
    let content = tokio::fs::read_to_string(&path)
        .await
        .context(format!("Failed to read {}", path.display()))?;
    Ok(content)
}

async fn cmd_parse(config: &Config, file: &Path, format: OutputFormat) -> Result<()> {
    debug!(?file, ?format, "cmd_parse: called");
    let content = read_todo(config, file).await?;
    let parser = MarkdownParser::new(config.sync.limits());
    let result = parser.parse(&content);

    match format {
        OutputFormat::Json => println!("{}", parse_json(&result, &parser.extract_tasks(&result))?),
        OutputFormat::Text => print!("{}", format_task_groups(&parser.extract_tasks_by_section(&result))),
    }
    Ok(())
}

async fn cmd_validate(config: &Config, file: &Path) -> Result<()> {
    debug!(?file, "cmd_validate: called");
    let content = read_todo(config, file).await?;
    let report = MarkdownParser::new(config.sync.limits()).validate(&content);
    print!("{}", format_validation(&report));
    if !report.valid {
        bail!("{} is not a valid TODO file", file.display());
    }
    Ok(())
}

/// Orchestrator plus the event logger task, when one is configured
fn build_orchestrator(
    config: &Config,
    store: Arc<SqliteStore>,
) -> Result<(Arc<SyncOrchestrator>, Option<JoinHandle<()>>)> {
    let bus = Arc::new(EventBus::with_default_capacity());
    let logger = config
        .store
        .event_log
        .as_ref()
        .map(|path| spawn_event_logger(bus.clone(), path));
    let orchestrator = SyncOrchestrator::new(config.sync.clone(), store)?
        .with_retry_policy(config.retry)
        .with_event_bus(bus);
    Ok((Arc::new(orchestrator), logger))
}

/// Print pass outcomes as they happen
fn spawn_progress_printer(mut rx: broadcast::Receiver<SyncEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(SyncEvent::SyncComplete { history }) => println!(
                    "{} {} +{} ~{} -{}",
                    "synced".green(),
                    history.direction,
                    history.tasks_created,
                    history.tasks_updated,
                    history.tasks_deleted
                ),
                Ok(SyncEvent::SyncError { error, .. }) => eprintln!("{} {}", "sync failed:".red(), error),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn cmd_sync(config: Config, once: bool) -> Result<()> {
    debug!(sync = ?config.sync, once, "cmd_sync: called");
    let store = Arc::new(SqliteStore::new(&config.store.path));
    let (orchestrator, logger) = build_orchestrator(&config, store.clone())?;
    let printer = spawn_progress_printer(orchestrator.subscribe());

    orchestrator.start().await.context("Failed to start sync")?;
    let direction = config.sync.direction;
    if direction.allows_app_to_file() {
        // Failure is reported by the printer and kept in history
        let _ = orchestrator.trigger_db_to_file_sync().await;
    }

    if !once {
        println!(
            "Watching {} ({}). Press Ctrl-C to stop.",
            config.sync.todo_path.display(),
            direction
        );
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    }

    orchestrator.dispose().await;
    store.shutdown().await;
    let _ = printer.await;
    if let Some(logger) = logger {
        let _ = logger.await;
    }

    let history = orchestrator.sync_history(None);
    println!("\n{}", "History".bold());
    print!("{}", format_history(&history));

    if once && history.iter().any(|h| !h.success) {
        bail!("One or more sync passes failed");
    }
    Ok(())
}

async fn cmd_export(config: Config) -> Result<()> {
    debug!(sync = ?config.sync, "cmd_export: called");
    if !config.sync.direction.allows_app_to_file() {
        bail!("Configured direction {} does not write the TODO file", config.sync.direction);
    }

    let store = Arc::new(SqliteStore::new(&config.store.path));
    store.connect().await.context("Failed to open task database")?;
    let tasks = store.get_tasks_by_board(&config.sync.board_id).await?;

    let (orchestrator, logger) = build_orchestrator(&config, store.clone())?;
    let result = orchestrator.sync_db_to_file(tasks).await;
    orchestrator.dispose().await;
    store.shutdown().await;
    if let Some(logger) = logger {
        let _ = logger.await;
    }
    let history = result?;

    print!("{}", format_history(&[history]));
    Ok(())
}
