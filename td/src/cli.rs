//! CLI command definitions and output helpers

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::debug;

use crate::markdown::{MarkdownParseResult, ParsedTask, TaskGroup, ValidationReport};
use crate::sync::{SyncDirection, SyncHistory};

/// todosync - keep a Markdown TODO file and a task database in step
#[derive(Parser)]
#[command(
    name = "td",
    about = "Bidirectional sync between a Markdown TODO file and a task database",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse a TODO file and print its tasks
    Parse {
        /// TODO file, relative to the sync base directory
        file: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check a TODO file for structural problems
    Validate {
        /// TODO file, relative to the sync base directory
        file: PathBuf,
    },

    /// Sync the TODO file with the task database
    Sync {
        /// Override the configured direction (file_to_app, app_to_file, bidirectional)
        #[arg(short, long)]
        direction: Option<SyncDirection>,

        /// Compute changes without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Run one pass each way and exit instead of watching
        #[arg(long)]
        once: bool,

        /// Override the configured TODO file
        #[arg(short, long)]
        todo: Option<PathBuf>,
    },

    /// Write the database's tasks to the TODO file
    Export {
        /// Render without writing
        #[arg(long)]
        dry_run: bool,

        /// Override the configured TODO file
        #[arg(short, long)]
        todo: Option<PathBuf>,
    },
}

/// Output format for `parse`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}

/// Where `td` writes its log file
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("todosync")
        .join("logs")
        .join("todosync.log");
    debug!(?path, "get_log_path: returning path");
    path
}

pub fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}

/// Human-readable listing of parsed tasks, grouped by section
pub fn format_task_groups(groups: &[TaskGroup]) -> String {
    let mut out = String::new();
    for group in groups {
        let heading = group.section.as_deref().unwrap_or("(no section)");
        out.push_str(&format!("{}\n", heading.bold()));
        for task in &group.tasks {
            out.push_str(&format!("  {}\n", format_task(task)));
        }
    }
    out
}

fn format_task(task: &ParsedTask) -> String {
    let marker = task.state().marker();
    let mut line = format!("{}{} {}", "  ".repeat(task.indent_level), marker, task.title);
    if let Some(priority) = task.metadata.priority {
        line.push_str(&format!(" {}", format!("priority:{}", priority).yellow()));
    }
    if let Some(due) = &task.metadata.due_date {
        line.push_str(&format!(" {}", format!("due:{}", due).cyan()));
    }
    for tag in &task.metadata.tags {
        line.push_str(&format!(" {}", format!("#{}", tag).blue()));
    }
    line
}

/// JSON document printed by `parse --format json`
pub fn parse_json(result: &MarkdownParseResult, tasks: &[ParsedTask]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&serde_json::json!({
        "front_matter": result.front_matter,
        "line_count": result.line_count,
        "char_count": result.char_count,
        "tasks": tasks,
    }))
}

pub fn format_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    if report.valid {
        out.push_str(&format!("{}\n", "✓ valid".green()));
    } else {
        out.push_str(&format!("{}\n", "✗ invalid".red()));
    }
    for error in &report.errors {
        out.push_str(&format!("  {} {}\n", "error:".red(), error));
    }
    for warning in &report.warnings {
        out.push_str(&format!("  {} {}\n", "warning:".yellow(), warning));
    }
    out
}

pub fn format_history(rows: &[SyncHistory]) -> String {
    let mut out = String::new();
    for row in rows {
        let status = if row.success { "✓".green() } else { "✗".red() };
        out.push_str(&format!(
            "{} {} {:<13} +{} ~{} -{} {}ms",
            status,
            row.completed_at.format("%Y-%m-%d %H:%M:%S"),
            row.direction.to_string(),
            row.tasks_created,
            row.tasks_updated,
            row.tasks_deleted,
            row.duration_ms
        ));
        if row.dry_run {
            out.push_str(&format!(" {}", "(dry run)".dimmed()));
        }
        if let Some(error) = &row.error {
            out.push_str(&format!(" {}", error.red()));
        }
        out.push('\n');
    }
    out
}
