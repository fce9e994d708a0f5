//! MarkdownGenerator - writes tasks back out in the TODO dialect
//!
//! Output is the inverse of the parser but not byte-symmetric: open tasks are
//! regrouped under one fixed section per priority, completed tasks move to a
//! trailing section, and deleted tasks are dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use taskstore::{Task, TaskPriority, TaskStatus};
use thiserror::Error;
use tracing::{debug, info};

use super::metadata::escape_metadata;
use super::sanitize::{HtmlSanitizer, Sanitizer};
use super::types::CheckState;
use crate::fs::FileSystem;
use crate::path::{PathError, PathValidator};

/// Heading of the trailing section holding completed tasks
pub const COMPLETED_SECTION: &str = "✅ Completed";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Heading used for each priority section
pub fn priority_heading(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Critical => "🔥 Critical",
        TaskPriority::High => "⚡ High",
        TaskPriority::Medium => "📌 Medium",
        TaskPriority::Low => "💤 Low",
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone)]
pub struct MarkdownGenerator {
    sanitizer: Arc<dyn Sanitizer>,
    title: String,
}

impl Default for MarkdownGenerator {
    fn default() -> Self {
        Self::new(Arc::new(HtmlSanitizer), "TODO")
    }
}

impl std::fmt::Debug for MarkdownGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkdownGenerator").field("title", &self.title).finish()
    }
}

impl MarkdownGenerator {
    pub fn new(sanitizer: Arc<dyn Sanitizer>, title: impl Into<String>) -> Self {
        Self {
            sanitizer,
            title: title.into(),
        }
    }

    /// Sanitizer applied to every title this generator writes
    pub fn sanitizer(&self) -> &dyn Sanitizer {
        self.sanitizer.as_ref()
    }

    /// Render `tasks` to Markdown; `now` only feeds the `last_updated` stamp
    pub fn render(&self, tasks: &[Task], now: DateTime<Local>) -> String {
        debug!(count = tasks.len(), "MarkdownGenerator::render: called");
        let visible: Vec<&Task> = tasks.iter().filter(|t| t.status != TaskStatus::Deleted).collect();
        let open_count = visible.iter().filter(|t| t.status != TaskStatus::Completed).count();

        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.sanitizer.sanitize_section(&self.title)));
        out.push_str(&format!("<!-- last_updated: {} -->\n", now.format("%Y-%m-%d %H:%M:%S")));
        out.push_str(&format!("<!-- total_todos: {} -->\n", open_count));

        for priority in TaskPriority::RENDER_ORDER {
            out.push_str(&format!("\n## {}\n\n", priority_heading(priority)));
            for task in visible
                .iter()
                .filter(|t| t.priority == priority && t.status != TaskStatus::Completed)
            {
                out.push_str(&self.task_line(task));
            }
        }

        let completed: Vec<&&Task> = visible.iter().filter(|t| t.status == TaskStatus::Completed).collect();
        if !completed.is_empty() {
            out.push_str(&format!("\n## {}\n\n", COMPLETED_SECTION));
            for task in completed {
                out.push_str(&self.task_line(task));
            }
        }

        out
    }

    /// Render and write to `path` inside the validator's sandbox
    pub async fn generate(
        &self,
        tasks: &[Task],
        path: &Path,
        validator: &PathValidator,
        fs: &dyn FileSystem,
    ) -> Result<PathBuf, GenerateError> {
        debug!(?path, count = tasks.len(), "MarkdownGenerator::generate: called");
        let target = validator.validate_async(path).await?;
        let content = self.render(tasks, Local::now());
        fs.write_file(&target, &content)
            .await
            .map_err(|source| GenerateError::Write {
                path: target.clone(),
                source,
            })?;
        info!(path = %target.display(), bytes = content.len(), "Generated TODO file");
        Ok(target)
    }

    fn task_line(&self, task: &Task) -> String {
        let mut line = format!(
            "- {} {}",
            checkbox(task.status).marker(),
            escape_metadata(&self.sanitizer.sanitize_title(&task.title))
        );

        for label in &task.labels {
            let tag = self.sanitizer.sanitize_tag(label);
            if !tag.is_empty() {
                line.push_str(&format!(" #{}", tag));
            }
        }

        line.push_str(&format!(" (created: {}", task.created_at.format(DATE_FORMAT)));
        if let Some(completed_at) = task.completed_at {
            line.push_str(&format!(", completed: {}", completed_at.format(DATE_FORMAT)));
        }
        line.push_str(")\n");
        line
    }
}

fn checkbox(status: TaskStatus) -> CheckState {
    match status {
        TaskStatus::Completed => CheckState::Done,
        TaskStatus::InProgress => CheckState::InProgress,
        TaskStatus::Todo | TaskStatus::Deleted => CheckState::Open,
    }
}
