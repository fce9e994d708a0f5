//! Task entity - the canonical record synchronized with the TODO file

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
    Deleted,
}

impl TaskStatus {
    /// Whether the task still counts as open work
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Todo | Self::InProgress)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "TODO"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TODO" => Ok(Self::Todo),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Priority of a task, ordered from least to most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    /// Section order used when rendering: most urgent first
    pub const RENDER_ORDER: [TaskPriority; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// A task as stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub board_id: String,
    pub column_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Local>>,
}

impl Task {
    /// Build a stored task from a creation request
    pub fn from_new(id: String, new: NewTask, now: DateTime<Local>) -> Self {
        let completed_at = match new.status {
            TaskStatus::Completed => Some(now),
            _ => None,
        };
        Self {
            id,
            board_id: new.board_id,
            column_id: new.column_id,
            title: new.title,
            status: new.status,
            priority: new.priority,
            labels: new.labels,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
            completed_at,
            deleted_at: None,
        }
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: &TaskUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(labels) = &update.labels {
            self.labels = labels.clone();
        }
        if let Some(due_date) = update.due_date {
            self.due_date = Some(due_date);
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = completed_at;
        }
        if let Some(deleted_at) = update.deleted_at {
            self.deleted_at = Some(deleted_at);
        }
        self.updated_at = update.updated_at;
    }

    pub fn is_deleted(&self) -> bool {
        self.status == TaskStatus::Deleted || self.deleted_at.is_some()
    }
}

/// Request to create a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub board_id: String,
    pub column_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub labels: Vec<String>,
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(board_id: impl Into<String>, column_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            board_id: board_id.into(),
            column_id: column_id.into(),
            title: title.into(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            labels: Vec::new(),
            due_date: None,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

/// Partial update to a task; `None` fields are left unchanged
///
/// `completed_at` is doubly optional so an update can clear it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub labels: Option<Vec<String>>,
    pub due_date: Option<NaiveDate>,
    pub completed_at: Option<Option<DateTime<Local>>>,
    pub deleted_at: Option<DateTime<Local>>,
    pub updated_at: DateTime<Local>,
}

impl TaskUpdate {
    /// An update that changes nothing but `updated_at`
    pub fn touch(now: DateTime<Local>) -> Self {
        Self {
            title: None,
            status: None,
            priority: None,
            labels: None,
            due_date: None,
            completed_at: None,
            deleted_at: None,
            updated_at: now,
        }
    }

    /// Soft delete: mark the task deleted without removing the row
    pub fn soft_delete(now: DateTime<Local>) -> Self {
        Self {
            status: Some(TaskStatus::Deleted),
            deleted_at: Some(now),
            ..Self::touch(now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::Medium < TaskPriority::High);
        assert!(TaskPriority::High < TaskPriority::Critical);
    }

    #[test]
    fn test_render_order_is_most_urgent_first() {
        assert_eq!(TaskPriority::RENDER_ORDER[0], TaskPriority::Critical);
        assert_eq!(TaskPriority::RENDER_ORDER[3], TaskPriority::Low);
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("in_progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!(TaskStatus::Completed.to_string(), "COMPLETED");
        assert!("nope".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let status: TaskStatus = serde_json::from_str("\"DELETED\"").unwrap();
        assert_eq!(status, TaskStatus::Deleted);
    }

    #[test]
    fn test_from_new_sets_completed_at_for_completed() {
        let now = Local::now();
        let task = Task::from_new(
            "t1".to_string(),
            NewTask::new("b", "c", "Ship it").with_status(TaskStatus::Completed),
            now,
        );
        assert_eq!(task.completed_at, Some(now));
        assert!(task.deleted_at.is_none());
    }

    #[test]
    fn test_soft_delete_update() {
        let now = Local::now();
        let mut task = Task::from_new("t1".to_string(), NewTask::new("b", "c", "Old"), now);
        task.apply(&TaskUpdate::soft_delete(now));
        assert_eq!(task.status, TaskStatus::Deleted);
        assert_eq!(task.deleted_at, Some(now));
        assert!(task.is_deleted());
    }

    #[test]
    fn test_update_can_clear_completed_at() {
        let now = Local::now();
        let mut task = Task::from_new(
            "t1".to_string(),
            NewTask::new("b", "c", "Reopen").with_status(TaskStatus::Completed),
            now,
        );
        task.apply(&TaskUpdate {
            status: Some(TaskStatus::Todo),
            completed_at: Some(None),
            ..TaskUpdate::touch(now)
        });
        assert_eq!(task.status, TaskStatus::Todo);
        assert!(task.completed_at.is_none());
    }
}
