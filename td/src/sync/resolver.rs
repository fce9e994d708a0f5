//! Conflict resolvers for matched tasks
//!
//! A file→database pass hands every title-matched task to a resolver along
//! with the fields both sides last agreed on (if known). Only the fields the
//! TODO file can express take part.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use taskstore::{Task, TaskPriority, TaskStatus};

use super::types::{ConflictPolicy, SyncStrategy};

/// The mergeable view of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub labels: Vec<String>,
    pub due_date: Option<NaiveDate>,
}

impl From<&Task> for TaskFields {
    fn from(task: &Task) -> Self {
        Self {
            status: task.status,
            priority: task.priority,
            labels: task.labels.clone(),
            due_date: task.due_date,
        }
    }
}

/// A field changed on both sides since the base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub file_value: String,
    pub db_value: String,
    /// Policy that settled it; `Manual` means it is still open
    pub policy: ConflictPolicy,
}

impl FieldConflict {
    pub fn is_unresolved(&self) -> bool {
        self.policy == ConflictPolicy::Manual
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: TaskFields,
    pub conflicts: Vec<FieldConflict>,
}

impl Resolution {
    fn clean(resolved: TaskFields) -> Self {
        Self {
            resolved,
            conflicts: Vec::new(),
        }
    }

    pub fn unresolved_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.is_unresolved()).count()
    }
}

pub trait ConflictResolver: Send + Sync {
    fn resolve(
        &self,
        base: Option<&TaskFields>,
        file_version: &TaskFields,
        db_version: &TaskFields,
        policy: ConflictPolicy,
    ) -> Resolution;
}

/// Resolver for a configured strategy
pub fn resolver_for(strategy: SyncStrategy) -> Arc<dyn ConflictResolver> {
    match strategy {
        SyncStrategy::FileWins => Arc::new(FileWinsResolver),
        SyncStrategy::DbWins => Arc::new(DbWinsResolver),
        SyncStrategy::Merge => Arc::new(ThreeWayMergeResolver),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileWinsResolver;

impl ConflictResolver for FileWinsResolver {
    fn resolve(&self, _: Option<&TaskFields>, file: &TaskFields, _: &TaskFields, _: ConflictPolicy) -> Resolution {
        Resolution::clean(file.clone())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DbWinsResolver;

impl ConflictResolver for DbWinsResolver {
    fn resolve(&self, _: Option<&TaskFields>, _: &TaskFields, db: &TaskFields, _: ConflictPolicy) -> Resolution {
        Resolution::clean(db.clone())
    }
}

/// Field-by-field three-way merge
///
/// A field changed on one side only takes that side. A field changed on both
/// sides (or any difference when there is no base) goes to the policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeWayMergeResolver;

impl ConflictResolver for ThreeWayMergeResolver {
    fn resolve(
        &self,
        base: Option<&TaskFields>,
        file: &TaskFields,
        db: &TaskFields,
        policy: ConflictPolicy,
    ) -> Resolution {
        let mut conflicts = Vec::new();
        let resolved = TaskFields {
            status: merge_field("status", base.map(|b| &b.status), &file.status, &db.status, policy, &mut conflicts),
            priority: merge_field(
                "priority",
                base.map(|b| &b.priority),
                &file.priority,
                &db.priority,
                policy,
                &mut conflicts,
            ),
            labels: merge_field("labels", base.map(|b| &b.labels), &file.labels, &db.labels, policy, &mut conflicts),
            due_date: merge_field(
                "due_date",
                base.map(|b| &b.due_date),
                &file.due_date,
                &db.due_date,
                policy,
                &mut conflicts,
            ),
        };
        Resolution { resolved, conflicts }
    }
}

fn merge_field<T: Clone + PartialEq + fmt::Debug>(
    name: &str,
    base: Option<&T>,
    file: &T,
    db: &T,
    policy: ConflictPolicy,
    conflicts: &mut Vec<FieldConflict>,
) -> T {
    if file == db {
        return file.clone();
    }
    match base {
        Some(base) if base == file => return db.clone(),
        Some(base) if base == db => return file.clone(),
        _ => {}
    }

    conflicts.push(FieldConflict {
        field: name.to_string(),
        file_value: format!("{:?}", file),
        db_value: format!("{:?}", db),
        policy,
    });
    match policy {
        ConflictPolicy::PreferFile => file.clone(),
        ConflictPolicy::PreferDb | ConflictPolicy::Manual => db.clone(),
    }
}
