//! File→database reconciliation
//!
//! [`Reconciler::plan`] is pure: it decides what to create, update and
//! soft-delete, and the orchestrator applies the result. Parsed tasks are
//! matched to live database tasks by exact title first. Parsed tasks left
//! over are then matched against the title as the generator would have
//! written it, so a stored title the sanitizer rewrites keeps its identity.
//! Each database task matches at most once, so duplicate titles pair up in
//! creation order instead of all collapsing onto the first.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use taskstore::{NewTask, Task, TaskPriority, TaskStatus, TaskUpdate};
use tracing::debug;

use super::resolver::{ConflictResolver, FieldConflict, TaskFields};
use super::state::ChangeCounts;
use super::types::ConflictPolicy;
use crate::markdown::{ParsedTask, Sanitizer, clean_title, section_priority};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub id: String,
    pub title: String,
    pub update: TaskUpdate,
    /// Fields after the update is applied
    pub fields: TaskFields,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub creates: Vec<NewTask>,
    pub updates: Vec<PlannedUpdate>,
    /// Ids of live tasks no longer present in the file
    pub deletes: Vec<String>,
    pub conflicts: Vec<FieldConflict>,
    /// Ids of tasks with a conflict left for a human
    pub contested: Vec<String>,
    /// Matched tasks that need no write, with their agreed fields
    pub unchanged: Vec<(String, TaskFields)>,
}

impl ReconcilePlan {
    pub fn counts(&self) -> ChangeCounts {
        ChangeCounts {
            created: self.creates.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts().changed() == 0
    }

    pub fn unresolved_conflicts(&self) -> usize {
        self.conflicts.iter().filter(|c| c.is_unresolved()).count()
    }
}

pub struct Reconciler<'a> {
    pub board_id: &'a str,
    pub column_id: &'a str,
    pub resolver: &'a dyn ConflictResolver,
    pub policy: ConflictPolicy,
    /// Sanitizer the generator writes titles through
    pub sanitizer: &'a dyn Sanitizer,
    /// Last fields both sides agreed on, keyed by task id
    pub base: &'a HashMap<String, TaskFields>,
}

impl Reconciler<'_> {
    pub fn plan(&self, parsed: &[ParsedTask], existing: &[Task], now: DateTime<Local>) -> ReconcilePlan {
        debug!(
            parsed = parsed.len(),
            existing = existing.len(),
            "Reconciler::plan: called"
        );
        let live: Vec<&Task> = existing.iter().filter(|t| !t.is_deleted()).collect();
        let mut matched = vec![false; live.len()];
        let mut assigned: Vec<Option<usize>> = vec![None; parsed.len()];
        let mut plan = ReconcilePlan::default();

        for (p, task) in parsed.iter().enumerate() {
            if task.title.is_empty() {
                continue;
            }
            if let Some(i) = (0..live.len()).find(|&i| !matched[i] && live[i].title == task.title) {
                matched[i] = true;
                assigned[p] = Some(i);
            }
        }

        let written: Vec<String> = live.iter().map(|t| self.sanitizer.sanitize_title(&t.title)).collect();
        for (p, task) in parsed.iter().enumerate() {
            if task.title.is_empty() || assigned[p].is_some() {
                continue;
            }
            let hit = (0..live.len())
                .find(|&i| !matched[i] && (written[i] == task.title || clean_title(&written[i]) == task.title));
            if let Some(i) = hit {
                debug!(id = %live[i].id, title = %task.title, "Reconciler::plan: matched by written title");
                matched[i] = true;
                assigned[p] = Some(i);
            }
        }

        for (task, slot) in parsed.iter().zip(&assigned) {
            if task.title.is_empty() {
                debug!(line = task.line_number, "Reconciler::plan: skipping task with empty title");
                continue;
            }
            match slot {
                Some(i) => self.plan_match(task, live[*i], now, &mut plan),
                None => plan.creates.push(self.new_task(task)),
            }
        }

        plan.deletes = live
            .iter()
            .zip(&matched)
            .filter(|(_, m)| !**m)
            .map(|(t, _)| t.id.clone())
            .collect();

        debug!(
            created = plan.creates.len(),
            updated = plan.updates.len(),
            deleted = plan.deletes.len(),
            conflicts = plan.conflicts.len(),
            "Reconciler::plan: done"
        );
        plan
    }

    fn plan_match(&self, parsed: &ParsedTask, existing: &Task, now: DateTime<Local>, plan: &mut ReconcilePlan) {
        let db_version = TaskFields::from(existing);
        let file_version = TaskFields {
            status: status_of(parsed),
            priority: priority_of(parsed).unwrap_or(existing.priority),
            labels: parsed.metadata.tags.clone(),
            due_date: parsed.metadata.due().or(existing.due_date),
        };

        let resolution = self.resolver.resolve(
            self.base.get(&existing.id),
            &file_version,
            &db_version,
            self.policy,
        );
        if resolution.unresolved_count() > 0 {
            plan.contested.push(existing.id.clone());
        }
        plan.conflicts.extend(resolution.conflicts);
        let resolved = resolution.resolved;

        match diff(existing, &db_version, &resolved, now) {
            Some(update) => plan.updates.push(PlannedUpdate {
                id: existing.id.clone(),
                title: existing.title.clone(),
                update,
                fields: resolved,
            }),
            None => plan.unchanged.push((existing.id.clone(), resolved)),
        }
    }

    fn new_task(&self, parsed: &ParsedTask) -> NewTask {
        let mut new = NewTask::new(self.board_id, self.column_id, parsed.title.clone())
            .with_status(status_of(parsed))
            .with_priority(priority_of(parsed).unwrap_or_default())
            .with_labels(parsed.metadata.tags.clone());
        new.due_date = parsed.metadata.due();
        new
    }
}

/// Checkbox state as a task status
pub fn status_of(task: &ParsedTask) -> TaskStatus {
    if task.checked {
        TaskStatus::Completed
    } else if task.in_progress {
        TaskStatus::InProgress
    } else {
        TaskStatus::Todo
    }
}

/// Inline `priority:` token first, then the section heading
pub fn priority_of(task: &ParsedTask) -> Option<TaskPriority> {
    task.metadata
        .priority
        .map(TaskPriority::from)
        .or_else(|| task.section.as_deref().and_then(section_priority))
}

fn diff(existing: &Task, current: &TaskFields, resolved: &TaskFields, now: DateTime<Local>) -> Option<TaskUpdate> {
    if current == resolved {
        return None;
    }

    let mut update = TaskUpdate::touch(now);
    if resolved.status != current.status {
        update.status = Some(resolved.status);
        if resolved.status == TaskStatus::Completed && existing.completed_at.is_none() {
            update.completed_at = Some(Some(now));
        } else if resolved.status != TaskStatus::Completed && existing.completed_at.is_some() {
            update.completed_at = Some(None);
        }
    }
    if resolved.priority != current.priority {
        update.priority = Some(resolved.priority);
    }
    if resolved.labels != current.labels {
        update.labels = Some(resolved.labels.clone());
    }
    if resolved.due_date != current.due_date {
        update.due_date = resolved.due_date;
    }
    Some(update)
}
