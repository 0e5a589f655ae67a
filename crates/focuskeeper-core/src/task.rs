//! Task records and the Task Store collaborator.
//!
//! The engine never owns tasks. It reads them by value through [`TaskStore`]
//! and writes back only status changes and snoozed start times.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};

pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    pub added_at: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub last_overdue_alert_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start_time: None,
            end_time: None,
            estimated_minutes: None,
            added_at,
            status: TaskStatus::NotStarted,
            last_overdue_alert_at: None,
        }
    }

    /// When the task should be done: `end_time`, else `added_at + estimated_minutes`.
    ///
    /// `None` means the task carries no deadline data and is never watched.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.end_time.or_else(|| {
            self.estimated_minutes
                .map(|mins| self.added_at + Duration::minutes(i64::from(mins)))
        })
    }
}

/// Read/write access to tasks owned elsewhere.
pub trait TaskStore: Send + Sync {
    fn get_task(&self, id: &str) -> Option<Task>;

    fn get_all_in_progress(&self) -> Vec<Task>;

    fn update_status(&self, id: &str, status: TaskStatus) -> Result<()>;

    /// Move a task's start time (used by snooze).
    fn reschedule(&self, id: &str, start_time: DateTime<Utc>) -> Result<()>;

    /// Remember when the last overdue alert went out.
    fn record_overdue_alert(&self, _id: &str, _at: DateTime<Utc>) -> Result<()> {
        Ok(()) // default no-op
    }
}

/// HashMap-backed store used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, task: Task) {
        self.lock().insert(task.id.clone(), task);
    }

    pub fn remove(&self, id: &str) -> Option<Task> {
        self.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TaskStore for InMemoryTaskStore {
    fn get_task(&self, id: &str) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    fn get_all_in_progress(&self) -> Vec<Task> {
        self.lock()
            .values()
            .filter(|t| t.status == TaskStatus::InProgress)
            .cloned()
            .collect()
    }

    fn update_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let mut tasks = self.lock();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))?;
        task.status = status;
        Ok(())
    }

    fn reschedule(&self, id: &str, start_time: DateTime<Utc>) -> Result<()> {
        let mut tasks = self.lock();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| ValidationError::UnknownTask(id.to_string()))?;
        task.start_time = Some(start_time);
        Ok(())
    }

    fn record_overdue_alert(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(task) = self.lock().get_mut(id) {
            task.last_overdue_alert_at = Some(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_prefers_end_time() {
        let added = Utc::now();
        let mut task = Task::new("t1", "Write report", added);
        task.estimated_minutes = Some(30);
        assert_eq!(task.deadline(), Some(added + Duration::minutes(30)));

        let end = added + Duration::minutes(90);
        task.end_time = Some(end);
        assert_eq!(task.deadline(), Some(end));
    }

    #[test]
    fn no_deadline_without_end_or_estimate() {
        let task = Task::new("t1", "Open ended", Utc::now());
        assert!(task.deadline().is_none());
    }

    #[test]
    fn store_filters_in_progress() {
        let store = InMemoryTaskStore::new();
        let now = Utc::now();
        let mut a = Task::new("a", "A", now);
        a.status = TaskStatus::InProgress;
        store.upsert(a);
        store.upsert(Task::new("b", "B", now));

        let active = store.get_all_in_progress();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
    }

    #[test]
    fn update_unknown_task_fails() {
        let store = InMemoryTaskStore::new();
        assert!(store.update_status("missing", TaskStatus::Completed).is_err());
    }
}
