//! Pre-start reminders and the overdue sweep.
//!
//! Reminders are one-shot: each task has at most one armed reminder, which
//! fires once when `fire_at` passes and then disarms. Overdue checks are not
//! per-task timers. A single sweep walks the watch table every
//! `sweep_interval_secs`, so the number of live timers stays bounded however
//! many tasks are in progress.
//!
//! Like the Pomodoro engine, the scheduler owns no thread. The caller invokes
//! [`ReminderScheduler::tick`] periodically (the runtime does so at 1 Hz).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::{Result, ValidationError};
use crate::events::{Event, EventBus};
use crate::notify::{send_logged, NotificationGateway, NotificationKind, NotificationPayload};
use crate::storage::ReminderConfig;
use crate::task::{Task, TaskId, TaskStatus, TaskStore};
use crate::timer_handle::TimerHandle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub task_id: TaskId,
    pub fire_at: DateTime<Utc>,
    pub handle: TimerHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueWatch {
    pub task_id: TaskId,
    pub deadline: DateTime<Utc>,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub handle: TimerHandle,
}

#[derive(Debug, Default)]
struct SchedulerState {
    reminders: HashMap<TaskId, ScheduledReminder>,
    watches: HashMap<TaskId, OverdueWatch>,
    last_sweep_at: Option<DateTime<Utc>>,
}

pub struct ReminderScheduler {
    state: Mutex<SchedulerState>,
    config: ReminderConfig,
    store: Arc<dyn TaskStore>,
    gateway: Arc<dyn NotificationGateway>,
    bus: EventBus,
    clock: SharedClock,
}

impl ReminderScheduler {
    pub fn new(
        config: ReminderConfig,
        store: Arc<dyn TaskStore>,
        gateway: Arc<dyn NotificationGateway>,
        bus: EventBus,
        clock: SharedClock,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            config,
            store,
            gateway,
            bus,
            clock,
        }
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn reminder_for(&self, task_id: &str) -> Option<ScheduledReminder> {
        self.lock().reminders.get(task_id).cloned()
    }

    pub fn watch_for(&self, task_id: &str) -> Option<OverdueWatch> {
        self.lock().watches.get(task_id).cloned()
    }

    pub fn is_watching(&self, task_id: &str) -> bool {
        self.lock().watches.contains_key(task_id)
    }

    pub fn live_reminder_count(&self) -> usize {
        self.lock().reminders.len()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm whatever timers `task` currently calls for.
    ///
    /// A reminder whose fire time has already passed is skipped without error.
    pub fn register_task(&self, task: &Task) {
        let now = self.clock.now();
        let mut state = self.lock();

        if task.status == TaskStatus::Completed {
            state.reminders.remove(&task.id);
            state.watches.remove(&task.id);
            return;
        }

        if let Some(start) = task.start_time {
            let fire_at = start - self.lead();
            if fire_at > now {
                let reminder = ScheduledReminder {
                    task_id: task.id.clone(),
                    fire_at,
                    handle: TimerHandle::next(),
                };
                tracing::debug!(task_id = %task.id, %fire_at, "reminder armed");
                state.reminders.insert(task.id.clone(), reminder);
            } else {
                tracing::debug!(task_id = %task.id, "reminder time already passed, not armed");
                state.reminders.remove(&task.id);
            }
        }

        if task.status == TaskStatus::InProgress {
            Self::arm_watch(&mut state, task);
        } else {
            state.watches.remove(&task.id);
        }
    }

    /// Register every in-progress task from the store. Used at startup.
    pub fn sync_in_progress(&self) {
        for task in self.store.get_all_in_progress() {
            self.register_task(&task);
        }
    }

    /// Cancel every timer for `task_id`. Returns whether anything was armed.
    pub fn remove_task(&self, task_id: &str) -> bool {
        let mut state = self.lock();
        let had_reminder = state.reminders.remove(task_id).is_some();
        let had_watch = state.watches.remove(task_id).is_some();
        had_reminder || had_watch
    }

    pub fn cancel_reminder(&self, task_id: &str) -> Option<ScheduledReminder> {
        self.lock().reminders.remove(task_id)
    }

    /// Write `status` through to the store and adjust timers to match.
    pub fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<()> {
        self.store.update_status(task_id, status)?;

        let mut state = self.lock();
        match status {
            TaskStatus::Completed => {
                state.reminders.remove(task_id);
                state.watches.remove(task_id);
            }
            TaskStatus::InProgress => {
                if !state.watches.contains_key(task_id) {
                    if let Some(task) = self.store.get_task(task_id) {
                        Self::arm_watch(&mut state, &task);
                    }
                }
            }
            TaskStatus::NotStarted | TaskStatus::Paused => {
                state.watches.remove(task_id);
            }
        }
        tracing::info!(task_id, %status, "task status changed");
        Ok(())
    }

    /// Push the reminder `minutes` into the future.
    ///
    /// The old reminder is cancelled and the task's start time moved so that
    /// the new reminder fires exactly `minutes` from now.
    pub fn snooze(&self, task_id: &str, minutes: u32) -> Result<Option<ScheduledReminder>> {
        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| ValidationError::UnknownTask(task_id.to_string()))?;

        self.cancel_reminder(task_id);
        let start_time = self.clock.now() + Duration::minutes(i64::from(minutes)) + self.lead();
        self.store.reschedule(task_id, start_time)?;
        task.start_time = Some(start_time);
        self.register_task(&task);

        tracing::info!(task_id, minutes, "reminder snoozed");
        Ok(self.reminder_for(task_id))
    }

    /// Fire due reminders and, when the sweep interval has elapsed, overdue alerts.
    pub fn tick(&self) {
        let now = self.clock.now();
        let mut state = self.lock();

        let due: Vec<TaskId> = state
            .reminders
            .values()
            .filter(|r| r.fire_at <= now)
            .map(|r| r.task_id.clone())
            .collect();
        for task_id in due {
            state.reminders.remove(&task_id);
            self.fire_reminder(&task_id, now);
        }

        let sweep_due = state.last_sweep_at.map_or(true, |last| {
            now - last >= Duration::seconds(self.config.sweep_interval_secs as i64)
        });
        if sweep_due {
            state.last_sweep_at = Some(now);
            self.sweep_overdue(&mut state, now);
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn lead(&self) -> Duration {
        Duration::minutes(i64::from(self.config.lead_minutes))
    }

    fn arm_watch(state: &mut SchedulerState, task: &Task) {
        let Some(deadline) = task.deadline() else {
            tracing::debug!(task_id = %task.id, "no deadline data, not watched");
            state.watches.remove(&task.id);
            return;
        };
        let last_alert_at = state
            .watches
            .get(&task.id)
            .and_then(|w| w.last_alert_at)
            .max(task.last_overdue_alert_at);
        state.watches.insert(
            task.id.clone(),
            OverdueWatch {
                task_id: task.id.clone(),
                deadline,
                last_alert_at,
                handle: TimerHandle::next(),
            },
        );
    }

    fn fire_reminder(&self, task_id: &str, now: DateTime<Utc>) {
        let Some(task) = self.store.get_task(task_id) else {
            return;
        };
        if task.status == TaskStatus::Completed {
            return;
        }

        let payload = NotificationPayload::new(
            "Upcoming task",
            format!("{} starts in {} min", task.title, self.config.lead_minutes),
        )
        .for_task(task_id);
        send_logged(self.gateway.as_ref(), NotificationKind::TaskReminder, &payload);

        tracing::info!(task_id, "reminder fired");
        self.bus.publish(Event::ReminderFired {
            task_id: task_id.to_string(),
            at: now,
        });
    }

    fn sweep_overdue(&self, state: &mut SchedulerState, now: DateTime<Utc>) {
        let interval = Duration::minutes(i64::from(self.config.alert_interval_minutes));

        for watch in state.watches.values_mut() {
            if now < watch.deadline {
                continue;
            }
            if watch.last_alert_at.is_some_and(|last| now - last < interval) {
                continue;
            }

            let minutes_overdue = (now - watch.deadline).num_minutes();
            let title = self
                .store
                .get_task(&watch.task_id)
                .map(|t| t.title)
                .unwrap_or_else(|| watch.task_id.clone());
            let payload = NotificationPayload::new(
                "Task overdue",
                format!("{title} is {minutes_overdue} min past its deadline"),
            )
            .for_task(watch.task_id.clone());
            send_logged(self.gateway.as_ref(), NotificationKind::TaskOverdue, &payload);

            watch.last_alert_at = Some(now);
            if let Err(e) = self.store.record_overdue_alert(&watch.task_id, now) {
                tracing::warn!(task_id = %watch.task_id, "failed to record overdue alert: {e}");
            }

            tracing::info!(task_id = %watch.task_id, minutes_overdue, "overdue alert");
            self.bus.publish(Event::OverdueFired {
                task_id: watch.task_id.clone(),
                minutes_overdue,
                at: now,
            });
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
