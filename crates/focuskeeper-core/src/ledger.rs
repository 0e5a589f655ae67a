//! Session ledger: the single source of truth for the running timer.
//!
//! ## State Transitions
//!
//! ```text
//! None -> Focus | Break -> None
//! ```
//!
//! Starting a session while another is active always ends the prior one first,
//! through [`SessionLedger::end_current`]. That call is the only place a
//! session is ever closed, so the Pomodoro engine, the focus guard and
//! task-level pauses all agree on what happened.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::{CoreError, Result};
use crate::events::{Event, EventBus};
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Focus,
    Break,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionKind::Focus => "focus",
            SessionKind::Break => "break",
        }
    }
}

/// The one running timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub kind: SessionKind,
    pub task_id: Option<TaskId>,
    pub started_at: DateTime<Utc>,
    pub is_pomodoro: bool,
    pub is_long_break: bool,
}

/// Immutable history record produced when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    pub kind: SessionKind,
    pub task_id: Option<TaskId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_minutes: u64,
    #[serde(default)]
    pub is_pomodoro: bool,
    #[serde(default)]
    pub is_long_break: bool,
}

/// Durable destination for completed sessions.
pub trait SessionSink: Send + Sync {
    fn record_session(&self, record: &CompletedSession) -> Result<()>;
}

#[derive(Debug, Default)]
struct LedgerState {
    active: Option<ActiveSession>,
    history: Vec<CompletedSession>,
}

pub struct SessionLedger {
    state: Mutex<LedgerState>,
    clock: SharedClock,
    bus: EventBus,
    sink: Option<Arc<dyn SessionSink>>,
}

impl SessionLedger {
    pub fn new(clock: SharedClock, bus: EventBus) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            clock,
            bus,
            sink: None,
        }
    }

    /// Forward every completed session to `sink` as well as keeping it in memory.
    pub fn with_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn current(&self) -> Option<ActiveSession> {
        self.lock().active.clone()
    }

    pub fn history(&self) -> Vec<CompletedSession> {
        self.lock().history.clone()
    }

    /// Whether `task_id` owns the running session.
    pub fn is_task_active(&self, task_id: &str) -> bool {
        owned_by(&self.lock(), task_id)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start_focus(&self, task_id: Option<TaskId>, is_pomodoro: bool) -> ActiveSession {
        self.start(SessionKind::Focus, task_id, is_pomodoro, false)
    }

    pub fn start_break(&self, is_pomodoro: bool, is_long_break: bool) -> ActiveSession {
        self.start(SessionKind::Break, None, is_pomodoro, is_long_break)
    }

    /// Close the running session, if any, and return its record.
    pub fn end_current(&self) -> Option<CompletedSession> {
        let mut state = self.lock();
        self.end_locked(&mut state)
    }

    /// Close the running session only if `pred` accepts it.
    pub fn end_current_if(
        &self,
        pred: impl FnOnce(&ActiveSession) -> bool,
    ) -> Option<CompletedSession> {
        let mut state = self.lock();
        if !state.active.as_ref().is_some_and(pred) {
            return None;
        }
        self.end_locked(&mut state)
    }

    /// Run `f` unless `task_id` owns the running session.
    ///
    /// The ledger stays locked while `f` runs, so no session for the task can
    /// start in between. `f` must not call back into the ledger.
    ///
    /// # Errors
    /// [`CoreError::ActiveSessionInProgress`] when the task owns the session.
    pub fn ensure_not_owned<R>(&self, task_id: &str, f: impl FnOnce() -> R) -> Result<R> {
        let state = self.lock();
        if owned_by(&state, task_id) {
            return Err(CoreError::ActiveSessionInProgress {
                task_id: task_id.to_string(),
            });
        }
        let out = f();
        drop(state);
        Ok(out)
    }

    fn start(
        &self,
        kind: SessionKind,
        task_id: Option<TaskId>,
        is_pomodoro: bool,
        is_long_break: bool,
    ) -> ActiveSession {
        let mut state = self.lock();
        self.end_locked(&mut state);

        let session = ActiveSession {
            kind,
            task_id,
            started_at: self.clock.now(),
            is_pomodoro,
            is_long_break,
        };
        tracing::info!(kind = kind.as_str(), task_id = ?session.task_id, is_pomodoro, "session started");
        state.active = Some(session.clone());
        self.bus.publish(Event::SessionStarted {
            session: session.clone(),
        });
        session
    }

    fn end_locked(&self, state: &mut LedgerState) -> Option<CompletedSession> {
        let active = state.active.take()?;
        let ended_at = self.clock.now();
        let record = CompletedSession {
            id: uuid::Uuid::new_v4().to_string(),
            kind: active.kind,
            task_id: active.task_id,
            started_at: active.started_at,
            ended_at,
            duration_minutes: rounded_minutes(active.started_at, ended_at),
            is_pomodoro: active.is_pomodoro,
            is_long_break: active.is_long_break,
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record_session(&record) {
                tracing::warn!(session_id = %record.id, "failed to persist session: {e}");
            }
        }

        tracing::info!(
            kind = record.kind.as_str(),
            duration_minutes = record.duration_minutes,
            "session ended"
        );
        state.history.push(record.clone());
        self.bus.publish(Event::SessionEnded {
            record: record.clone(),
        });
        self.bus.publish(match record.kind {
            SessionKind::Focus => Event::FocusSessionEnded {
                record: record.clone(),
            },
            SessionKind::Break => Event::BreakSessionEnded {
                record: record.clone(),
            },
        });
        Some(record)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn owned_by(state: &LedgerState, task_id: &str) -> bool {
    state
        .active
        .as_ref()
        .and_then(|s| s.task_id.as_deref())
        .is_some_and(|id| id == task_id)
}

fn rounded_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let ms = (end - start).num_milliseconds().max(0);
    (ms as f64 / 60_000.0).round() as u64
}
