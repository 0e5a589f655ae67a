//! Pomodoro cycle engine.
//!
//! A wall-clock state machine with no internal thread. The caller invokes
//! [`CycleEngine::tick`] periodically; elapsed wall time since the previous
//! tick is flushed into the countdown, so a late tick never loses time.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Work -> (1 s) -> Break -> Break (stopped) -> Work ...
//! ```
//!
//! Work is never started automatically. After a break completes the engine
//! sits in the break phase, not running, until `start_work` is called.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::events::{Event, EventBus};
use crate::ledger::SessionLedger;
use crate::storage::PomodoroConfig;
use crate::task::TaskId;
use crate::timer_handle::TimerHandle;

/// Delay between a work phase completing and its break starting.
const BREAK_DELAY_MS: i64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Idle,
    Work,
    Break,
}

impl CyclePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Work => "work",
            CyclePhase::Break => "break",
        }
    }
}

/// Snapshot of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    pub phase: CyclePhase,
    /// Completed work phases since the last reset.
    pub cycle_count: u32,
    pub remaining_seconds: u64,
    pub paused: bool,
    pub running: bool,
    pub is_long_break: bool,
    pub active_task_id: Option<TaskId>,
}

#[derive(Debug, Clone)]
struct PendingBreak {
    start_at: DateTime<Utc>,
    is_long_break: bool,
    handle: TimerHandle,
}

#[derive(Debug)]
struct Inner {
    config: PomodoroConfig,
    phase: CyclePhase,
    cycle_count: u32,
    remaining_ms: u64,
    paused: bool,
    running: bool,
    is_long_break: bool,
    active_task_id: Option<TaskId>,
    /// Set while the countdown is advancing.
    last_tick_at: Option<DateTime<Utc>>,
    pending_break: Option<PendingBreak>,
}

pub struct CycleEngine {
    inner: Mutex<Inner>,
    ledger: Arc<SessionLedger>,
    bus: EventBus,
    clock: SharedClock,
}

impl CycleEngine {
    pub fn new(
        config: PomodoroConfig,
        ledger: Arc<SessionLedger>,
        bus: EventBus,
        clock: SharedClock,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                phase: CyclePhase::Idle,
                cycle_count: 0,
                remaining_ms: 0,
                paused: false,
                running: false,
                is_long_break: false,
                active_task_id: None,
                last_tick_at: None,
                pending_break: None,
            }),
            ledger,
            bus,
            clock,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> CycleState {
        let inner = self.lock();
        CycleState {
            phase: inner.phase,
            cycle_count: inner.cycle_count,
            remaining_seconds: inner.remaining_ms.div_ceil(1000),
            paused: inner.paused,
            running: inner.running,
            is_long_break: inner.is_long_break,
            active_task_id: inner.active_task_id.clone(),
        }
    }

    pub fn config(&self) -> PomodoroConfig {
        self.lock().config.clone()
    }

    /// Whether a break is waiting out its start delay.
    pub fn has_pending_break(&self) -> bool {
        self.lock().pending_break.is_some()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a work phase, superseding whatever was running.
    pub fn start_work(&self, task_id: Option<TaskId>) -> Event {
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.pending_break = None;
        inner.phase = CyclePhase::Work;
        inner.remaining_ms = minutes_ms(inner.config.work_duration);
        inner.running = true;
        inner.paused = false;
        inner.is_long_break = false;
        inner.active_task_id = task_id.clone();
        inner.last_tick_at = Some(now);

        self.ledger.start_focus(task_id, true);
        tracing::info!(cycle_count = inner.cycle_count, "work phase started");
        self.transition(&inner, now)
    }

    /// Advance the countdown. Returns the most significant event produced.
    pub fn tick(&self) -> Option<Event> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if let Some(pending) = inner.pending_break.clone() {
            if now >= pending.start_at {
                tracing::debug!(handle = pending.handle.id(), "pending break due");
                inner.pending_break = None;
                return Some(self.begin_break(&mut inner, pending.is_long_break, now));
            }
            return None;
        }

        if !inner.running || inner.paused {
            return None;
        }
        flush_elapsed(&mut inner, now);
        if inner.remaining_ms == 0 {
            return self.complete_locked(&mut inner, now);
        }
        None
    }

    /// Finish the current phase now, as if its countdown had run out.
    pub fn complete_current_phase(&self) -> Option<Event> {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.complete_locked(&mut inner, now)
    }

    pub fn pause(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        if !inner.running || inner.paused {
            return false;
        }
        flush_elapsed(&mut inner, now);
        inner.paused = true;
        inner.last_tick_at = None;

        let remaining_seconds = inner.remaining_ms.div_ceil(1000);
        tracing::info!(remaining_seconds, "cycle paused");
        self.bus.publish(Event::CyclePaused {
            remaining_seconds,
            at: now,
        });
        true
    }

    /// Unfreeze the countdown. If the phase's session was closed meanwhile
    /// (an auto-pause, for instance) a fresh one is opened.
    pub fn resume(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        if !inner.running || !inner.paused {
            return false;
        }
        inner.paused = false;
        inner.last_tick_at = Some(now);

        if self.ledger.current().is_none() {
            match inner.phase {
                CyclePhase::Work => {
                    self.ledger.start_focus(inner.active_task_id.clone(), true);
                }
                CyclePhase::Break => {
                    self.ledger.start_break(true, inner.is_long_break);
                }
                CyclePhase::Idle => {}
            }
        }

        let remaining_seconds = inner.remaining_ms.div_ceil(1000);
        tracing::info!(remaining_seconds, "cycle resumed");
        self.bus.publish(Event::CycleResumed {
            remaining_seconds,
            at: now,
        });
        true
    }

    /// Jump to the end of the current phase. During the break start delay the
    /// break begins immediately.
    pub fn skip(&self) -> Option<Event> {
        let now = self.clock.now();
        let mut inner = self.lock();
        if let Some(pending) = inner.pending_break.take() {
            return Some(self.begin_break(&mut inner, pending.is_long_break, now));
        }
        self.complete_locked(&mut inner, now)
    }

    /// Add time to the running or paused phase.
    pub fn extend(&self, minutes: u32) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        if !inner.running {
            return false;
        }
        if !inner.paused {
            flush_elapsed(&mut inner, now);
        }
        inner.remaining_ms = inner.remaining_ms.saturating_add(minutes_ms(minutes));
        tracing::info!(minutes, phase = inner.phase.as_str(), "phase extended");
        true
    }

    /// End the current session and go idle. `cycle_count` is kept.
    pub fn stop(&self) -> Event {
        let now = self.clock.now();
        let mut inner = self.lock();
        self.stop_locked(&mut inner, now)
    }

    /// Like [`stop`](Self::stop), and zero the cycle count.
    pub fn reset(&self) -> Event {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.cycle_count = 0;
        self.stop_locked(&mut inner, now)
    }

    /// Replace durations and cadence. The running countdown keeps its
    /// remaining time; new values apply from the next phase.
    pub fn set_config(&self, config: PomodoroConfig) {
        self.lock().config = config;
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete_locked(&self, inner: &mut Inner, now: DateTime<Utc>) -> Option<Event> {
        if !inner.running {
            return None;
        }
        match inner.phase {
            CyclePhase::Idle => None,
            CyclePhase::Work => {
                inner.cycle_count += 1;
                inner.running = false;
                inner.paused = false;
                inner.remaining_ms = 0;
                inner.last_tick_at = None;
                self.ledger.end_current();

                let every = inner.config.cycles_before_long_break;
                let is_long_break = every > 0 && inner.cycle_count % every == 0;
                inner.pending_break = Some(PendingBreak {
                    start_at: now + Duration::milliseconds(BREAK_DELAY_MS),
                    is_long_break,
                    handle: TimerHandle::next(),
                });

                tracing::info!(cycle_count = inner.cycle_count, is_long_break, "work phase complete");
                let event = Event::WorkComplete {
                    cycle_count: inner.cycle_count,
                    at: now,
                };
                self.bus.publish(event.clone());
                Some(event)
            }
            CyclePhase::Break => {
                inner.running = false;
                inner.paused = false;
                inner.remaining_ms = 0;
                inner.last_tick_at = None;
                self.ledger.end_current();

                tracing::info!(cycle_count = inner.cycle_count, "break complete");
                let event = Event::BreakComplete {
                    cycle_count: inner.cycle_count,
                    is_long_break: inner.is_long_break,
                    at: now,
                };
                self.bus.publish(event.clone());
                Some(event)
            }
        }
    }

    fn begin_break(&self, inner: &mut Inner, is_long_break: bool, now: DateTime<Utc>) -> Event {
        let minutes = if is_long_break {
            inner.config.long_break_duration
        } else {
            inner.config.break_duration
        };
        inner.phase = CyclePhase::Break;
        inner.is_long_break = is_long_break;
        inner.remaining_ms = minutes_ms(minutes);
        inner.running = true;
        inner.paused = false;
        inner.last_tick_at = Some(now);

        self.ledger.start_break(true, is_long_break);
        tracing::info!(is_long_break, minutes, "break started");
        self.transition(inner, now)
    }

    fn stop_locked(&self, inner: &mut Inner, now: DateTime<Utc>) -> Event {
        inner.pending_break = None;
        inner.phase = CyclePhase::Idle;
        inner.remaining_ms = 0;
        inner.running = false;
        inner.paused = false;
        inner.is_long_break = false;
        inner.active_task_id = None;
        inner.last_tick_at = None;

        self.ledger.end_current();
        tracing::info!(cycle_count = inner.cycle_count, "cycle stopped");
        self.transition(inner, now)
    }

    fn transition(&self, inner: &Inner, now: DateTime<Utc>) -> Event {
        let event = Event::CycleTransition {
            phase: inner.phase,
            cycle_count: inner.cycle_count,
            is_long_break: inner.is_long_break,
            at: now,
        };
        self.bus.publish(event.clone());
        event
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn flush_elapsed(inner: &mut Inner, now: DateTime<Utc>) {
    if let Some(last) = inner.last_tick_at {
        let elapsed = (now - last).num_milliseconds().max(0) as u64;
        inner.remaining_ms = inner.remaining_ms.saturating_sub(elapsed);
        inner.last_tick_at = Some(now);
    }
}

fn minutes_ms(minutes: u32) -> u64 {
    u64::from(minutes) * 60_000
}
