//! # FocusKeeper Core Library
//!
//! Task timing and focus enforcement for a single local user. All operations
//! are available through the `focuskeeper` CLI binary, which is a thin shell
//! over this library.
//!
//! ## Architecture
//!
//! - **Session Ledger**: the one running timer (focus or break) and the
//!   history of completed sessions
//! - **Reminder Scheduler**: one-shot pre-start reminders and a periodic
//!   overdue sweep over in-progress tasks
//! - **Cycle Engine**: a wall-clock Pomodoro state machine that requires the
//!   caller to periodically invoke `tick()`
//! - **Focus Guard**: foreground polling, allow/deny rules, a grace countdown
//!   and the distraction log
//! - **Storage**: SQLite session and distraction history, TOML configuration
//!
//! ## Key Components
//!
//! - [`SessionLedger`]: single-active-timer invariant
//! - [`ReminderScheduler`]: reminders and overdue alerts
//! - [`CycleEngine`]: Pomodoro cycle
//! - [`FocusGuard`]: distraction detection and auto-pause
//! - [`FocusKeeper`]: wires the above together and drives them on tokio

pub mod clock;
pub mod cycle;
pub mod error;
pub mod events;
pub mod focus;
pub mod ledger;
pub mod notify;
pub mod reminder;
pub mod runtime;
pub mod storage;
pub mod task;
pub mod timer_handle;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use cycle::{CycleEngine, CyclePhase, CycleState};
pub use error::{
    ConfigError, CoreError, DatabaseError, NotifyError, ProbeError, ValidationError,
};
pub use events::{Event, EventBus};
pub use focus::{
    CommandProbe, DistractionKind, DistractionLog, DistractionLogEntry, FocusGuard,
    ForegroundProbe, ForegroundTarget, GraceCountdown, InMemoryDistractionLog, PatternList,
    PollOutcome, ScriptedProbe, TargetKind, WildcardPattern,
};
pub use ledger::{ActiveSession, CompletedSession, SessionKind, SessionLedger, SessionSink};
pub use notify::{
    Delivery, MutedGateway, NotificationGateway, NotificationKind, NotificationPayload,
    QuietHoursGateway, QuietHoursPolicy, TracingGateway,
};
pub use reminder::{OverdueWatch, ReminderScheduler, ScheduledReminder};
pub use runtime::{FocusKeeper, FocusKeeperBuilder, RuntimeHandle};
pub use storage::{Config, Database, Stats};
pub use task::{InMemoryTaskStore, Task, TaskId, TaskStatus, TaskStore};
pub use timer_handle::TimerHandle;
