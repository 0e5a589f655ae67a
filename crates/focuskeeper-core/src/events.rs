use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::cycle::CyclePhase;
use crate::focus::{DistractionLogEntry, ForegroundTarget};
use crate::ledger::{ActiveSession, CompletedSession};
use crate::task::TaskId;

/// Every state change in the engine produces an Event.
/// The stats sink, the UI and the components themselves subscribe to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    ReminderFired {
        task_id: TaskId,
        at: DateTime<Utc>,
    },
    OverdueFired {
        task_id: TaskId,
        minutes_overdue: i64,
        at: DateTime<Utc>,
    },
    SessionStarted {
        session: ActiveSession,
    },
    SessionEnded {
        record: CompletedSession,
    },
    FocusSessionEnded {
        record: CompletedSession,
    },
    BreakSessionEnded {
        record: CompletedSession,
    },
    CycleTransition {
        phase: CyclePhase,
        cycle_count: u32,
        is_long_break: bool,
        at: DateTime<Utc>,
    },
    WorkComplete {
        cycle_count: u32,
        at: DateTime<Utc>,
    },
    BreakComplete {
        cycle_count: u32,
        is_long_break: bool,
        at: DateTime<Utc>,
    },
    CyclePaused {
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    CycleResumed {
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    GraceStarted {
        target: ForegroundTarget,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    GraceCancelled {
        at: DateTime<Utc>,
    },
    AutoPauseTriggered {
        entry: DistractionLogEntry,
    },
}

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of engine events to any number of subscribers.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// simply discarded, and slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        tracing::debug!(?event, "publish");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain whatever is currently buffered on a receiver.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => out.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(Event::GraceCancelled { at: Utc::now() });
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(Event::ReminderFired {
            task_id: "t1".into(),
            at: Utc::now(),
        });
        assert_eq!(drain(&mut a).len(), 1);
        assert_eq!(drain(&mut b).len(), 1);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(Event::GraceCancelled { at: Utc::now() }).unwrap();
        assert_eq!(json["type"], "GraceCancelled");
    }
}
