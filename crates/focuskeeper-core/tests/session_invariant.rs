//! Property tests for the single-active-session invariant.

use std::sync::Arc;

use focuskeeper_core::events::drain;
use focuskeeper_core::{Event, EventBus, ManualClock, SessionKind, SessionLedger};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    StartFocus(Option<u8>),
    StartBreak(bool),
    End,
    Advance(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        proptest::option::of(0u8..4).prop_map(Op::StartFocus),
        any::<bool>().prop_map(Op::StartBreak),
        Just(Op::End),
        (0u32..3_600).prop_map(Op::Advance),
    ]
}

proptest! {
    #[test]
    fn at_most_one_session_runs(ops in proptest::collection::vec(op(), 1..60)) {
        let clock = ManualClock::default();
        let bus = EventBus::with_capacity(4096);
        let mut rx = bus.subscribe();
        let ledger = SessionLedger::new(Arc::new(clock.clone()), bus);

        let mut started = 0usize;
        for op in &ops {
            match op {
                Op::StartFocus(task) => {
                    ledger.start_focus(task.map(|t| format!("t{t}")), false);
                    started += 1;
                }
                Op::StartBreak(long) => {
                    ledger.start_break(true, *long);
                    started += 1;
                }
                Op::End => {
                    ledger.end_current();
                }
                Op::Advance(secs) => clock.advance_secs(i64::from(*secs)),
            }

            let open = usize::from(ledger.current().is_some());
            prop_assert_eq!(ledger.history().len() + open, started);
        }

        // Completed sessions never overlap.
        let history = ledger.history();
        for pair in history.windows(2) {
            prop_assert!(pair[0].ended_at <= pair[1].started_at);
        }
        for record in &history {
            prop_assert!(record.started_at <= record.ended_at);
        }

        // The event stream never shows two open sessions.
        let mut open = false;
        for event in drain(&mut rx) {
            match event {
                Event::SessionStarted { .. } => {
                    prop_assert!(!open, "session started while another was open");
                    open = true;
                }
                Event::SessionEnded { .. } => {
                    prop_assert!(open, "session ended while none was open");
                    open = false;
                }
                _ => {}
            }
        }
        prop_assert_eq!(open, ledger.current().is_some());
    }

    #[test]
    fn duration_is_rounded_minutes(secs in 0i64..20_000) {
        let clock = ManualClock::default();
        let ledger = SessionLedger::new(Arc::new(clock.clone()), EventBus::new());
        ledger.start_focus(None, false);
        clock.advance_secs(secs);
        let record = ledger.end_current().unwrap();
        prop_assert_eq!(record.kind, SessionKind::Focus);
        prop_assert_eq!(record.duration_minutes, ((secs as f64) / 60.0).round() as u64);
    }
}
