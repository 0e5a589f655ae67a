//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use focuskeeper_core::error::NotifyError;
use focuskeeper_core::events::{drain, Event, EventBus};
use focuskeeper_core::notify::{Delivery, NotificationGateway, NotificationKind, NotificationPayload};
use focuskeeper_core::{Config, FocusKeeper, InMemoryTaskStore, ManualClock, ScriptedProbe};

/// Gateway that remembers every send.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(NotificationKind, NotificationPayload)>>,
}

impl RecordingGateway {
    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }
}

impl NotificationGateway for RecordingGateway {
    fn send(
        &self,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<Delivery, NotifyError> {
        self.sent.lock().unwrap().push((kind, payload.clone()));
        Ok(Delivery::Delivered)
    }
}

pub struct Harness {
    pub keeper: FocusKeeper,
    pub clock: ManualClock,
    pub store: Arc<InMemoryTaskStore>,
    pub gateway: Arc<RecordingGateway>,
    pub probe: Arc<ScriptedProbe>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let clock = ManualClock::default();
        let store = Arc::new(InMemoryTaskStore::new());
        let gateway = Arc::new(RecordingGateway::default());
        let probe = Arc::new(ScriptedProbe::new(None));
        let keeper = FocusKeeper::builder(config)
            .bus(EventBus::with_capacity(4096))
            .clock(Arc::new(clock.clone()))
            .task_store(store.clone())
            .gateway(gateway.clone())
            .probe(probe.clone())
            .build()
            .unwrap();
        Self {
            keeper,
            clock,
            store,
            gateway,
            probe,
        }
    }

    /// Advance the clock one second at a time, ticking every component.
    pub fn run_for_secs(&self, secs: i64) {
        for _ in 0..secs {
            self.clock.advance_secs(1);
            self.keeper.reminders().tick();
            self.keeper.cycle().tick();
            self.keeper.guard().tick();
        }
    }
}

pub fn events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    drain(rx)
}
