//! Runtime wiring and the tokio driver loops.
//!
//! [`FocusKeeper`] owns one instance of each component and shares a single
//! [`EventBus`] and [`Clock`](crate::clock::Clock) between them. The
//! components themselves are synchronous; [`FocusKeeper::spawn`] runs the
//! background tasks that tick them.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::error::Elapsed;
use tokio::time::{MissedTickBehavior, Timeout};

use crate::clock::{SharedClock, SystemClock};
use crate::cycle::CycleEngine;
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::focus::{
    CommandProbe, DistractionLog, FocusGuard, ForegroundProbe, InMemoryDistractionLog,
    PollOutcome, ScriptedProbe,
};
use crate::ledger::{SessionLedger, SessionSink};
use crate::notify::{MutedGateway, NotificationGateway, QuietHoursGateway, TracingGateway};
use crate::reminder::ReminderScheduler;
use crate::storage::{Config, Database};
use crate::task::{InMemoryTaskStore, TaskStore};

const TICK_PERIOD: StdDuration = StdDuration::from_secs(1);

pub struct FocusKeeper {
    bus: EventBus,
    clock: SharedClock,
    tasks: Arc<dyn TaskStore>,
    ledger: Arc<SessionLedger>,
    reminders: Arc<ReminderScheduler>,
    cycle: Arc<CycleEngine>,
    guard: Arc<FocusGuard>,
}

impl FocusKeeper {
    pub fn builder(config: Config) -> FocusKeeperBuilder {
        FocusKeeperBuilder::new(config)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.tasks
    }

    pub fn ledger(&self) -> &Arc<SessionLedger> {
        &self.ledger
    }

    pub fn reminders(&self) -> &Arc<ReminderScheduler> {
        &self.reminders
    }

    pub fn cycle(&self) -> &Arc<CycleEngine> {
        &self.cycle
    }

    pub fn guard(&self) -> &Arc<FocusGuard> {
        &self.guard
    }

    /// Drop every pending timer for a task that is being deleted.
    ///
    /// # Errors
    /// Refuses with [`CoreError::ActiveSessionInProgress`] while the task owns
    /// the running session. The check and the removal happen under the
    /// ledger lock.
    ///
    /// [`CoreError::ActiveSessionInProgress`]: crate::error::CoreError::ActiveSessionInProgress
    pub fn delete_task(&self, task_id: &str) -> Result<()> {
        let had_timers = self
            .ledger
            .ensure_not_owned(task_id, || self.reminders.remove_task(task_id))?;
        tracing::info!(task_id, had_timers, "task timers removed");
        Ok(())
    }

    /// Freeze the Pomodoro countdown after the guard closed the session.
    fn on_auto_pause(&self) {
        if self.cycle.pause() {
            tracing::debug!("cycle paused after auto-pause");
        }
    }

    /// Start the driver loops on the current tokio runtime.
    pub fn spawn(self: &Arc<Self>) -> RuntimeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let cycle = self.cycle.clone();
        let reminders = self.reminders.clone();
        let tasks = vec![
            tokio::spawn(ticker(TICK_PERIOD, shutdown_rx.clone(), move || {
                cycle.tick();
            })),
            tokio::spawn(ticker(TICK_PERIOD, shutdown_rx.clone(), move || {
                reminders.tick();
            })),
            tokio::spawn(guard_loop(self.clone(), shutdown_rx)),
        ];

        tracing::info!("runtime started");
        RuntimeHandle { shutdown_tx, tasks }
    }
}

/// Join handles for the driver loops.
pub struct RuntimeHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    /// Signal every loop to stop and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!("driver task ended abnormally: {e}");
            }
        }
        tracing::info!("runtime stopped");
    }
}

async fn ticker<F>(period: StdDuration, mut shutdown: watch::Receiver<bool>, mut on_tick: F)
where
    F: FnMut() + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => on_tick(),
        }
    }
}

type PollTask = Pin<Box<Timeout<JoinHandle<PollOutcome>>>>;

/// Polls and countdown expiry run independently: a slow probe never holds
/// back the deadline or shutdown.
async fn guard_loop(keeper: Arc<FocusKeeper>, mut shutdown: watch::Receiver<bool>) {
    let probe_timeout = keeper.guard.probe_timeout();
    let mut poll = tokio::time::interval(keeper.guard.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut in_flight: Option<PollTask> = None;

    loop {
        let until_deadline = keeper.guard.next_deadline().map(|deadline| {
            (deadline - keeper.clock.now())
                .to_std()
                .unwrap_or(StdDuration::ZERO)
        });

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = poll.tick(), if in_flight.is_none() => {
                let guard = keeper.guard.clone();
                let task = tokio::task::spawn_blocking(move || guard.poll());
                in_flight = Some(Box::pin(tokio::time::timeout(probe_timeout, task)));
            }
            finished = await_poll(&mut in_flight) => {
                in_flight = None;
                match finished {
                    Ok(Ok(PollOutcome::AutoPaused(_))) => keeper.on_auto_pause(),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!("focus poll task failed: {e}"),
                    Err(_) => tracing::warn!(
                        timeout_ms = probe_timeout.as_millis() as u64,
                        "foreground probe timed out; poll abandoned"
                    ),
                }
            }
            _ = sleep_until_deadline(until_deadline) => {
                let guard = keeper.guard.clone();
                match tokio::task::spawn_blocking(move || guard.tick()).await {
                    Ok(Some(_)) => keeper.on_auto_pause(),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("countdown expiry task failed: {e}"),
                }
            }
        }
    }
}

async fn await_poll(
    task: &mut Option<PollTask>,
) -> std::result::Result<std::result::Result<PollOutcome, JoinError>, Elapsed> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(wait: Option<StdDuration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

/// Collaborators default to in-memory stores, the system clock and a
/// logging notification gateway.
pub struct FocusKeeperBuilder {
    config: Config,
    bus: Option<EventBus>,
    clock: Option<SharedClock>,
    tasks: Option<Arc<dyn TaskStore>>,
    gateway: Option<Arc<dyn NotificationGateway>>,
    probe: Option<Arc<dyn ForegroundProbe>>,
    session_sink: Option<Arc<dyn SessionSink>>,
    distraction_log: Option<Arc<dyn DistractionLog>>,
}

impl FocusKeeperBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            bus: None,
            clock: None,
            tasks: None,
            gateway: None,
            probe: None,
            session_sink: None,
            distraction_log: None,
        }
    }

    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn NotificationGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn ForegroundProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn session_sink(mut self, sink: Arc<dyn SessionSink>) -> Self {
        self.session_sink = Some(sink);
        self
    }

    pub fn distraction_log(mut self, log: Arc<dyn DistractionLog>) -> Self {
        self.distraction_log = Some(log);
        self
    }

    /// Persist both session history and distractions in `db`.
    pub fn database(self, db: Arc<Database>) -> Self {
        self.session_sink(db.clone()).distraction_log(db)
    }

    /// # Errors
    /// Fails when a whitelist or blacklist pattern in the config is invalid.
    pub fn build(self) -> Result<FocusKeeper> {
        let Config {
            reminders,
            pomodoro,
            focus_guard,
            notifications,
        } = self.config;

        let bus = self.bus.unwrap_or_default();
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as SharedClock);
        let tasks = self
            .tasks
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()) as Arc<dyn TaskStore>);

        let gateway: Arc<dyn NotificationGateway> = if notifications.enabled {
            let inner = self
                .gateway
                .unwrap_or_else(|| Arc::new(TracingGateway) as Arc<dyn NotificationGateway>);
            Arc::new(QuietHoursGateway::new(
                inner,
                notifications.quiet_hours,
                clock.clone(),
            ))
        } else {
            Arc::new(MutedGateway)
        };

        let probe = match (self.probe, focus_guard.probe_command.as_deref()) {
            (Some(probe), _) => probe,
            (None, Some(argv)) => match CommandProbe::from_argv(argv) {
                Some(probe) => Arc::new(probe.with_timeout(StdDuration::from_millis(
                    focus_guard.probe_timeout_ms.max(1),
                ))) as Arc<dyn ForegroundProbe>,
                None => Arc::new(ScriptedProbe::new(None)),
            },
            (None, None) => {
                tracing::warn!("no foreground probe configured; focus guard will see nothing");
                Arc::new(ScriptedProbe::new(None))
            }
        };

        let mut ledger = SessionLedger::new(clock.clone(), bus.clone());
        if let Some(sink) = self.session_sink {
            ledger = ledger.with_sink(sink);
        }
        let ledger = Arc::new(ledger);

        let log = self
            .distraction_log
            .unwrap_or_else(|| Arc::new(InMemoryDistractionLog::new()) as Arc<dyn DistractionLog>);

        let reminders = Arc::new(ReminderScheduler::new(
            reminders,
            tasks.clone(),
            gateway.clone(),
            bus.clone(),
            clock.clone(),
        ));
        let cycle = Arc::new(CycleEngine::new(
            pomodoro,
            ledger.clone(),
            bus.clone(),
            clock.clone(),
        ));
        let guard = Arc::new(FocusGuard::new(
            focus_guard,
            ledger.clone(),
            log,
            probe,
            gateway,
            bus.clone(),
            clock.clone(),
        )?);

        Ok(FocusKeeper {
            bus,
            clock,
            tasks,
            ledger,
            reminders,
            cycle,
            guard,
        })
    }
}
