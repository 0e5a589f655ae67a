//! Focus guard: watches the foreground window and auto-pauses on distraction.
//!
//! ## State Transitions
//!
//! ```text
//! Focused -> GraceCountdown -> Focused      (user came back)
//! Focused -> GraceCountdown -> AutoPaused   (countdown expired)
//! ```
//!
//! The guard owns no thread. [`FocusGuard::poll`] is called once per poll
//! interval and [`FocusGuard::tick`] whenever the countdown deadline may have
//! passed. Countdown start, cancellation and expiry all run under one lock, so
//! a countdown that has been cancelled can never expire.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::distraction::{DistractionKind, DistractionLog, DistractionLogEntry};
use super::pattern::PatternList;
use super::probe::ForegroundProbe;
use super::ForegroundTarget;
use crate::clock::SharedClock;
use crate::error::{Result, ValidationError};
use crate::events::{Event, EventBus};
use crate::ledger::{SessionKind, SessionLedger};
use crate::notify::{send_logged, NotificationGateway, NotificationKind, NotificationPayload};
use crate::storage::FocusGuardConfig;
use crate::timer_handle::TimerHandle;

/// The single live countdown, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraceCountdown {
    pub target: ForegroundTarget,
    pub kind: DistractionKind,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub handle: TimerHandle,
}

impl GraceCountdown {
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::milliseconds(self.duration_ms as i64)
    }
}

/// What a single poll concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Disabled,
    /// The probe failed; nothing changed.
    ProbeFailed,
    /// The probe could not identify a foreground target.
    Unknown,
    /// Whitelisted or our own app; any countdown was cancelled.
    Focused,
    /// Distracted, but no focus session is running.
    NoActiveSession,
    CountdownStarted(DistractionKind),
    CountdownRunning,
    /// The countdown had already expired when this poll ran.
    AutoPaused(DistractionLogEntry),
}

struct GuardState {
    enabled: bool,
    whitelist: PatternList,
    blacklist: PatternList,
    countdown: Option<GraceCountdown>,
}

pub struct FocusGuard {
    state: Mutex<GuardState>,
    config: FocusGuardConfig,
    ledger: Arc<SessionLedger>,
    log: Arc<dyn DistractionLog>,
    probe: Arc<dyn ForegroundProbe>,
    gateway: Arc<dyn NotificationGateway>,
    bus: EventBus,
    clock: SharedClock,
}

impl FocusGuard {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: FocusGuardConfig,
        ledger: Arc<SessionLedger>,
        log: Arc<dyn DistractionLog>,
        probe: Arc<dyn ForegroundProbe>,
        gateway: Arc<dyn NotificationGateway>,
        bus: EventBus,
        clock: SharedClock,
    ) -> Result<Self, ValidationError> {
        let whitelist = PatternList::from_sources(&config.whitelist)?;
        let blacklist = PatternList::from_sources(&config.blacklist)?;
        Ok(Self {
            state: Mutex::new(GuardState {
                enabled: config.enabled,
                whitelist,
                blacklist,
                countdown: None,
            }),
            config,
            ledger,
            log,
            probe,
            gateway,
            bus,
            clock,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    pub fn countdown(&self) -> Option<GraceCountdown> {
        self.lock().countdown.clone()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock().countdown.as_ref().map(GraceCountdown::deadline)
    }

    pub fn whitelist(&self) -> Vec<String> {
        self.lock().whitelist.sources()
    }

    pub fn blacklist(&self) -> Vec<String> {
        self.lock().blacklist.sources()
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.poll_interval_ms.max(1))
    }

    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.probe_timeout_ms.max(1))
    }

    pub fn distraction_log(&self) -> &Arc<dyn DistractionLog> {
        &self.log
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn enable(&self) {
        self.lock().enabled = true;
        tracing::info!("focus guard enabled");
    }

    /// Stop watching. A live countdown is cancelled.
    pub fn disable(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.enabled = false;
        self.cancel_locked(&mut state, now);
        tracing::info!("focus guard disabled");
    }

    pub fn add_to_whitelist(&self, pattern: &str) -> Result<bool, ValidationError> {
        self.lock().whitelist.add(pattern)
    }

    pub fn remove_from_whitelist(&self, pattern: &str) -> bool {
        self.lock().whitelist.remove(pattern)
    }

    pub fn add_to_blacklist(&self, pattern: &str) -> Result<bool, ValidationError> {
        self.lock().blacklist.add(pattern)
    }

    pub fn remove_from_blacklist(&self, pattern: &str) -> bool {
        self.lock().blacklist.remove(pattern)
    }

    /// Query the foreground target once and react to it.
    ///
    /// Never fails: probe errors are logged and reported as
    /// [`PollOutcome::ProbeFailed`].
    pub fn poll(&self) -> PollOutcome {
        if !self.is_enabled() {
            return PollOutcome::Disabled;
        }

        // Probe outside the lock; it may shell out.
        let probed = self.probe.foreground();
        let now = self.clock.now();
        let mut state = self.lock();

        if !state.enabled {
            return PollOutcome::Disabled;
        }
        if let Some(entry) = self.expire_if_due(&mut state, now) {
            return PollOutcome::AutoPaused(entry);
        }

        let target = match probed {
            Ok(Some(target)) => target,
            Ok(None) => return PollOutcome::Unknown,
            Err(e) => {
                tracing::warn!("foreground probe failed: {e}");
                return PollOutcome::ProbeFailed;
            }
        };

        if self.is_own_app(&target) || state.whitelist.matches(&target) {
            self.cancel_locked(&mut state, now);
            return PollOutcome::Focused;
        }

        if state.countdown.is_some() {
            return PollOutcome::CountdownRunning;
        }

        if self.config.require_active_session
            && !self
                .ledger
                .current()
                .is_some_and(|s| s.kind == SessionKind::Focus)
        {
            return PollOutcome::NoActiveSession;
        }

        let kind = if state.blacklist.matches(&target) {
            DistractionKind::Blacklisted
        } else {
            DistractionKind::Unfocused
        };
        self.start_locked(&mut state, target, kind, now);
        PollOutcome::CountdownStarted(kind)
    }

    /// Start a countdown for `target` unless one is already live.
    pub fn start_grace_countdown(&self, target: ForegroundTarget, kind: DistractionKind) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        if state.countdown.is_some() {
            return false;
        }
        self.start_locked(&mut state, target, kind, now);
        true
    }

    /// Cancel the live countdown. Idempotent.
    ///
    /// Returns `true` if a countdown was disarmed before its deadline. At or
    /// after the deadline the auto-pause is applied instead and stands.
    pub fn cancel_grace_countdown(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        if self.expire_if_due(&mut state, now).is_some() {
            return false;
        }
        self.cancel_locked(&mut state, now)
    }

    /// The app window regained focus.
    pub fn on_window_focus(&self) -> bool {
        self.cancel_grace_countdown()
    }

    /// Apply the auto-pause if the live countdown's deadline has passed.
    pub fn tick(&self) -> Option<DistractionLogEntry> {
        let now = self.clock.now();
        let mut state = self.lock();
        self.expire_if_due(&mut state, now)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn is_own_app(&self, target: &ForegroundTarget) -> bool {
        target.name.eq_ignore_ascii_case(&self.config.app_name)
    }

    fn start_locked(
        &self,
        state: &mut GuardState,
        target: ForegroundTarget,
        kind: DistractionKind,
        now: DateTime<Utc>,
    ) {
        let duration_ms = self.config.grace_countdown_ms;
        tracing::info!(app = %target.name, kind = kind.as_str(), duration_ms, "grace countdown started");

        let payload = NotificationPayload::new(
            "Back to focus?",
            format!(
                "{} is pulling you away. Auto-pause in {}s.",
                target.name,
                duration_ms.div_ceil(1000)
            ),
        );
        send_logged(self.gateway.as_ref(), NotificationKind::GraceStarted, &payload);

        self.bus.publish(Event::GraceStarted {
            target: target.clone(),
            duration_ms,
            at: now,
        });
        state.countdown = Some(GraceCountdown {
            target,
            kind,
            started_at: now,
            duration_ms,
            handle: TimerHandle::next(),
        });
    }

    fn cancel_locked(&self, state: &mut GuardState, now: DateTime<Utc>) -> bool {
        let Some(countdown) = state.countdown.take() else {
            return false;
        };
        tracing::info!(app = %countdown.target.name, "grace countdown cancelled");
        self.bus.publish(Event::GraceCancelled { at: now });
        true
    }

    fn expire_if_due(
        &self,
        state: &mut GuardState,
        now: DateTime<Utc>,
    ) -> Option<DistractionLogEntry> {
        if state.countdown.as_ref()?.deadline() > now {
            return None;
        }

        // The focus session may have ended or turned into a break meanwhile.
        let paused = if self.config.require_active_session {
            let closed = self
                .ledger
                .end_current_if(|s| s.kind == SessionKind::Focus);
            if closed.is_none() {
                tracing::debug!("countdown expired without a focus session");
                self.cancel_locked(state, now);
                return None;
            }
            closed
        } else {
            self.ledger.end_current()
        };
        let countdown = state.countdown.take()?;
        let entry = DistractionLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: countdown.started_at,
            end_time: now,
            duration_ms: (now - countdown.started_at).num_milliseconds().max(0) as u64,
            kind: countdown.kind,
            app_name: countdown.target.name,
            window_title: countdown.target.title,
            url: countdown.target.url,
            annotation: None,
        };
        if let Err(e) = self.log.append(&entry) {
            tracing::warn!(entry_id = %entry.id, "failed to append distraction: {e}");
        }

        tracing::info!(
            app = %entry.app_name,
            kind = entry.kind.as_str(),
            session_closed = paused.is_some(),
            "auto-pause triggered"
        );
        let payload = NotificationPayload::new(
            "Timer paused",
            format!("Paused after {}s on {}", entry.duration_ms / 1000, entry.app_name),
        );
        send_logged(self.gateway.as_ref(), NotificationKind::AutoPaused, &payload);

        self.bus.publish(Event::AutoPauseTriggered {
            entry: entry.clone(),
        });
        Some(entry)
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::drain;
    use crate::focus::{InMemoryDistractionLog, ScriptedProbe};
    use crate::notify::testing::RecordingGateway;

    struct Fixture {
        guard: FocusGuard,
        ledger: Arc<SessionLedger>,
        log: Arc<InMemoryDistractionLog>,
        probe: Arc<ScriptedProbe>,
        gateway: Arc<RecordingGateway>,
        clock: ManualClock,
        bus: EventBus,
    }

    fn fixture(config: FocusGuardConfig) -> Fixture {
        let clock = ManualClock::default();
        let bus = EventBus::new();
        let ledger = Arc::new(SessionLedger::new(Arc::new(clock.clone()), bus.clone()));
        let log = Arc::new(InMemoryDistractionLog::new());
        let probe = Arc::new(ScriptedProbe::new(Some(ForegroundTarget::app(
            "FocusKeeper",
            None,
        ))));
        let gateway = Arc::new(RecordingGateway::default());
        let guard = FocusGuard::new(
            config,
            ledger.clone(),
            log.clone(),
            probe.clone(),
            gateway.clone(),
            bus.clone(),
            Arc::new(clock.clone()),
        )
        .unwrap();
        Fixture {
            guard,
            ledger,
            log,
            probe,
            gateway,
            clock,
            bus,
        }
    }

    fn default_fixture() -> Fixture {
        fixture(FocusGuardConfig {
            whitelist: vec!["Code".into(), "*terminal*".into()],
            blacklist: vec!["Steam".into(), "*.reddit.com".into()],
            ..FocusGuardConfig::default()
        })
    }

    #[test]
    fn own_app_and_whitelist_stay_focused() {
        let f = default_fixture();
        f.ledger.start_focus(None, false);
        assert_eq!(f.guard.poll(), PollOutcome::Focused);

        f.probe.set_foreground(Some(ForegroundTarget::app("GNOME Terminal", None)));
        assert_eq!(f.guard.poll(), PollOutcome::Focused);
        assert!(f.guard.countdown().is_none());
    }

    #[test]
    fn blacklist_takes_precedence_for_classification() {
        let f = default_fixture();
        f.ledger.start_focus(None, false);

        let site = ForegroundTarget::website("Firefox", "https://old.reddit.com/", None);
        f.probe.set_foreground(Some(site));
        assert_eq!(
            f.guard.poll(),
            PollOutcome::CountdownStarted(DistractionKind::Blacklisted)
        );
        assert_eq!(f.guard.poll(), PollOutcome::CountdownRunning);
        assert_eq!(f.gateway.count(NotificationKind::GraceStarted), 1);
    }

    #[test]
    fn unlisted_app_counts_as_unfocused() {
        let f = default_fixture();
        f.ledger.start_focus(None, false);
        f.probe.set_foreground(Some(ForegroundTarget::app("Mail", None)));
        assert_eq!(
            f.guard.poll(),
            PollOutcome::CountdownStarted(DistractionKind::Unfocused)
        );
    }

    #[test]
    fn no_countdown_without_focus_session() {
        let f = default_fixture();
        f.probe.set_foreground(Some(ForegroundTarget::app("Steam", None)));
        assert_eq!(f.guard.poll(), PollOutcome::NoActiveSession);

        f.ledger.start_break(true, false);
        assert_eq!(f.guard.poll(), PollOutcome::NoActiveSession);
    }

    #[test]
    fn returning_cancels_countdown() {
        let f = default_fixture();
        let mut rx = f.bus.subscribe();
        f.ledger.start_focus(None, false);
        f.probe.set_foreground(Some(ForegroundTarget::app("Steam", None)));
        f.guard.poll();

        f.clock.advance_secs(5);
        f.probe.set_foreground(Some(ForegroundTarget::app("Code", None)));
        assert_eq!(f.guard.poll(), PollOutcome::Focused);

        f.clock.advance_secs(30);
        assert!(f.guard.tick().is_none());
        assert!(f.ledger.current().is_some());
        assert!(f.log.list().unwrap().is_empty());

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, Event::GraceCancelled { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::AutoPauseTriggered { .. })));
    }

    #[test]
    fn cancel_is_idempotent() {
        let f = default_fixture();
        let mut rx = f.bus.subscribe();
        assert!(!f.guard.cancel_grace_countdown());

        f.ledger.start_focus(None, false);
        f.guard
            .start_grace_countdown(ForegroundTarget::app("Steam", None), DistractionKind::Blacklisted);
        assert!(f.guard.on_window_focus());
        assert!(!f.guard.cancel_grace_countdown());

        let cancelled = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, Event::GraceCancelled { .. }))
            .count();
        assert_eq!(cancelled, 1);
    }

    #[test]
    fn cancel_at_deadline_lets_pause_stand() {
        let f = default_fixture();
        f.ledger.start_focus(None, false);
        f.guard
            .start_grace_countdown(ForegroundTarget::app("Steam", None), DistractionKind::Blacklisted);

        f.clock.advance_secs(10);
        assert!(!f.guard.cancel_grace_countdown());
        assert_eq!(f.log.list().unwrap().len(), 1);
        assert!(f.ledger.current().is_none());
    }

    #[test]
    fn expiry_pauses_and_logs_once() {
        let f = default_fixture();
        f.ledger.start_focus(Some("t1".into()), true);
        f.probe.set_foreground(Some(ForegroundTarget::app("Steam", Some("Library".into()))));
        f.guard.poll();

        f.clock.advance(Duration::milliseconds(9_999));
        assert!(f.guard.tick().is_none());

        f.clock.advance(Duration::milliseconds(1));
        let entry = f.guard.tick().unwrap();
        assert_eq!(entry.duration_ms, 10_000);
        assert_eq!(entry.kind, DistractionKind::Blacklisted);
        assert_eq!(entry.app_name, "Steam");
        assert_eq!(entry.window_title.as_deref(), Some("Library"));
        assert!(f.ledger.current().is_none());
        assert_eq!(f.ledger.history().len(), 1);

        assert!(f.guard.tick().is_none());
        assert_eq!(f.log.list().unwrap().len(), 1);
        assert_eq!(f.gateway.count(NotificationKind::AutoPaused), 1);
    }

    #[test]
    fn expiry_after_break_started_leaves_break_alone() {
        let f = default_fixture();
        let mut rx = f.bus.subscribe();
        f.ledger.start_focus(None, true);
        f.probe.set_foreground(Some(ForegroundTarget::app("Steam", None)));
        f.guard.poll();

        f.clock.advance_secs(5);
        f.ledger.start_break(true, false);
        f.clock.advance_secs(10);

        assert!(f.guard.tick().is_none());
        assert!(f.guard.countdown().is_none());
        assert_eq!(f.ledger.current().unwrap().kind, SessionKind::Break);
        assert!(f.log.list().unwrap().is_empty());
        assert_eq!(f.gateway.count(NotificationKind::AutoPaused), 0);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, Event::GraceCancelled { .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::AutoPauseTriggered { .. })));
    }

    #[test]
    fn expiry_closes_any_session_when_not_required() {
        let f = fixture(FocusGuardConfig {
            require_active_session: false,
            ..FocusGuardConfig::default()
        });
        f.ledger.start_break(false, false);
        f.guard
            .start_grace_countdown(ForegroundTarget::app("Steam", None), DistractionKind::Unfocused);

        f.clock.advance_secs(10);
        assert!(f.guard.tick().is_some());
        assert!(f.ledger.current().is_none());
        assert_eq!(f.log.list().unwrap().len(), 1);
    }

    #[test]
    fn probe_failure_is_contained() {
        let f = default_fixture();
        f.ledger.start_focus(None, false);
        f.probe.fail_next(1);
        assert_eq!(f.guard.poll(), PollOutcome::ProbeFailed);
        f.probe.set_foreground(Some(ForegroundTarget::app("Steam", None)));
        assert!(matches!(f.guard.poll(), PollOutcome::CountdownStarted(_)));
    }

    #[test]
    fn list_changes_apply_on_next_poll_only() {
        let f = default_fixture();
        f.ledger.start_focus(None, false);
        f.probe.set_foreground(Some(ForegroundTarget::app("Mail", None)));
        f.guard.poll();
        let before = f.guard.countdown().unwrap();

        f.guard.add_to_blacklist("Mail").unwrap();
        assert_eq!(f.guard.countdown().unwrap(), before);

        f.guard.add_to_whitelist("mail").unwrap();
        assert_eq!(f.guard.poll(), PollOutcome::Focused);
        assert!(f.guard.remove_from_whitelist("MAIL"));
        assert!(f.guard.blacklist().contains(&"Mail".to_string()));
    }

    #[test]
    fn disabled_guard_ignores_everything() {
        let f = default_fixture();
        f.ledger.start_focus(None, false);
        f.guard
            .start_grace_countdown(ForegroundTarget::app("Steam", None), DistractionKind::Blacklisted);
        f.guard.disable();
        assert!(f.guard.countdown().is_none());

        f.probe.set_foreground(Some(ForegroundTarget::app("Steam", None)));
        assert_eq!(f.guard.poll(), PollOutcome::Disabled);

        f.guard.enable();
        assert!(matches!(f.guard.poll(), PollOutcome::CountdownStarted(_)));
    }

    #[test]
    fn invalid_config_pattern_is_rejected() {
        let clock = ManualClock::default();
        let bus = EventBus::new();
        let result = FocusGuard::new(
            FocusGuardConfig {
                whitelist: vec!["  ".into()],
                ..FocusGuardConfig::default()
            },
            Arc::new(SessionLedger::new(Arc::new(clock.clone()), bus.clone())),
            Arc::new(InMemoryDistractionLog::new()),
            Arc::new(ScriptedProbe::default()),
            Arc::new(RecordingGateway::default()),
            bus,
            Arc::new(clock),
        );
        assert!(result.is_err());
    }
}
