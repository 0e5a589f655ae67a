//! Notification Gateway collaborator.
//!
//! The engine hands every user-facing alert to a [`NotificationGateway`] and
//! treats the outcome as opaque. Delivery failures are logged by the caller
//! and never alter timer state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::NotifyError;
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskReminder,
    TaskOverdue,
    GraceStarted,
    AutoPaused,
}

impl NotificationKind {
    /// Alerts that are meaningless once the moment has passed.
    pub fn is_time_sensitive(self) -> bool {
        matches!(self, NotificationKind::GraceStarted | NotificationKind::AutoPaused)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub task_id: Option<TaskId>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            task_id: None,
        }
    }

    pub fn for_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Delivered,
    Queued,
    Dropped,
}

pub trait NotificationGateway: Send + Sync {
    fn send(
        &self,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<Delivery, NotifyError>;
}

impl<G: NotificationGateway + ?Sized> NotificationGateway for Arc<G> {
    fn send(
        &self,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<Delivery, NotifyError> {
        (**self).send(kind, payload)
    }
}

/// Send through a gateway, logging instead of propagating failures.
pub(crate) fn send_logged(
    gateway: &dyn NotificationGateway,
    kind: NotificationKind,
    payload: &NotificationPayload,
) -> Option<Delivery> {
    match gateway.send(kind, payload) {
        Ok(delivery) => {
            tracing::debug!(?kind, ?delivery, title = %payload.title, "notification sent");
            Some(delivery)
        }
        Err(e) => {
            tracing::warn!(?kind, title = %payload.title, "notification delivery failed: {e}");
            None
        }
    }
}

/// Gateway that writes notifications to the log. Used by the CLI daemon.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingGateway;

impl NotificationGateway for TracingGateway {
    fn send(
        &self,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<Delivery, NotifyError> {
        tracing::info!(?kind, task_id = ?payload.task_id, "{}: {}", payload.title, payload.body);
        Ok(Delivery::Delivered)
    }
}

/// Drops everything. Used when notifications are turned off in the config.
#[derive(Debug, Default, Clone, Copy)]
pub struct MutedGateway;

impl NotificationGateway for MutedGateway {
    fn send(
        &self,
        _kind: NotificationKind,
        _payload: &NotificationPayload,
    ) -> Result<Delivery, NotifyError> {
        Ok(Delivery::Dropped)
    }
}

/// Quiet hours policy. Hours are on the local wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHoursPolicy {
    pub enabled: bool,
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for QuietHoursPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 22,
            end_hour: 7,
        }
    }
}

impl QuietHoursPolicy {
    /// Check if a given time is within quiet hours
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.contains_hour(time.with_timezone(&Local).hour())
    }

    /// Check a local hour of day (0-23) against the window.
    pub fn contains_hour(&self, hour: u32) -> bool {
        if !self.enabled {
            return false;
        }

        // Overnight window (e.g., 22:00 - 07:00)
        if self.start_hour > self.end_hour {
            return hour >= self.start_hour as u32 || hour < self.end_hour as u32;
        }

        // Daytime window (e.g., 12:00 - 17:00)
        hour >= self.start_hour as u32 && hour < self.end_hour as u32
    }
}

/// Holds back deliveries during quiet hours.
///
/// Time-sensitive kinds are dropped; the rest are queued and released on the
/// first send after the window closes.
pub struct QuietHoursGateway<G> {
    inner: G,
    policy: QuietHoursPolicy,
    clock: SharedClock,
    queued: Mutex<VecDeque<(NotificationKind, NotificationPayload)>>,
}

impl<G: NotificationGateway> QuietHoursGateway<G> {
    pub fn new(inner: G, policy: QuietHoursPolicy, clock: SharedClock) -> Self {
        Self {
            inner,
            policy,
            clock,
            queued: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queued_len(&self) -> usize {
        self.queued.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Deliver queued items in order. The first failure goes back to the
    /// front of the queue and stops the release.
    fn release_queued(&self) {
        let mut queued = self.queued.lock().unwrap_or_else(|e| e.into_inner());
        while let Some((kind, payload)) = queued.pop_front() {
            if let Err(e) = self.inner.send(kind, &payload) {
                tracing::warn!(
                    ?kind,
                    remaining = queued.len() + 1,
                    "releasing queued notification failed: {e}"
                );
                queued.push_front((kind, payload));
                return;
            }
        }
    }
}

impl<G: NotificationGateway> NotificationGateway for QuietHoursGateway<G> {
    fn send(
        &self,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<Delivery, NotifyError> {
        if self.policy.contains(self.clock.now()) {
            if kind.is_time_sensitive() {
                return Ok(Delivery::Dropped);
            }
            self.queued
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back((kind, payload.clone()));
            return Ok(Delivery::Queued);
        }
        self.release_queued();
        self.inner.send(kind, payload)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every send; optionally fails all of them, or just the next few.
    #[derive(Default)]
    pub struct RecordingGateway {
        pub sent: Mutex<Vec<(NotificationKind, NotificationPayload)>>,
        pub fail: bool,
        pub fail_next: Mutex<u32>,
    }

    impl RecordingGateway {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn failing_once() -> Self {
            Self {
                fail_next: Mutex::new(1),
                ..Self::default()
            }
        }

        pub fn titles(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, p)| p.title.clone()).collect()
        }

        pub fn count(&self, kind: NotificationKind) -> usize {
            self.sent.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
        }
    }

    impl NotificationGateway for RecordingGateway {
        fn send(
            &self,
            kind: NotificationKind,
            payload: &NotificationPayload,
        ) -> Result<Delivery, NotifyError> {
            self.sent.lock().unwrap().push((kind, payload.clone()));
            let mut fail_next = self.fail_next.lock().unwrap();
            if self.fail || *fail_next > 0 {
                *fail_next = fail_next.saturating_sub(1);
                Err(NotifyError::DeliveryFailed("backend offline".into()))
            } else {
                Ok(Delivery::Delivered)
            }
        }
    }
}
