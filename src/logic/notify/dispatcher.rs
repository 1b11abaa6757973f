//! Notification Dispatcher
//!
//! Listens to transitions and persistent-threat signals, asks the gate,
//! and calls the external notifier at most once per approved decision.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use super::gate::NotificationGate;
use super::notifier::{Notifier, NotifySeverity};
use crate::logic::config::MonitorConfig;
use crate::logic::state::{SecurityState, TransitionEvent, TransitionListener};
use crate::logic::tracker::PersistentThreat;

const MAX_HISTORY: usize = 50;

/// A notification that was actually sent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub title: String,
    pub severity: NotifySeverity,
    /// `None` for persistent-threat notifications
    pub state: Option<SecurityState>,
    pub sent_at: DateTime<Utc>,
}

pub struct NotificationDispatcher {
    gate: Mutex<NotificationGate>,
    notifier: Arc<dyn Notifier>,
    dispatched: AtomicU64,
    history: Mutex<VecDeque<NotificationRecord>>,
}

impl NotificationDispatcher {
    pub fn new(config: &MonitorConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            gate: Mutex::new(NotificationGate::new(config.notification_cooldown())),
            notifier,
            dispatched: AtomicU64::new(0),
            history: Mutex::new(VecDeque::with_capacity(MAX_HISTORY)),
        }
    }

    /// Handle the persistent-threat signal: always one critical notification
    pub fn on_persistent_threat(&self, threat: &PersistentThreat) {
        self.gate.lock().record_dispatch(Instant::now());

        let body = format!(
            "Someone has been watching your screen for over {} seconds. Consider locking it.",
            threat.dwell_secs
        );
        self.send("Ongoing screen exposure", &body, NotifySeverity::Critical, None);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Most recent notifications, newest first
    pub fn history(&self) -> Vec<NotificationRecord> {
        self.history.lock().iter().rev().cloned().collect()
    }

    pub fn reset(&self) {
        self.gate.lock().reset();
    }

    fn send(&self, title: &str, body: &str, severity: NotifySeverity, state: Option<SecurityState>) {
        self.notifier.notify(title, body, severity);
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        let mut history = self.history.lock();
        history.push_back(NotificationRecord {
            id: Uuid::new_v4(),
            title: title.to_string(),
            severity,
            state,
            sent_at: Utc::now(),
        });
        if history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }
}

impl TransitionListener for NotificationDispatcher {
    fn on_transition(&self, event: &TransitionEvent) {
        let approved = self.gate.lock().should_notify(event, event.at);
        if !approved {
            return;
        }

        let (title, body, severity) = match event.new_state {
            SecurityState::Warning => (
                "Someone may be looking at your screen",
                "More than one face is in front of the display.",
                NotifySeverity::Info,
            ),
            SecurityState::Alert => (
                "Unauthorized viewer detected",
                "Another person keeps looking at your screen.",
                NotifySeverity::Critical,
            ),
            // The gate never approves these
            SecurityState::Safe | SecurityState::Error => return,
        };

        self.send(title, body, severity, Some(event.new_state));
    }
}
