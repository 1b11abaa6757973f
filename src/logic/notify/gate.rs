//! Notification Gate
//!
//! Decides whether a transition deserves a user notification:
//! - only `Warning` and `Alert` are ever announced
//! - never the same state twice in a row
//! - at most one notification per cooldown, unless the new state is more
//!   severe than the last one announced (escalation always gets through)

use std::time::Duration;
use tokio::time::Instant;

use crate::logic::state::{SecurityState, TransitionEvent};

#[derive(Debug, Clone)]
pub struct NotificationGate {
    cooldown: Duration,
    last_notified_at: Option<Instant>,
    last_notified_state: Option<SecurityState>,
}

impl NotificationGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_notified_at: None,
            last_notified_state: None,
        }
    }

    /// Returns `true` when the caller should notify; the cooldown is
    /// recorded in the same step.
    pub fn should_notify(&mut self, event: &TransitionEvent, now: Instant) -> bool {
        let state = event.new_state;
        if !matches!(state, SecurityState::Warning | SecurityState::Alert) {
            return false;
        }

        if self.last_notified_state == Some(state) {
            return false;
        }

        if !self.cooldown_elapsed(now) && !self.is_escalation(state) {
            log::debug!("Notification for {} suppressed by cooldown", state);
            return false;
        }

        self.record(state, now);
        true
    }

    /// Count an out-of-band notification (persistent threat) against the cooldown
    pub fn record_dispatch(&mut self, now: Instant) {
        self.last_notified_at = Some(now);
    }

    pub fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_notified_at {
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
            None => true,
        }
    }

    pub fn last_notified_state(&self) -> Option<SecurityState> {
        self.last_notified_state
    }

    pub fn reset(&mut self) {
        self.last_notified_at = None;
        self.last_notified_state = None;
    }

    fn is_escalation(&self, state: SecurityState) -> bool {
        let last = self.last_notified_state.map_or(0, |s| s.severity_level());
        state.severity_level() > last
    }

    fn record(&mut self, state: SecurityState, now: Instant) {
        self.last_notified_at = Some(now);
        self.last_notified_state = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::state::TransitionCause;
    use SecurityState::*;

    fn event(from: SecurityState, to: SecurityState) -> TransitionEvent {
        TransitionEvent::new(from, to, TransitionCause::Observation)
    }

    fn gate() -> NotificationGate {
        NotificationGate::new(Duration::from_secs(5))
    }

    #[test]
    fn test_safe_and_error_never_notify() {
        let mut gate = gate();
        let now = Instant::now();
        assert!(!gate.should_notify(&event(Warning, Safe), now));
        assert!(!gate.should_notify(&event(Safe, Error), now));
        assert_eq!(gate.last_notified_state(), None);
    }

    #[test]
    fn test_escalation_within_cooldown_notifies() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.should_notify(&event(Safe, Warning), t0));
        assert!(gate.should_notify(&event(Warning, Alert), t0 + Duration::from_secs(2)));
        assert_eq!(gate.last_notified_state(), Some(Alert));
    }

    #[test]
    fn test_duplicate_state_never_notifies() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.should_notify(&event(Warning, Alert), t0));
        assert!(!gate.should_notify(&event(Alert, Alert), t0 + Duration::from_secs(1)));
        assert!(!gate.should_notify(&event(Alert, Alert), t0 + Duration::from_secs(60)));
    }

    #[test]
    fn test_deescalation_respects_cooldown() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.should_notify(&event(Warning, Alert), t0));

        // Alert -> Safe -> Warning inside the cooldown stays quiet
        assert!(!gate.should_notify(&event(Safe, Warning), t0 + Duration::from_secs(3)));
        assert!(gate.should_notify(&event(Safe, Warning), t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_same_state_after_safe_still_suppressed() {
        let mut gate = gate();
        let t0 = Instant::now();
        assert!(gate.should_notify(&event(Safe, Warning), t0));
        assert!(!gate.should_notify(&event(Warning, Safe), t0 + Duration::from_secs(1)));
        assert!(!gate.should_notify(&event(Safe, Warning), t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_record_dispatch_and_reset() {
        let mut gate = gate();
        let t0 = Instant::now();
        gate.record_dispatch(t0);
        assert!(!gate.cooldown_elapsed(t0 + Duration::from_secs(4)));
        assert!(gate.cooldown_elapsed(t0 + Duration::from_secs(5)));

        gate.reset();
        assert!(gate.cooldown_elapsed(t0));
        assert_eq!(gate.last_notified_state(), None);
    }
}
