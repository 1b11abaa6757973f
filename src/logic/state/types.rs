//! Security State Types
//!
//! Core types for the decision engine. No logic beyond conversions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

// ============================================================================
// SECURITY STATE
// ============================================================================

/// Verdict about who is looking at the screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityState {
    /// Exactly one face: the owner
    #[default]
    Safe,
    /// More than one face, escalation timer armed
    Warning,
    /// More than one face for longer than the escalation delay
    Alert,
    /// The sensor has reported nobody for too long
    Error,
}

impl SecurityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityState::Safe => "safe",
            SecurityState::Warning => "warning",
            SecurityState::Alert => "alert",
            SecurityState::Error => "error",
        }
    }

    /// Ordering used when deciding whether a change is an escalation.
    /// `Error` is a sensor condition, not a threat, so it ranks with `Safe`.
    pub fn severity_level(&self) -> u8 {
        match self {
            SecurityState::Safe | SecurityState::Error => 0,
            SecurityState::Warning => 1,
            SecurityState::Alert => 2,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            SecurityState::Safe => 0,
            SecurityState::Warning => 1,
            SecurityState::Alert => 2,
            SecurityState::Error => 3,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => SecurityState::Warning,
            2 => SecurityState::Alert,
            3 => SecurityState::Error,
            _ => SecurityState::Safe,
        }
    }
}

impl std::fmt::Display for SecurityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TRANSITION EVENT
// ============================================================================

/// What drove a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionCause {
    /// A forwarded face count
    Observation,
    /// The Warning -> Alert timer fired
    Escalation,
}

/// A single state change, delivered to every listener in order
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    pub id: Uuid,
    pub previous_state: SecurityState,
    pub new_state: SecurityState,
    pub cause: TransitionCause,
    /// Monotonic time of the change
    pub at: Instant,
    /// Wall-clock time of the change
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    pub fn new(previous_state: SecurityState, new_state: SecurityState, cause: TransitionCause) -> Self {
        Self {
            id: Uuid::new_v4(),
            previous_state,
            new_state,
            cause,
            at: Instant::now(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// LISTENERS
// ============================================================================

/// Receives every transition, in order.
///
/// Called after the machine has released its lock, so implementations may
/// read it or feed it. A transition caused from inside a listener is queued
/// and delivered once the current one has reached every listener.
pub trait TransitionListener: Send + Sync {
    fn on_transition(&self, event: &TransitionEvent);
}

impl<F> TransitionListener for F
where
    F: Fn(&TransitionEvent) + Send + Sync,
{
    fn on_transition(&self, event: &TransitionEvent) {
        self(event)
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Copy of the machine's observable state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: SecurityState,
    pub running: bool,
    pub since: DateTime<Utc>,
    pub escalation_pending: bool,
    pub consecutive_zeros: u32,
    pub last_nonzero_count: Option<u32>,
}
