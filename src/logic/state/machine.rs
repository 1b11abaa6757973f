//! Security State Machine
//!
//! Turns forwarded face counts into Safe / Warning / Alert / Error.
//!
//! ## Transitions
//! ```text
//!   count == 1            count >= 2                 timer (T) && count >= 2
//!  ───────────► Safe ─────────────────► Warning ─────────────────────────► Alert
//!                 ▲                        │ count == 1                      │
//!                 └────────────────────────┴─────────────────────────────────┘
//!
//!   K consecutive zeros from any state ──► Error   (next nonzero count leaves it)
//! ```
//!
//! Zero counts shorter than K are replaced by the last nonzero count, so a
//! single dropped frame never looks like "nobody there".
//!
//! `update()` and the escalation timer share one mutex. Transitions are queued
//! under it and delivered to listeners after it is released, one drainer at a
//! time, so listeners see them in order and may read the machine freely. The
//! current state is also mirrored into an atomic for lock-free reads.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;

use super::types::{SecurityState, StateSnapshot, TransitionCause, TransitionEvent, TransitionListener};
use crate::logic::config::MonitorConfig;
use crate::logic::error::MonitorError;
use crate::logic::throttle::ObservationSink;
use crate::logic::timer::DeferredTask;

// ============================================================================
// STATE
// ============================================================================

struct Core {
    running: bool,
    runtime: Option<Handle>,
    state: SecurityState,
    since: DateTime<Utc>,
    consecutive_zeros: u32,
    last_nonzero: Option<u32>,
    pending: Option<DeferredTask>,
}

impl Core {
    fn new() -> Self {
        Self {
            running: false,
            runtime: None,
            state: SecurityState::Safe,
            since: Utc::now(),
            consecutive_zeros: 0,
            last_nonzero: None,
            pending: None,
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(mut task) = self.pending.take() {
            if task.cancel() {
                log::debug!("Escalation timer #{} cancelled", task.id());
            }
        }
    }

    fn reset(&mut self) {
        self.cancel_pending();
        self.state = SecurityState::Safe;
        self.since = Utc::now();
        self.consecutive_zeros = 0;
        self.last_nonzero = None;
    }
}

struct Shared {
    escalation_delay: Duration,
    zero_tolerance: u32,
    state: AtomicU8,
    core: Mutex<Core>,
    listeners: RwLock<Vec<Arc<dyn TransitionListener>>>,
    outbox: Mutex<VecDeque<TransitionEvent>>,
    publishing: Mutex<()>,
    next_task_id: AtomicU64,
}

// ============================================================================
// STATE MACHINE
// ============================================================================

pub struct SecurityStateMachine {
    shared: Arc<Shared>,
}

impl SecurityStateMachine {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                escalation_delay: config.escalation_delay(),
                zero_tolerance: config.zero_tolerance.max(1),
                state: AtomicU8::new(SecurityState::Safe.to_u8()),
                core: Mutex::new(Core::new()),
                listeners: RwLock::new(Vec::new()),
                outbox: Mutex::new(VecDeque::new()),
                publishing: Mutex::new(()),
                next_task_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a transition listener. Listeners run in registration order.
    pub fn add_listener(&self, listener: Arc<dyn TransitionListener>) {
        self.shared.listeners.write().push(listener);
    }

    /// Reset to `Safe` and begin accepting observations.
    ///
    /// Must be called from inside a tokio runtime; the escalation timer is
    /// scheduled on it even when `update()` is later called from a plain thread.
    pub fn start(&self) -> Result<(), MonitorError> {
        let runtime = Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;

        let mut core = self.shared.core.lock();
        if core.running {
            return Err(MonitorError::AlreadyRunning);
        }

        core.reset();
        core.running = true;
        core.runtime = Some(runtime);
        self.shared.state.store(SecurityState::Safe.to_u8(), Ordering::Release);

        log::info!(
            "State machine started (escalation {:?}, zero tolerance {})",
            self.shared.escalation_delay,
            self.shared.zero_tolerance
        );
        Ok(())
    }

    /// Cancel any armed escalation and reset to `Safe`. Idempotent.
    /// Returns whether the machine was running.
    pub fn stop(&self) -> bool {
        let mut core = self.shared.core.lock();
        let was_running = core.running;

        core.reset();
        core.running = false;
        core.runtime = None;
        self.shared.state.store(SecurityState::Safe.to_u8(), Ordering::Release);

        if was_running {
            log::info!("State machine stopped");
        }
        was_running
    }

    /// Feed one face count. Negative counts are treated as zero.
    pub fn update(&self, count: i32) -> Option<TransitionEvent> {
        self.update_count(count.max(0) as u32)
    }

    fn update_count(&self, count: u32) -> Option<TransitionEvent> {
        let event = {
            let mut core = self.shared.core.lock();
            if !core.running {
                log::debug!("Observation {} ignored, state machine not running", count);
                return None;
            }
            self.shared.apply(&mut core, count)
        };

        self.shared.flush();
        event
    }

    /// Lock-free read of the current state
    pub fn current_state(&self) -> SecurityState {
        SecurityState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.shared.core.lock().running
    }

    pub fn escalation_pending(&self) -> bool {
        self.shared.core.lock().pending.is_some()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let core = self.shared.core.lock();
        StateSnapshot {
            state: core.state,
            running: core.running,
            since: core.since,
            escalation_pending: core.pending.is_some(),
            consecutive_zeros: core.consecutive_zeros,
            last_nonzero_count: core.last_nonzero,
        }
    }
}

impl ObservationSink for SecurityStateMachine {
    fn observe(&self, count: u32) -> Option<TransitionEvent> {
        self.update_count(count)
    }
}

// ============================================================================
// DECISION LOGIC
// ============================================================================

impl Shared {
    fn apply(self: &Arc<Self>, core: &mut Core, count: u32) -> Option<TransitionEvent> {
        let effective = if count == 0 {
            core.consecutive_zeros = core.consecutive_zeros.saturating_add(1);

            if core.consecutive_zeros >= self.zero_tolerance {
                if core.last_nonzero.take().is_some() {
                    log::debug!(
                        "[SENSOR] {} consecutive empty observations, dropping last count",
                        core.consecutive_zeros
                    );
                }
                core.cancel_pending();
                return self.transition(core, SecurityState::Error, TransitionCause::Observation);
            }

            // Transient glitch: reuse the last real count
            match core.last_nonzero {
                Some(last) => last,
                None => return None,
            }
        } else {
            core.consecutive_zeros = 0;
            core.last_nonzero = Some(count);
            count
        };

        self.evaluate(core, effective)
    }

    fn evaluate(self: &Arc<Self>, core: &mut Core, count: u32) -> Option<TransitionEvent> {
        if count == 1 {
            core.cancel_pending();
            return self.transition(core, SecurityState::Safe, TransitionCause::Observation);
        }

        match core.state {
            SecurityState::Safe | SecurityState::Error => {
                let event = self.transition(core, SecurityState::Warning, TransitionCause::Observation);
                self.arm(core);
                event
            }
            // Timer already armed / already escalated
            SecurityState::Warning | SecurityState::Alert => None,
        }
    }

    fn transition(
        &self,
        core: &mut Core,
        to: SecurityState,
        cause: TransitionCause,
    ) -> Option<TransitionEvent> {
        if core.state == to {
            return None;
        }

        let event = TransitionEvent::new(core.state, to, cause);
        core.state = to;
        core.since = event.timestamp;
        self.state.store(to.to_u8(), Ordering::Release);
        self.outbox.lock().push_back(event.clone());

        match to {
            SecurityState::Alert => log::warn!(
                "[ALERT] Additional viewer present for {:?}: {} -> {}",
                self.escalation_delay, event.previous_state, to
            ),
            SecurityState::Error => log::warn!(
                "[SENSOR] No face seen in {} observations: {} -> {}",
                core.consecutive_zeros, event.previous_state, to
            ),
            _ => log::info!("State {} -> {}", event.previous_state, to),
        }

        Some(event)
    }

    fn arm(self: &Arc<Self>, core: &mut Core) {
        core.cancel_pending();

        let Some(runtime) = core.runtime.as_ref() else {
            return;
        };

        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Shared> = Arc::downgrade(self);
        let task = DeferredTask::schedule(runtime, id, self.escalation_delay, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_escalation_timer(id);
            }
        });

        log::debug!("[ESCALATION] Timer #{} armed for {:?}", id, self.escalation_delay);
        core.pending = Some(task);
    }

    fn on_escalation_timer(self: &Arc<Self>, id: u64) {
        self.fire_escalation(id);
        self.flush();
    }

    fn fire_escalation(self: &Arc<Self>, id: u64) {
        let mut core = self.core.lock();

        match core.pending.as_ref() {
            Some(task) if task.id() == id => {}
            _ => {
                log::debug!("[ESCALATION] Stale timer #{} ignored", id);
                return;
            }
        }
        core.pending = None;

        let still_crowded = core.last_nonzero.is_some_and(|c| c >= 2);
        if !core.running || core.state != SecurityState::Warning || !still_crowded {
            log::debug!("[ESCALATION] Timer #{} fired outside Warning, no-op", id);
            return;
        }

        self.transition(&mut core, SecurityState::Alert, TransitionCause::Escalation);
    }

    /// Deliver queued transitions. Must be called without holding `core`.
    ///
    /// Whoever holds `publishing` drains the queue; everyone else leaves their
    /// event for it. The re-check after releasing closes the gap where an event
    /// is queued just as the drainer finds the queue empty.
    fn flush(&self) {
        loop {
            let Some(publishing) = self.publishing.try_lock() else {
                return;
            };

            loop {
                let next = self.outbox.lock().pop_front();
                let Some(event) = next else {
                    break;
                };
                let listeners: Vec<Arc<dyn TransitionListener>> = self.listeners.read().clone();
                for listener in listeners {
                    listener.on_transition(&event);
                }
            }

            drop(publishing);
            if self.outbox.lock().is_empty() {
                return;
            }
        }
    }
}
