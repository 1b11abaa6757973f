//! Alert Duration Tracker
//!
//! Measures how long the machine has stayed in `Alert` and raises a
//! persistent-threat signal once the dwell crosses the threshold. Pure
//! duration gate: it never feeds back into the security state.
//!
//! The persistent flag only changes under the window lock, so a close racing
//! a late poll can never leave it raised for a window that no longer exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::config::MonitorConfig;
use super::state::{SecurityState, TransitionEvent, TransitionListener};

/// Emitted once per unbroken Alert dwell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentThreat {
    pub alert_started_at: DateTime<Utc>,
    pub detected_at: DateTime<Utc>,
    pub dwell_secs: u64,
}

pub type PersistentThreatCallback = Arc<dyn Fn(&PersistentThreat) + Send + Sync>;

// ============================================================================
// STATE
// ============================================================================

struct OpenWindow {
    started: Instant,
    started_at: DateTime<Utc>,
    fired: bool,
}

#[derive(Default)]
struct Window {
    open: Option<OpenWindow>,
    generation: u64,
    poller: Option<AbortHandle>,
}

struct Shared {
    threshold: Duration,
    poll: Duration,
    window: Mutex<Window>,
    runtime: Mutex<Option<Handle>>,
    persistent: watch::Sender<bool>,
    callbacks: RwLock<Vec<PersistentThreatCallback>>,
    detections: AtomicU64,
}

// ============================================================================
// TRACKER
// ============================================================================

pub struct AlertDurationTracker {
    shared: Arc<Shared>,
}

impl AlertDurationTracker {
    pub fn new(config: &MonitorConfig) -> Self {
        let (persistent, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                threshold: config.persistent_threshold(),
                poll: config.persistence_poll(),
                window: Mutex::new(Window::default()),
                runtime: Mutex::new(None),
                persistent,
                callbacks: RwLock::new(Vec::new()),
                detections: AtomicU64::new(0),
            }),
        }
    }

    /// Capture the current tokio runtime for the poll task.
    /// Without it, windows still open but only `check()` can fire them.
    pub fn start(&self) {
        self.shared.close_window();
        *self.shared.runtime.lock() = Handle::try_current().ok();
    }

    /// Close any open window and drop the runtime handle. Idempotent.
    pub fn stop(&self) {
        self.shared.close_window();
        *self.shared.runtime.lock() = None;
    }

    /// Register a push listener for `PersistentThreatDetected`
    pub fn on_persistent_threat(&self, callback: PersistentThreatCallback) {
        self.shared.callbacks.write().push(callback);
    }

    /// Pollable persistent-threat flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shared.persistent.subscribe()
    }

    pub fn is_persistent(&self) -> bool {
        *self.shared.persistent.borrow()
    }

    pub fn is_tracking(&self) -> bool {
        self.shared.window.lock().open.is_some()
    }

    pub fn alert_started_at(&self) -> Option<DateTime<Utc>> {
        self.shared.window.lock().open.as_ref().map(|w| w.started_at)
    }

    /// Current Alert dwell, if a window is open
    pub fn alert_duration(&self, now: Instant) -> Option<Duration> {
        self.shared
            .window
            .lock()
            .open
            .as_ref()
            .map(|w| now.saturating_duration_since(w.started))
    }

    /// Number of persistent threats raised since creation
    pub fn detections(&self) -> u64 {
        self.shared.detections.load(Ordering::Relaxed)
    }

    /// Evaluate the open window at `now`. Returns `true` only on the call
    /// that raised the signal.
    pub fn check(&self, now: Instant) -> bool {
        self.shared.check(now)
    }
}

impl TransitionListener for AlertDurationTracker {
    fn on_transition(&self, event: &TransitionEvent) {
        if event.new_state == SecurityState::Alert {
            self.shared.open_window(event);
        } else {
            self.shared.close_window();
        }
    }
}

impl Shared {
    fn open_window(self: &Arc<Self>, event: &TransitionEvent) {
        let mut window = self.window.lock();
        if window.open.is_some() {
            return;
        }

        window.generation += 1;
        window.open = Some(OpenWindow {
            started: event.at,
            started_at: event.timestamp,
            fired: false,
        });
        log::debug!("Alert window #{} opened", window.generation);

        let runtime = self.runtime.lock().clone();
        match runtime {
            Some(rt) => {
                let generation = window.generation;
                let weak = Arc::downgrade(self);
                let poll = self.poll;
                let task = rt.spawn(poll_window(weak, generation, poll));
                window.poller = Some(task.abort_handle());
            }
            None => log::debug!("No runtime for alert poller, relying on manual checks"),
        }
    }

    fn close_window(&self) {
        let mut window = self.window.lock();
        if let Some(poller) = window.poller.take() {
            poller.abort();
        }
        if let Some(closed) = window.open.take() {
            log::debug!(
                "Alert window #{} closed (persistent: {})",
                window.generation,
                closed.fired
            );
        }
        self.persistent.send_if_modified(|flag| std::mem::replace(flag, false));
    }

    fn check(&self, now: Instant) -> bool {
        let (threat, generation) = {
            let mut window = self.window.lock();
            let generation = window.generation;
            let Some(open) = window.open.as_mut() else {
                return false;
            };
            let dwell = now.saturating_duration_since(open.started);
            if open.fired || dwell < self.threshold {
                return false;
            }
            open.fired = true;

            let threat = PersistentThreat {
                alert_started_at: open.started_at,
                detected_at: Utc::now(),
                dwell_secs: dwell.as_secs(),
            };
            self.persistent.send_replace(true);
            (threat, generation)
        };

        self.detections.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "[PERSISTENT THREAT] Alert sustained for {}s (since {})",
            threat.dwell_secs,
            threat.alert_started_at.format("%H:%M:%S")
        );

        let callbacks: Vec<PersistentThreatCallback> = self.callbacks.read().clone();
        for callback in callbacks {
            if !self.window_open(generation) {
                log::debug!("Alert window #{} closed before dispatch, dropping signal", generation);
                break;
            }
            callback(&threat);
        }
        true
    }

    fn window_open(&self, generation: u64) -> bool {
        let window = self.window.lock();
        window.generation == generation && window.open.is_some()
    }

    /// Whether the poller for `generation` should keep running
    fn window_live(&self, generation: u64) -> bool {
        let window = self.window.lock();
        window.generation == generation && window.open.as_ref().is_some_and(|w| !w.fired)
    }
}

async fn poll_window(weak: Weak<Shared>, generation: u64, poll: Duration) {
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = weak.upgrade() else {
            break;
        };
        if !shared.window_live(generation) {
            break;
        }
        if shared.check(Instant::now()) {
            break;
        }
    }
}
