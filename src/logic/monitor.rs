//! Monitor - owns and wires the decision pipeline
//!
//! ```text
//! sensor ──► ObservationThrottle ──► SecurityStateMachine ──┬──► AlertDurationTracker ──┐
//!                                                            └──► NotificationDispatcher ◄┘ ──► Notifier
//! ```
//!
//! Built once by the host and shared by handle; there is no global instance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use super::config::MonitorConfig;
use super::error::MonitorError;
use super::notify::{NotificationDispatcher, NotificationRecord, Notifier};
use super::state::{SecurityState, SecurityStateMachine, TransitionListener};
use super::status::{MonitorStatus, PersistenceStatus};
use super::throttle::{ObservationThrottle, SubmitOutcome};
use super::tracker::{AlertDurationTracker, PersistentThreat};

pub struct Monitor {
    config: MonitorConfig,
    machine: Arc<SecurityStateMachine>,
    throttle: Arc<ObservationThrottle>,
    tracker: Arc<AlertDurationTracker>,
    dispatcher: Arc<NotificationDispatcher>,
    running: AtomicBool,
    lifecycle: Mutex<()>,
}

impl Monitor {
    pub fn new(config: MonitorConfig, notifier: Arc<dyn Notifier>) -> Result<Self, MonitorError> {
        config.validate()?;

        let machine = Arc::new(SecurityStateMachine::new(&config));
        let throttle = Arc::new(ObservationThrottle::new(&config, machine.clone()));
        let tracker = Arc::new(AlertDurationTracker::new(&config));
        let dispatcher = Arc::new(NotificationDispatcher::new(&config, notifier));

        // Tracker first so the persistence window is settled before anyone is notified
        machine.add_listener(tracker.clone());
        machine.add_listener(dispatcher.clone());

        let sink = Arc::downgrade(&dispatcher);
        tracker.on_persistent_threat(Arc::new(move |threat: &PersistentThreat| {
            if let Some(dispatcher) = sink.upgrade() {
                dispatcher.on_persistent_threat(threat);
            }
        }));

        Ok(Self {
            config,
            machine,
            throttle,
            tracker,
            dispatcher,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
        })
    }

    /// Begin monitoring. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<(), MonitorError> {
        let _guard = self.lifecycle.lock();
        if self.running.load(Ordering::Acquire) {
            return Err(MonitorError::AlreadyRunning);
        }

        self.throttle.reset();
        self.dispatcher.reset();
        self.tracker.start();
        if let Err(e) = self.machine.start() {
            self.tracker.stop();
            return Err(e);
        }

        self.running.store(true, Ordering::Release);
        log::info!("Screen monitoring started");
        Ok(())
    }

    /// Stop monitoring and tear down timers. Idempotent; returns whether
    /// monitoring was running.
    pub fn stop(&self) -> bool {
        let _guard = self.lifecycle.lock();
        let was_running = self.running.swap(false, Ordering::AcqRel);

        self.machine.stop();
        self.tracker.stop();
        self.dispatcher.reset();
        self.throttle.reset();

        if was_running {
            log::info!("Screen monitoring stopped");
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Offer one sensor frame, stamped now
    pub fn submit(&self, face_count: Option<i32>) -> SubmitOutcome {
        self.submit_at(face_count, Instant::now())
    }

    pub fn submit_at(&self, face_count: Option<i32>, arrival: Instant) -> SubmitOutcome {
        self.throttle.submit(face_count, arrival)
    }

    /// Callback to hand to the face detector
    pub fn sensor_callback(self: &Arc<Self>) -> impl Fn(Option<i32>) + Send + Sync + 'static {
        let monitor = Arc::downgrade(self);
        move |face_count| {
            if let Some(monitor) = monitor.upgrade() {
                monitor.submit(face_count);
            }
        }
    }

    pub fn current_state(&self) -> SecurityState {
        self.machine.current_state()
    }

    pub fn is_persistent_threat(&self) -> bool {
        self.tracker.is_persistent()
    }

    pub fn subscribe_persistent(&self) -> watch::Receiver<bool> {
        self.tracker.subscribe()
    }

    /// Extra transition listener (e.g. an overlay controller)
    pub fn add_listener(&self, listener: Arc<dyn TransitionListener>) {
        self.machine.add_listener(listener);
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn notification_history(&self) -> Vec<NotificationRecord> {
        self.dispatcher.history()
    }

    pub fn status(&self) -> MonitorStatus {
        let snapshot = self.machine.snapshot();
        MonitorStatus {
            running: self.is_running(),
            state: snapshot.state,
            state_since: snapshot.since,
            escalation_pending: snapshot.escalation_pending,
            consecutive_zeros: snapshot.consecutive_zeros,
            last_face_count: snapshot.last_nonzero_count,
            persistence: PersistenceStatus {
                tracking: self.tracker.is_tracking(),
                alert_started_at: self.tracker.alert_started_at(),
                persistent_threat: self.tracker.is_persistent(),
                detections: self.tracker.detections(),
            },
            throttle: self.throttle.stats(),
            notifications_sent: self.dispatcher.dispatched(),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::logic::notify::NotifySeverity;

    #[derive(Default)]
    struct RecordingNotifier {
        calls: Mutex<Vec<(String, NotifySeverity)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, _body: &str, severity: NotifySeverity) {
            self.calls.lock().push((title.to_string(), severity));
        }
    }

    fn monitor() -> (Arc<Monitor>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let config = MonitorConfig {
            frame_skip: 1,
            min_decision_interval_ms: 0,
            ..Default::default()
        };
        let monitor = Arc::new(Monitor::new(config, notifier.clone()).unwrap());
        monitor.start().unwrap();
        (monitor, notifier)
    }

    async fn settle(d: Duration) {
        tokio::time::sleep(d).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    async fn feed_for(monitor: &Monitor, count: i32, total: Duration) {
        let step = Duration::from_millis(100);
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            monitor.submit(Some(count));
            settle(step).await;
            elapsed += step;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_threat_lifecycle() {
        let (monitor, notifier) = monitor();
        let mut persistent = monitor.subscribe_persistent();

        feed_for(&monitor, 2, Duration::from_millis(2_100)).await;
        assert_eq!(monitor.current_state(), SecurityState::Alert);
        assert!(monitor.status().persistence.tracking);

        feed_for(&monitor, 2, Duration::from_secs(60)).await;
        assert!(monitor.is_persistent_threat());
        assert!(*persistent.borrow_and_update());

        monitor.submit(Some(1));
        assert_eq!(monitor.current_state(), SecurityState::Safe);
        assert!(!monitor.is_persistent_threat());

        let calls = notifier.calls.lock().clone();
        let severities: Vec<NotifySeverity> = calls.iter().map(|(_, s)| *s).collect();
        assert_eq!(
            severities,
            vec![NotifySeverity::Info, NotifySeverity::Critical, NotifySeverity::Critical]
        );
        assert_eq!(calls[2].0, "Ongoing screen exposure");
        assert_eq!(monitor.status().notifications_sent, 3);

        let history = monitor.notification_history();
        let states: Vec<Option<SecurityState>> = history.iter().map(|r| r.state).collect();
        assert_eq!(states, vec![None, Some(SecurityState::Alert), Some(SecurityState::Warning)]);
        assert_eq!(monitor.config().frame_skip, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_callback_feeds_pipeline() {
        let (monitor, _notifier) = monitor();
        let callback = monitor.sensor_callback();

        callback(Some(3));
        assert_eq!(monitor.current_state(), SecurityState::Warning);

        callback(None);
        assert_eq!(monitor.status().consecutive_zeros, 1);
        assert_eq!(monitor.current_state(), SecurityState::Warning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifecycle_errors_and_stop() {
        let (monitor, notifier) = monitor();
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyRunning)));

        feed_for(&monitor, 2, Duration::from_millis(2_100)).await;
        assert_eq!(monitor.current_state(), SecurityState::Alert);

        assert!(monitor.stop());
        assert!(!monitor.stop());
        assert_eq!(monitor.current_state(), SecurityState::Safe);
        assert!(!monitor.status().persistence.tracking);

        settle(Duration::from_secs(120)).await;
        assert!(!monitor.is_persistent_threat());
        assert_eq!(notifier.calls.lock().len(), 2);

        // Restart gets a fresh gate: Warning notifies again
        monitor.start().unwrap();
        monitor.submit(Some(2));
        assert_eq!(notifier.calls.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_throttle_limits_decisions() {
        let notifier = Arc::new(RecordingNotifier::default());
        let monitor = Monitor::new(MonitorConfig::default(), notifier).unwrap();
        monitor.start().unwrap();

        // 30 fps for one second
        for _ in 0..30 {
            monitor.submit(Some(1));
            settle(Duration::from_millis(33)).await;
        }

        let stats = monitor.status().throttle;
        assert_eq!(stats.received, 30);
        assert!(stats.forwarded <= 6, "forwarded {}", stats.forwarded);
        assert!(stats.forwarded >= 3, "forwarded {}", stats.forwarded);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MonitorConfig {
            frame_skip: 0,
            ..Default::default()
        };
        assert!(matches!(
            Monitor::new(config, Arc::new(crate::logic::notify::LogNotifier)),
            Err(MonitorError::Config(_))
        ));
    }
}
