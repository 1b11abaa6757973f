//! Observation Throttle
//!
//! Bounds how often raw sensor frames reach the state machine. A frame is
//! forwarded only when nothing else is in flight, the skip counter has reached
//! N, and the minimum interval has passed since the last forward. Everything
//! else is dropped on the floor: no queue, no "latest wins".

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::config::MonitorConfig;
use super::state::TransitionEvent;

/// Anything that consumes forwarded face counts
pub trait ObservationSink: Send + Sync {
    fn observe(&self, count: u32) -> Option<TransitionEvent>;
}

/// What happened to one submission
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Reached the sink; carries the transition it caused, if any
    Forwarded(Option<TransitionEvent>),
    /// Skip counter has not reached N yet
    Skipped,
    /// Another forward is in flight
    Busy,
    /// Minimum decision interval not elapsed
    TooSoon,
}

impl SubmitOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, SubmitOutcome::Forwarded(_))
    }
}

/// Counters since the last reset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleStats {
    pub received: u64,
    pub forwarded: u64,
    pub skipped: u64,
    pub busy: u64,
    pub too_soon: u64,
}

pub struct ObservationThrottle {
    sink: Arc<dyn ObservationSink>,
    frame_skip: u32,
    min_interval: Duration,

    in_flight: AtomicBool,
    skip_counter: AtomicU32,
    last_forward: Mutex<Option<Instant>>,

    received: AtomicU64,
    forwarded: AtomicU64,
    skipped: AtomicU64,
    busy: AtomicU64,
    too_soon: AtomicU64,
}

impl ObservationThrottle {
    pub fn new(config: &MonitorConfig, sink: Arc<dyn ObservationSink>) -> Self {
        Self {
            sink,
            frame_skip: config.frame_skip.max(1),
            min_interval: config.min_decision_interval(),
            in_flight: AtomicBool::new(false),
            skip_counter: AtomicU32::new(0),
            last_forward: Mutex::new(None),
            received: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            too_soon: AtomicU64::new(0),
        }
    }

    /// Offer one raw frame. Never blocks; a missing or negative count is `0`.
    pub fn submit(&self, raw_count: Option<i32>, arrival: Instant) -> SubmitOutcome {
        self.received.fetch_add(1, Ordering::Relaxed);
        let count = raw_count.unwrap_or(0).max(0) as u32;

        let seen = self.skip_counter.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if seen < self.frame_skip {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            log::trace!("Frame skipped ({}/{})", seen, self.frame_skip);
            return SubmitOutcome::Skipped;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.busy.fetch_add(1, Ordering::Relaxed);
            return SubmitOutcome::Busy;
        }

        {
            let mut last = self.last_forward.lock();
            if let Some(prev) = *last {
                if arrival.saturating_duration_since(prev) < self.min_interval {
                    drop(last);
                    self.in_flight.store(false, Ordering::Release);
                    self.too_soon.fetch_add(1, Ordering::Relaxed);
                    return SubmitOutcome::TooSoon;
                }
            }
            *last = Some(arrival);
        }

        // Saturated counter stays saturated until something is forwarded
        self.skip_counter.store(0, Ordering::Release);
        self.forwarded.fetch_add(1, Ordering::Relaxed);

        let event = self.sink.observe(count);
        self.in_flight.store(false, Ordering::Release);

        SubmitOutcome::Forwarded(event)
    }

    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            too_soon: self.too_soon.load(Ordering::Relaxed),
        }
    }

    /// Clear counters and timing so the next run starts fresh
    pub fn reset(&self) {
        self.skip_counter.store(0, Ordering::Release);
        *self.last_forward.lock() = None;
        self.received.store(0, Ordering::Relaxed);
        self.forwarded.store(0, Ordering::Relaxed);
        self.skipped.store(0, Ordering::Relaxed);
        self.busy.store(0, Ordering::Relaxed);
        self.too_soon.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<u32>>,
    }

    impl ObservationSink for RecordingSink {
        fn observe(&self, count: u32) -> Option<TransitionEvent> {
            self.seen.lock().push(count);
            None
        }
    }

    fn throttle(frame_skip: u32, interval_ms: u64) -> (ObservationThrottle, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let config = MonitorConfig {
            frame_skip,
            min_decision_interval_ms: interval_ms,
            ..Default::default()
        };
        (ObservationThrottle::new(&config, sink.clone()), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_every_nth_frame() {
        let (throttle, sink) = throttle(3, 0);
        let start = Instant::now();

        let outcomes: Vec<bool> = (0..9)
            .map(|i| throttle.submit(Some(i), start + Duration::from_millis(i as u64 * 10)).is_forwarded())
            .collect();

        assert_eq!(outcomes, vec![false, false, true, false, false, true, false, false, true]);
        assert_eq!(*sink.seen.lock(), vec![2, 5, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_enforced() {
        let (throttle, sink) = throttle(1, 200);
        let start = Instant::now();

        assert!(throttle.submit(Some(1), start).is_forwarded());
        assert!(matches!(
            throttle.submit(Some(2), start + Duration::from_millis(150)),
            SubmitOutcome::TooSoon
        ));
        assert!(throttle.submit(Some(3), start + Duration::from_millis(200)).is_forwarded());

        assert_eq!(*sink.seen.lock(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_counter_forwards_next_eligible_frame() {
        let (throttle, sink) = throttle(3, 200);
        let start = Instant::now();

        for i in 0..3 {
            throttle.submit(Some(1), start + Duration::from_millis(i * 30));
        }
        // Third frame forwarded at 60ms; the next three land inside the interval
        for i in 3..6 {
            throttle.submit(Some(2), start + Duration::from_millis(i * 30));
        }
        assert_eq!(sink.seen.lock().len(), 1);

        // Counter already at N, so the first frame past the interval goes through
        assert!(throttle.submit(Some(4), start + Duration::from_millis(300)).is_forwarded());
        assert_eq!(*sink.seen.lock(), vec![1, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_counts_become_zero() {
        let (throttle, sink) = throttle(1, 0);
        let start = Instant::now();

        throttle.submit(None, start);
        throttle.submit(Some(-3), start + Duration::from_millis(1));
        assert_eq!(*sink.seen.lock(), vec![0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_and_reset() {
        let (throttle, _sink) = throttle(2, 100);
        let start = Instant::now();

        throttle.submit(Some(1), start);
        throttle.submit(Some(1), start);
        throttle.submit(Some(1), start + Duration::from_millis(10));
        throttle.submit(Some(1), start + Duration::from_millis(20));

        let stats = throttle.stats();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.forwarded, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.too_soon, 1);

        throttle.reset();
        assert_eq!(throttle.stats(), ThrottleStats::default());
    }

    /// Sink that blocks until released, to hold a forward in flight
    struct GatedSink {
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ObservationSink for GatedSink {
        fn observe(&self, _count: u32) -> Option<TransitionEvent> {
            if let Some(tx) = self.entered.lock().take() {
                let _ = tx.send(());
            }
            let _ = self.release.lock().recv();
            None
        }
    }

    #[test]
    fn test_concurrent_submit_reports_busy() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = Arc::new(GatedSink {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        });
        let config = MonitorConfig {
            frame_skip: 1,
            min_decision_interval_ms: 0,
            ..Default::default()
        };
        let throttle = Arc::new(ObservationThrottle::new(&config, sink));

        let worker = {
            let throttle = throttle.clone();
            std::thread::spawn(move || throttle.submit(Some(2), Instant::now()).is_forwarded())
        };

        entered_rx.recv().unwrap();
        assert!(matches!(throttle.submit(Some(2), Instant::now()), SubmitOutcome::Busy));

        release_tx.send(()).unwrap();
        assert!(worker.join().unwrap());
        assert_eq!(throttle.stats().busy, 1);
    }
}
