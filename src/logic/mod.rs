//! Logic Module - Decision Pipeline
//!
//! Sensor frames flow through: throttle -> state machine -> {tracker, notify}.
//!
//! - `throttle` - rate/concurrency bound on raw sensor callbacks
//! - `state/` - Safe / Warning / Alert / Error decision engine
//! - `tracker` - sustained-Alert (persistent threat) detection
//! - `notify/` - cooldown gate and notifier dispatch
//! - `monitor` - owns and wires the above

pub mod config;
pub mod error;
pub mod timer;
pub mod throttle;
pub mod state;
pub mod tracker;
pub mod notify;
pub mod status;
pub mod monitor;
