//! Screen Guard Core
//!
//! Decides whether someone else is looking at a protected screen from a
//! stream of face counts, and raises throttled, cooldown-gated alerts.

pub mod constants;
pub mod logic;

pub use logic::config::MonitorConfig;
pub use logic::error::{ConfigError, MonitorError};
pub use logic::monitor::Monitor;
pub use logic::notify::{LogNotifier, Notifier, NotifySeverity};
pub use logic::state::{SecurityState, TransitionEvent, TransitionListener};
pub use logic::throttle::SubmitOutcome;
