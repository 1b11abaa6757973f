//! Notify Module
//!
//! - `gate`: cooldown + relevance filter
//! - `notifier`: external sink trait and the logging implementation
//! - `dispatcher`: listener glue between the state machine, the gate and the sink

pub mod gate;
pub mod notifier;
pub mod dispatcher;

pub use gate::NotificationGate;
pub use notifier::{LogNotifier, Notifier, NotifySeverity};
pub use dispatcher::{NotificationDispatcher, NotificationRecord};
