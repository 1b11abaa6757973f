//! Notifier - external sink for user-facing alerts

use serde::{Deserialize, Serialize};

/// Urgency of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifySeverity {
    Info,
    Critical,
}

impl NotifySeverity {
    pub fn tag(&self) -> &'static str {
        match self {
            NotifySeverity::Info => "[INFO]",
            NotifySeverity::Critical => "[CRITICAL]",
        }
    }
}

/// Whatever actually shows the message (desktop toast, banner, webhook...)
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str, severity: NotifySeverity);
}

/// Headless notifier that writes through the logger
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str, severity: NotifySeverity) {
        match severity {
            NotifySeverity::Info => log::info!("{} {}: {}", severity.tag(), title, body),
            NotifySeverity::Critical => log::warn!("{} {}: {}", severity.tag(), title, body),
        }
    }
}
