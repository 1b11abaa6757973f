//! Error types
//!
//! The decision path itself never fails. Only configuration loading and
//! lifecycle misuse surface as errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitoring is already running")]
    AlreadyRunning,

    #[error("No tokio runtime available to schedule timers")]
    NoRuntime,

    #[error(transparent)]
    Config(#[from] ConfigError),
}
