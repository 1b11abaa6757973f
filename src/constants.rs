//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! Environment overrides are read through the helpers at the bottom.

/// Delay before a sustained Warning escalates to Alert (milliseconds)
pub const DEFAULT_ESCALATION_DELAY_MS: u64 = 2_000;

/// Consecutive zero-face observations tolerated before entering Error
pub const DEFAULT_ZERO_TOLERANCE: u32 = 10;

/// Minimum interval between two observations reaching the state machine (milliseconds)
pub const DEFAULT_MIN_DECISION_INTERVAL_MS: u64 = 200;

/// Process at most 1 of every N raw sensor frames
pub const DEFAULT_FRAME_SKIP: u32 = 3;

/// Alert dwell after which the threat is considered persistent (seconds)
pub const DEFAULT_PERSISTENT_THREAT_SECS: u64 = 60;

/// Minimum time between two user notifications (seconds)
pub const DEFAULT_NOTIFICATION_COOLDOWN_SECS: u64 = 5;

/// Resolution of the persistent-threat check (milliseconds)
pub const DEFAULT_PERSISTENCE_POLL_MS: u64 = 1_000;

/// Upper bounds accepted by `MonitorConfig::validate`
pub const MAX_ESCALATION_DELAY_MS: u64 = 600_000;
pub const MAX_MIN_DECISION_INTERVAL_MS: u64 = 60_000;
pub const MAX_PERSISTENT_THREAT_SECS: u64 = 86_400;
pub const MAX_NOTIFICATION_COOLDOWN_SECS: u64 = 86_400;
pub const MAX_PERSISTENCE_POLL_MS: u64 = 60_000;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Screen Guard";

/// Directory name under the platform config dir
pub const CONFIG_DIR_NAME: &str = "screen-guard";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.json";

// ============================================
// Helper functions to read from env with fallback
// ============================================

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Escalation delay from environment, if set
pub fn get_escalation_delay_ms() -> Option<u64> {
    env_parse("SCREEN_GUARD_ESCALATION_DELAY_MS")
}

/// Zero tolerance from environment, if set
pub fn get_zero_tolerance() -> Option<u32> {
    env_parse("SCREEN_GUARD_ZERO_TOLERANCE")
}

/// Minimum decision interval from environment, if set
pub fn get_min_decision_interval_ms() -> Option<u64> {
    env_parse("SCREEN_GUARD_MIN_INTERVAL_MS")
}

/// Frame skip factor from environment, if set
pub fn get_frame_skip() -> Option<u32> {
    env_parse("SCREEN_GUARD_FRAME_SKIP")
}

/// Persistent threat threshold from environment, if set
pub fn get_persistent_threat_secs() -> Option<u64> {
    env_parse("SCREEN_GUARD_PERSISTENT_SECS")
}

/// Notification cooldown from environment, if set
pub fn get_notification_cooldown_secs() -> Option<u64> {
    env_parse("SCREEN_GUARD_COOLDOWN_SECS")
}

/// Explicit config file path from environment
pub fn get_config_path_override() -> Option<String> {
    std::env::var("SCREEN_GUARD_CONFIG").ok().filter(|s| !s.trim().is_empty())
}

