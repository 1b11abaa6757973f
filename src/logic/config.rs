//! Monitor Configuration
//!
//! Defaults come from `constants.rs`, then an optional JSON file,
//! then `SCREEN_GUARD_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use super::error::ConfigError;

/// Tunables for the whole decision pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Warning -> Alert delay (ms)
    pub escalation_delay_ms: u64,
    /// Consecutive zero observations absorbed before Error
    pub zero_tolerance: u32,
    /// Minimum gap between forwarded observations (ms)
    pub min_decision_interval_ms: u64,
    /// Forward at most 1 of every N raw frames
    pub frame_skip: u32,
    /// Alert dwell that counts as a persistent threat (s)
    pub persistent_threat_secs: u64,
    /// Minimum gap between notifications (s)
    pub notification_cooldown_secs: u64,
    /// Persistent-threat poll resolution (ms)
    pub persistence_poll_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            escalation_delay_ms: DEFAULT_ESCALATION_DELAY_MS,
            zero_tolerance: DEFAULT_ZERO_TOLERANCE,
            min_decision_interval_ms: DEFAULT_MIN_DECISION_INTERVAL_MS,
            frame_skip: DEFAULT_FRAME_SKIP,
            persistent_threat_secs: DEFAULT_PERSISTENT_THREAT_SECS,
            notification_cooldown_secs: DEFAULT_NOTIFICATION_COOLDOWN_SECS,
            persistence_poll_ms: DEFAULT_PERSISTENCE_POLL_MS,
        }
    }
}

impl MonitorConfig {
    pub fn escalation_delay(&self) -> Duration {
        Duration::from_millis(self.escalation_delay_ms)
    }

    pub fn min_decision_interval(&self) -> Duration {
        Duration::from_millis(self.min_decision_interval_ms)
    }

    pub fn persistent_threshold(&self) -> Duration {
        Duration::from_secs(self.persistent_threat_secs)
    }

    pub fn notification_cooldown(&self) -> Duration {
        Duration::from_secs(self.notification_cooldown_secs)
    }

    pub fn persistence_poll(&self) -> Duration {
        Duration::from_millis(self.persistence_poll_ms)
    }

    /// Load from a JSON file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the full layered configuration.
    ///
    /// A missing default file is not an error; a missing file named by
    /// `SCREEN_GUARD_CONFIG` is.
    pub fn resolve() -> Result<Self, ConfigError> {
        let mut config = match get_config_path_override() {
            Some(path) => Self::load_from_file(Path::new(&path))?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SCREEN_GUARD_*` overrides on top of the current values
    pub fn apply_env(&mut self) {
        if let Some(v) = get_escalation_delay_ms() {
            self.escalation_delay_ms = v;
        }
        if let Some(v) = get_zero_tolerance() {
            self.zero_tolerance = v;
        }
        if let Some(v) = get_min_decision_interval_ms() {
            self.min_decision_interval_ms = v;
        }
        if let Some(v) = get_frame_skip() {
            self.frame_skip = v;
        }
        if let Some(v) = get_persistent_threat_secs() {
            self.persistent_threat_secs = v;
        }
        if let Some(v) = get_notification_cooldown_secs() {
            self.notification_cooldown_secs = v;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zero_tolerance == 0 {
            return Err(ConfigError::Invalid {
                field: "zero_tolerance",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.frame_skip == 0 {
            return Err(ConfigError::Invalid {
                field: "frame_skip",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.persistence_poll_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "persistence_poll_ms",
                reason: "must be greater than 0".to_string(),
            });
        }

        let limits = [
            ("escalation_delay_ms", self.escalation_delay_ms, MAX_ESCALATION_DELAY_MS),
            ("min_decision_interval_ms", self.min_decision_interval_ms, MAX_MIN_DECISION_INTERVAL_MS),
            ("persistent_threat_secs", self.persistent_threat_secs, MAX_PERSISTENT_THREAT_SECS),
            ("notification_cooldown_secs", self.notification_cooldown_secs, MAX_NOTIFICATION_COOLDOWN_SECS),
            ("persistence_poll_ms", self.persistence_poll_ms, MAX_PERSISTENCE_POLL_MS),
        ];
        for (field, value, max) in limits {
            if value > max {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} exceeds maximum {}", value, max),
                });
            }
        }
        Ok(())
    }
}

/// `<config dir>/screen-guard/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
