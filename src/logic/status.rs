use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SecurityState;
use super::throttle::ThrottleStats;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub state: SecurityState,
    pub state_since: DateTime<Utc>,
    pub escalation_pending: bool,
    pub consecutive_zeros: u32,
    pub last_face_count: Option<u32>,

    pub persistence: PersistenceStatus,
    pub throttle: ThrottleStats,
    pub notifications_sent: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceStatus {
    pub tracking: bool,
    pub alert_started_at: Option<DateTime<Utc>>,
    pub persistent_threat: bool,
    pub detections: u64,
}
