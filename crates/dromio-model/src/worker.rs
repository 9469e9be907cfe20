//! Worker heartbeat records and liveness

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::WorkerId;

/// Heartbeat age beyond which a worker is shown as offline.
pub const LIVENESS_THRESHOLD_MS: i64 = 20_000;

/// A worker as last reported by its heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub display_name: String,
    pub hostname: String,
    /// Max concurrent runs it can host
    pub capacity: u32,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub version: Option<String>,
}

impl WorkerRecord {
    /// Alive iff the last heartbeat is strictly younger than the threshold.
    /// Derived on every read; never stored.
    pub fn is_alive(&self, now: DateTime<Utc>) -> bool {
        self.is_alive_within(now, Duration::milliseconds(LIVENESS_THRESHOLD_MS))
    }

    pub fn is_alive_within(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        now - self.last_seen < threshold
    }

    pub fn status(&self, now: DateTime<Utc>, threshold: Duration) -> WorkerStatus {
        if self.is_alive_within(now, threshold) {
            WorkerStatus::Online
        } else {
            WorkerStatus::Offline
        }
    }

    /// Label used in run filters: `hostname-id`.
    pub fn filter_label(&self) -> String {
        format!("{}-{}", self.hostname, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Online,
    Offline,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Online => write!(f, "Online"),
            WorkerStatus::Offline => write!(f, "Offline"),
        }
    }
}
