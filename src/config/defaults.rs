//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// API server root (default: http://localhost:8080)
    pub base_url: String,

    /// Per-request timeout in seconds (default: 30)
    pub timeout_seconds: u64,

    /// Jobs list refresh (default: 3s)
    pub jobs_ms: u64,

    /// Worker roster refresh (default: 5s)
    pub workers_ms: u64,

    /// Per-job run history refresh (default: 15s)
    pub job_runs_ms: u64,

    /// Runs page refresh, user selectable (default: 2s)
    pub runs_ms: u64,

    /// Rows requested by the runs page (default: 100)
    pub runs_limit: u64,

    /// Heartbeat age after which a worker shows offline (default: 20s)
    pub liveness_threshold_ms: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_seconds: 30,
            jobs_ms: 3_000,
            workers_ms: 5_000,
            job_runs_ms: 15_000,
            runs_ms: 2_000,
            runs_limit: 100,
            liveness_threshold_ms: dromio_model::LIVENESS_THRESHOLD_MS as u64,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "api": {
                "base_url": self.base_url,
                "timeout_seconds": self.timeout_seconds
            },
            "poll": {
                "jobs_ms": self.jobs_ms,
                "workers_ms": self.workers_ms,
                "job_runs_ms": self.job_runs_ms,
                "runs_ms": self.runs_ms
            },
            "runs": {
                "limit": self.runs_limit
            },
            "workers": {
                "liveness_threshold_ms": self.liveness_threshold_ms
            }
        })
    }
}
