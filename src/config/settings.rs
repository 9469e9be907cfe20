//! Typed view over the merged configuration

use serde::Deserialize;
use std::time::Duration;

use crate::sync::{PollRate, RefreshInterval};

use super::effective::{ConfigError, EffectiveConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout: Duration,
}

/// Refresh cadence per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub jobs: RefreshInterval,
    pub workers: RefreshInterval,
    pub job_runs: RefreshInterval,
    pub runs: PollRate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSettings {
    pub api: ApiSettings,
    pub poll: PollSettings,
    pub runs_limit: u32,
    pub liveness_threshold_ms: i64,
}

// Mirrors the merged JSON document; every key is present after layer 1.
#[derive(Deserialize)]
struct RawSettings {
    api: RawApi,
    poll: RawPoll,
    runs: RawRuns,
    workers: RawWorkers,
}

#[derive(Deserialize)]
struct RawApi {
    base_url: String,
    timeout_seconds: u64,
}

#[derive(Deserialize)]
struct RawPoll {
    jobs_ms: u64,
    workers_ms: u64,
    job_runs_ms: u64,
    runs_ms: u64,
}

#[derive(Deserialize)]
struct RawRuns {
    limit: u32,
}

#[derive(Deserialize)]
struct RawWorkers {
    liveness_threshold_ms: i64,
}

impl ConsoleSettings {
    pub fn from_effective(config: &EffectiveConfig) -> Result<Self, ConfigError> {
        let raw: RawSettings = serde_json::from_value(config.config.clone())
            .map_err(|e| ConfigError::ValidationError(format!("Malformed settings: {}", e)))?;

        let runs = PollRate::from_millis(raw.poll.runs_ms).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "poll.runs_ms must be one of 0, 200, 1000, 2000, 10000 (got {})",
                raw.poll.runs_ms
            ))
        })?;

        Ok(Self {
            api: ApiSettings {
                base_url: raw.api.base_url.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(raw.api.timeout_seconds),
            },
            poll: PollSettings {
                jobs: RefreshInterval::from_millis(raw.poll.jobs_ms),
                workers: RefreshInterval::from_millis(raw.poll.workers_ms),
                job_runs: RefreshInterval::from_millis(raw.poll.job_runs_ms),
                runs,
            },
            runs_limit: raw.runs.limit,
            liveness_threshold_ms: raw.workers.liveness_threshold_ms,
        })
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            api: ApiSettings {
                base_url: "http://localhost:8080".to_string(),
                timeout: Duration::from_secs(30),
            },
            poll: PollSettings {
                jobs: RefreshInterval::from_millis(3_000),
                workers: RefreshInterval::from_millis(5_000),
                job_runs: RefreshInterval::from_millis(15_000),
                runs: PollRate::Normal,
            },
            runs_limit: 100,
            liveness_threshold_ms: dromio_model::LIVENESS_THRESHOLD_MS,
        }
    }
}
