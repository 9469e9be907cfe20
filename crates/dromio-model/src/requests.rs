//! Request and query shapes sent to the API

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::{JobId, WorkerId};
use crate::misfire::MisfirePolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub name: String,
    pub schedule_cron: Option<String>,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misfire_policy: Option<MisfirePolicy>,
}

/// Schedule edit for an update request.
///
/// On the wire: field absent, explicit `null`, or a string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ScheduleUpdate {
    #[default]
    Keep,
    Clear,
    Set(String),
}

impl ScheduleUpdate {
    pub fn is_keep(&self) -> bool {
        matches!(self, ScheduleUpdate::Keep)
    }

    /// Form semantics: an empty cron box clears the schedule.
    pub fn from_form(cron: &str) -> Self {
        let trimmed = cron.trim();
        if trimmed.is_empty() {
            ScheduleUpdate::Clear
        } else {
            ScheduleUpdate::Set(trimmed.to_string())
        }
    }
}

impl Serialize for ScheduleUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScheduleUpdate::Set(cron) => serializer.serialize_str(cron),
            ScheduleUpdate::Keep | ScheduleUpdate::Clear => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for ScheduleUpdate {
    // Only reached when the field is present; absence is `Keep` via default.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<String>::deserialize(deserializer)? {
            Some(cron) => ScheduleUpdate::Set(cron),
            None => ScheduleUpdate::Clear,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateJobRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "ScheduleUpdate::is_keep")]
    pub schedule_cron: ScheduleUpdate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misfire_policy: Option<MisfirePolicy>,
}

/// Filters for `GET /runs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRunsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_worker_id: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,
}

impl ListRunsQuery {
    pub fn for_job(job_id: JobId) -> Self {
        Self {
            by_job_id: Some(job_id),
            ..Self::default()
        }
    }

    pub fn with_worker(mut self, worker_id: WorkerId) -> Self {
        self.by_worker_id = Some(worker_id);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Query-string pairs in a stable order; unset filters are omitted.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(job) = &self.by_job_id {
            pairs.push(("byJobId".to_string(), job.to_string()));
        }
        if let Some(worker) = &self.by_worker_id {
            pairs.push(("byWorkerId".to_string(), worker.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(after) = self.after {
            pairs.push(("after".to_string(), after.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        if let Some(before) = self.before {
            pairs.push(("before".to_string(), before.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }
        pairs
    }
}
