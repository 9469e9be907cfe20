//! Job runs and the run state machine
//!
//! Run states: QUEUED → RUNNING → {SUCCEEDED | FAILED}, plus
//! QUEUED → CANCELLED as the only cancellation path the dashboard offers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::ids::{JobId, RunId, WorkerId};
use crate::job::JobSpec;

/// Run state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    /// Waiting for a worker to claim it
    Queued,
    /// Claimed and executing
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// A state this client does not know; rendered as "Unknown"
    Unknown,
}

impl RunState {
    /// No further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Cancelled
        )
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: RunState) -> bool {
        match (self, target) {
            (RunState::Queued, RunState::Running) => true,
            (RunState::Queued, RunState::Cancelled) => true,
            // a queued run can fail before starting, e.g. its worker died
            (RunState::Queued, RunState::Failed) => true,

            (RunState::Running, RunState::Succeeded) => true,
            (RunState::Running, RunState::Failed) => true,

            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
            RunState::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error for state strings outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job run state: {0}")]
pub struct UnknownRunState(pub String);

impl FromStr for RunState {
    type Err = UnknownRunState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunState::Queued),
            "running" => Ok(RunState::Running),
            "succeeded" => Ok(RunState::Succeeded),
            "failed" => Ok(RunState::Failed),
            "cancelled" => Ok(RunState::Cancelled),
            other => Err(UnknownRunState(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for RunState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        // One unfamiliar state must not fail the whole run list.
        Ok(raw.parse().unwrap_or(RunState::Unknown))
    }
}

/// Runner configuration captured when the run was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    pub job_name: String,
    pub meta: SnapshotMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotMeta {
    Shell(ShellSnapshot),
    Unknown(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSnapshot {
    #[serde(rename = "type")]
    kind: SnapshotShellTag,
    pub command: String,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl ShellSnapshot {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            kind: SnapshotShellTag::Shell,
            command: command.into(),
            working_dir: None,
            env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum SnapshotShellTag {
    #[serde(rename = "shell")]
    Shell,
}

impl SnapshotMeta {
    pub fn kind(&self) -> &str {
        match self {
            SnapshotMeta::Shell(_) => "shell",
            SnapshotMeta::Unknown(raw) => raw
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown"),
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            SnapshotMeta::Shell(shell) => Some(&shell.command),
            SnapshotMeta::Unknown(_) => None,
        }
    }
}

/// One execution of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: RunId,

    /// Weak reference; the job may have been deleted since.
    pub job_id: JobId,

    /// Absent while queued
    #[serde(default)]
    pub worker_id: Option<WorkerId>,

    pub state: RunState,

    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    /// Present only for completed shell runs
    #[serde(default)]
    pub exit_code: Option<i32>,

    #[serde(default)]
    pub output: Option<String>,

    #[serde(default)]
    pub error_output: Option<String>,

    #[serde(default)]
    pub snapshot: Option<RunSnapshot>,
}

impl JobRun {
    /// Waiting in the queue; the only state that can be cancelled.
    pub fn is_pending(&self) -> bool {
        self.state == RunState::Queued
    }

    /// Ran to completion, successfully or not. Cancelled runs are terminal
    /// but not finished.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, RunState::Succeeded | RunState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn can_cancel(&self) -> bool {
        self.is_pending()
    }

    pub fn can_rerun(&self) -> bool {
        !self.is_pending()
    }

    /// Output streams are only meaningful once the run is terminal.
    pub fn output(&self) -> Option<&str> {
        if self.is_terminal() {
            self.output.as_deref()
        } else {
            None
        }
    }

    pub fn error_output(&self) -> Option<&str> {
        if self.is_terminal() {
            self.error_output.as_deref()
        } else {
            None
        }
    }

    /// Command that ran: the dispatch snapshot when present, otherwise the
    /// live job's current command.
    pub fn display_command<'a>(&'a self, job: Option<&'a JobSpec>) -> Option<&'a str> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.meta.command())
            .or_else(|| job.and_then(|j| j.command()))
    }

    /// Wall time between start and finish.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// `scheduledFor ≤ startedAt ≤ finishedAt` over whichever are present.
    pub fn timeline_is_consistent(&self) -> bool {
        let points: Vec<DateTime<Utc>> = [self.scheduled_for, self.started_at, self.finished_at]
            .into_iter()
            .flatten()
            .collect();
        points.windows(2).all(|w| w[0] <= w[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn run(state: RunState) -> JobRun {
        JobRun {
            id: RunId::new("r1"),
            job_id: JobId::new("j1"),
            worker_id: None,
            state,
            scheduled_for: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
            output: Some("hello".to_string()),
            error_output: None,
            snapshot: None,
        }
    }

    #[test]
    fn test_pending_and_finished_predicates() {
        let queued = run(RunState::Queued);
        assert!(queued.is_pending());
        assert!(!queued.is_finished());

        for state in [RunState::Succeeded, RunState::Failed] {
            let r = run(state);
            assert!(r.is_finished());
            assert!(!r.is_pending());
        }

        for state in [RunState::Cancelled, RunState::Running] {
            let r = run(state);
            assert!(!r.is_finished());
            assert!(!r.is_pending());
        }
    }

    #[test]
    fn test_actions_offered() {
        assert!(run(RunState::Queued).can_cancel());
        assert!(!run(RunState::Queued).can_rerun());
        assert!(!run(RunState::Running).can_cancel());
        assert!(run(RunState::Running).can_rerun());
        assert!(run(RunState::Cancelled).can_rerun());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(RunState::Queued.can_transition_to(RunState::Running));
        assert!(RunState::Queued.can_transition_to(RunState::Cancelled));
        assert!(RunState::Running.can_transition_to(RunState::Succeeded));
        assert!(RunState::Running.can_transition_to(RunState::Failed));

        // running runs cannot be cancelled from the client
        assert!(!RunState::Running.can_transition_to(RunState::Cancelled));
        assert!(!RunState::Queued.can_transition_to(RunState::Succeeded));
        for terminal in [RunState::Succeeded, RunState::Failed, RunState::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(RunState::Running));
        }
    }

    #[test]
    fn test_unknown_state_does_not_fail_decode() {
        let parsed: JobRun = serde_json::from_value(json!({
            "id": "r9",
            "jobId": "j1",
            "state": "paused"
        }))
        .unwrap();
        assert_eq!(parsed.state, RunState::Unknown);
        assert_eq!(parsed.state.to_string(), "Unknown");
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn test_output_hidden_until_terminal() {
        assert_eq!(run(RunState::Running).output(), None);
        assert_eq!(run(RunState::Succeeded).output(), Some("hello"));
    }

    #[test]
    fn test_snapshot_command_wins_over_live_job() {
        let mut r = run(RunState::Succeeded);
        let job: JobSpec = serde_json::from_value(json!({
            "id": "j1",
            "name": "backup",
            "enabled": true,
            "runnerCfg": {"type": "shell", "command": "edited later"},
            "maxConcurrency": 1
        }))
        .unwrap();

        assert_eq!(r.display_command(Some(&job)), Some("edited later"));

        r.snapshot = Some(RunSnapshot {
            name: None,
            job_name: "backup".to_string(),
            meta: SnapshotMeta::Shell(ShellSnapshot::new("original")),
        });
        assert_eq!(r.display_command(Some(&job)), Some("original"));
        assert_eq!(r.display_command(None), Some("original"));
    }

    #[test]
    fn test_timeline_and_duration() {
        let mut r = run(RunState::Succeeded);
        r.scheduled_for = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        r.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 2).unwrap());
        r.finished_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 2).unwrap());
        assert!(r.timeline_is_consistent());
        assert_eq!(r.duration(), Some(Duration::seconds(60)));

        r.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap());
        assert!(!r.timeline_is_consistent());
    }

    #[test]
    fn test_snapshot_parsing() {
        let snap: RunSnapshot = serde_json::from_value(json!({
            "name": null,
            "jobName": "backup",
            "meta": {"type": "shell", "command": "pg_dump", "workingDir": null, "env": {"A": "1"}}
        }))
        .unwrap();
        assert_eq!(snap.meta.kind(), "shell");
        assert_eq!(snap.meta.command(), Some("pg_dump"));

        let other: SnapshotMeta =
            serde_json::from_value(json!({"type": "pgSql", "query": "select 1"})).unwrap();
        assert_eq!(other.kind(), "pgSql");
        assert_eq!(other.command(), None);
    }
}
