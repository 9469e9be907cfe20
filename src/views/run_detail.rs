//! Detail pane for one run

use chrono::Duration;
use std::sync::Arc;

use dromio_model::{display_job_name, find_job, JobId, JobRun, JobSpec, RunId};

use crate::api::ApiResult;
use crate::dashboard::Dashboard;
use crate::sync::{Payload, QueryKey, SubscriptionId};

/// Everything the detail pane shows for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunDetail {
    pub run: JobRun,
    pub job_name: String,
    /// Dispatch snapshot's command, else the live job's
    pub command: Option<String>,
    pub output: Option<String>,
    pub error_output: Option<String>,
    pub duration: Option<Duration>,
    pub can_cancel: bool,
    pub can_rerun: bool,
}

impl RunDetail {
    pub fn build(run: &JobRun, jobs: Option<&[JobSpec]>) -> Self {
        let job = jobs.and_then(|jobs| find_job(&run.job_id, jobs));
        Self {
            run: run.clone(),
            job_name: display_job_name(&run.job_id, jobs).to_string(),
            command: run.display_command(job).map(str::to_string),
            output: run.output().map(str::to_string),
            error_output: run.error_output().map(str::to_string),
            duration: run.duration(),
            can_cancel: run.can_cancel(),
            can_rerun: run.can_rerun(),
        }
    }
}

/// Follows one run through its job's history entry.
pub struct RunDetailView {
    dash: Arc<Dashboard>,
    run_id: RunId,
    job_id: JobId,
    key: QueryKey,
    runs: SubscriptionId,
    jobs: SubscriptionId,
}

impl RunDetailView {
    pub async fn open(dash: Arc<Dashboard>, run_id: RunId, job_id: JobId) -> Self {
        let poll = dash.settings().poll;
        let key = QueryKey::runs_for_job(job_id.clone());
        let jobs = dash.open(QueryKey::Jobs, poll.jobs).await;
        let runs = dash.open(key.clone(), poll.job_runs).await;
        Self {
            dash,
            run_id,
            job_id,
            key,
            runs,
            jobs,
        }
    }

    /// `None` until the history loads, or if the run is no longer listed.
    pub fn detail(&self) -> Option<RunDetail> {
        let jobs = self.dash.jobs();
        self.dash.read(&self.key, |read| {
            read.value()
                .and_then(Payload::as_runs)
                .and_then(|runs| runs.iter().find(|r| r.id == self.run_id))
                .map(|run| RunDetail::build(run, jobs.as_deref()))
        })
    }

    /// Only queued runs can be cancelled.
    pub async fn cancel(&self) -> ApiResult<()> {
        self.dash.cancel_run(&self.run_id, &self.job_id).await
    }

    /// Re-run starts a fresh run of the same job.
    pub async fn rerun(&self) -> ApiResult<JobRun> {
        self.dash.run_now(&self.job_id).await
    }
}

impl Drop for RunDetailView {
    fn drop(&mut self) {
        self.dash.close(self.runs);
        self.dash.close(self.jobs);
    }
}
