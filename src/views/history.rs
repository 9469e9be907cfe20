//! Run history of one job

use std::sync::Arc;

use dromio_model::{find_job, JobId, JobRun, JobSpec};

use crate::api::ApiResult;
use crate::dashboard::Dashboard;
use crate::sync::{QueryKey, SubscriptionId};

use super::{RunRow, Snapshot};

pub struct JobHistoryView {
    dash: Arc<Dashboard>,
    job_id: JobId,
    key: QueryKey,
    runs: SubscriptionId,
    jobs: SubscriptionId,
}

impl JobHistoryView {
    pub async fn open(dash: Arc<Dashboard>, job_id: JobId) -> Self {
        let poll = dash.settings().poll;
        let key = QueryKey::runs_for_job(job_id.clone());
        let jobs = dash.open(QueryKey::Jobs, poll.jobs).await;
        let runs = dash.open(key.clone(), poll.job_runs).await;
        Self {
            dash,
            job_id,
            key,
            runs,
            jobs,
        }
    }

    /// `None` once the job is deleted (or before the list loads).
    pub fn job(&self) -> Option<JobSpec> {
        self.dash
            .jobs()
            .and_then(|jobs| find_job(&self.job_id, &jobs).cloned())
    }

    pub fn rows(&self) -> Snapshot<Vec<RunRow>> {
        let jobs = self.dash.jobs();
        self.dash.read(&self.key, |read| {
            Snapshot::from_read(read, |p| {
                p.as_runs()
                    .map(|runs| runs.iter().map(|r| RunRow::build(r, jobs.as_deref())).collect())
            })
        })
    }

    pub async fn run_now(&self) -> ApiResult<JobRun> {
        self.dash.run_now(&self.job_id).await
    }

    pub async fn refresh(&self) -> bool {
        self.dash.refresh(&self.key).await
    }
}

impl Drop for JobHistoryView {
    fn drop(&mut self) {
        self.dash.close(self.runs);
        self.dash.close(self.jobs);
    }
}
