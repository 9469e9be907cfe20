//! Runs list with filters and a user-chosen poll rate

use std::sync::Arc;

use dromio_model::{
    display_job_name, format_time, JobId, JobRun, JobSpec, ListRunsQuery, RunId, RunState,
    WorkerId,
};

use crate::dashboard::Dashboard;
use crate::sync::{PollRate, QueryKey, SubscriptionId};

use super::Snapshot;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilters {
    pub job: Option<JobId>,
    pub worker: Option<WorkerId>,
}

/// One table row. The job name resolves through the jobs cache and falls
/// back to `<Unknown Job>` for deleted jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub id: RunId,
    pub job_id: JobId,
    pub job_name: String,
    pub state: RunState,
    pub worker: Option<WorkerId>,
    pub scheduled_for: String,
    pub started_at: String,
    pub finished_at: String,
    pub can_cancel: bool,
    pub can_rerun: bool,
}

impl RunRow {
    pub fn build(run: &JobRun, jobs: Option<&[JobSpec]>) -> Self {
        Self {
            id: run.id.clone(),
            job_id: run.job_id.clone(),
            job_name: display_job_name(&run.job_id, jobs).to_string(),
            state: run.state,
            worker: run.worker_id.clone(),
            scheduled_for: format_time(run.scheduled_for),
            started_at: format_time(run.started_at),
            finished_at: format_time(run.finished_at),
            can_cancel: run.can_cancel(),
            can_rerun: run.can_rerun(),
        }
    }
}

pub struct RunsView {
    dash: Arc<Dashboard>,
    filters: RunFilters,
    rate: PollRate,
    runs: (QueryKey, SubscriptionId),
    jobs: SubscriptionId,
    workers: SubscriptionId,
}

impl RunsView {
    pub async fn open(dash: Arc<Dashboard>) -> Self {
        let poll = dash.settings().poll;
        let filters = RunFilters::default();
        let key = runs_key(&dash, &filters);
        let jobs = dash.open(QueryKey::Jobs, poll.jobs).await;
        let workers = dash.open(QueryKey::Workers, poll.workers).await;
        let runs = dash.open(key.clone(), poll.runs.interval()).await;
        Self {
            dash,
            filters,
            rate: poll.runs,
            runs: (key, runs),
            jobs,
            workers,
        }
    }

    pub fn filters(&self) -> &RunFilters {
        &self.filters
    }

    pub fn rate(&self) -> PollRate {
        self.rate
    }

    /// Switch to the entry for the new filters. The old entry is released
    /// after the new one is subscribed, so unchanged keys are not refetched.
    pub async fn set_filters(&mut self, filters: RunFilters) {
        let key = runs_key(&self.dash, &filters);
        let id = self.dash.open(key.clone(), self.rate.interval()).await;
        let (_, old) = std::mem::replace(&mut self.runs, (key, id));
        self.dash.close(old);
        self.filters = filters;
    }

    pub fn set_rate(&mut self, rate: PollRate) {
        self.rate = rate;
        self.dash.set_interval(self.runs.1, rate.interval());
    }

    pub async fn refresh(&self) -> bool {
        self.dash.refresh(&self.runs.0).await
    }

    pub fn rows(&self) -> Snapshot<Vec<RunRow>> {
        let jobs = self.dash.jobs();
        self.dash.read(&self.runs.0, |read| {
            Snapshot::from_read(read, |p| {
                p.as_runs()
                    .map(|runs| runs.iter().map(|r| RunRow::build(r, jobs.as_deref())).collect())
            })
        })
    }

    /// Worker filter options, labelled `hostname-id`.
    pub fn worker_options(&self) -> Vec<(WorkerId, String)> {
        self.dash.read(&QueryKey::Workers, |read| {
            read.value()
                .and_then(|p| p.as_workers())
                .map(|workers| {
                    workers
                        .iter()
                        .map(|w| (w.id.clone(), w.filter_label()))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    pub fn job_options(&self) -> Vec<(JobId, String)> {
        self.dash
            .jobs()
            .unwrap_or_default()
            .into_iter()
            .map(|j| (j.id, j.name))
            .collect()
    }
}

impl Drop for RunsView {
    fn drop(&mut self) {
        self.dash.close(self.runs.1);
        self.dash.close(self.jobs);
        self.dash.close(self.workers);
    }
}

fn runs_key(dash: &Dashboard, filters: &RunFilters) -> QueryKey {
    QueryKey::Runs(ListRunsQuery {
        by_job_id: filters.job.clone(),
        by_worker_id: filters.worker.clone(),
        limit: Some(dash.settings().runs_limit),
        ..ListRunsQuery::default()
    })
}
