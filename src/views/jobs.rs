//! Jobs list

use std::sync::Arc;

use dromio_model::{find_job, JobId, JobRun, JobSpec};

use crate::api::ApiResult;
use crate::dashboard::Dashboard;
use crate::sync::{Payload, QueryKey, SubscriptionId};

use super::Snapshot;

pub struct JobsView {
    dash: Arc<Dashboard>,
    subscription: SubscriptionId,
    selected: Option<JobId>,
}

impl JobsView {
    pub async fn open(dash: Arc<Dashboard>) -> Self {
        let subscription = dash.open(QueryKey::Jobs, dash.settings().poll.jobs).await;
        Self {
            dash,
            subscription,
            selected: None,
        }
    }

    pub fn jobs(&self) -> Snapshot<Vec<JobSpec>> {
        self.dash.read(&QueryKey::Jobs, |read| {
            Snapshot::from_read(read, |p| p.as_jobs().map(<[JobSpec]>::to_vec))
        })
    }

    pub fn select(&mut self, id: Option<JobId>) {
        self.selected = id;
    }

    /// The selected job, if it is still in the list.
    pub fn selected(&self) -> Option<JobSpec> {
        let id = self.selected.as_ref()?;
        self.dash.read(&QueryKey::Jobs, |read| {
            read.value()
                .and_then(Payload::as_jobs)
                .and_then(|jobs| find_job(id, jobs))
                .cloned()
        })
    }

    pub async fn toggle_enabled(&self, job: &JobSpec) -> ApiResult<JobSpec> {
        self.dash.set_enabled(&job.id, !job.enabled).await
    }

    pub async fn run_now(&self, id: &JobId) -> ApiResult<JobRun> {
        self.dash.run_now(id).await
    }

    pub async fn delete(&mut self, id: &JobId) -> ApiResult<()> {
        self.dash.delete_job(id).await?;
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        Ok(())
    }

    pub async fn refresh(&self) -> bool {
        self.dash.refresh(&QueryKey::Jobs).await
    }
}

impl Drop for JobsView {
    fn drop(&mut self) {
        self.dash.close(self.subscription);
    }
}
