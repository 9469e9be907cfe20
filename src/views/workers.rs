//! Worker roster

use chrono::Duration;
use std::sync::Arc;

use dromio_model::{format_time, WorkerId, WorkerRecord, WorkerStatus};

use crate::dashboard::Dashboard;
use crate::sync::{QueryKey, SubscriptionId};

use super::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRow {
    pub id: WorkerId,
    pub display_name: String,
    pub hostname: String,
    pub capacity: u32,
    /// Derived from the heartbeat age at read time
    pub status: WorkerStatus,
    pub last_seen: String,
    pub restart_count: u32,
    pub version: Option<String>,
}

impl WorkerRow {
    pub fn build(worker: &WorkerRecord, now: chrono::DateTime<chrono::Utc>, threshold: Duration) -> Self {
        Self {
            id: worker.id.clone(),
            display_name: worker.display_name.clone(),
            hostname: worker.hostname.clone(),
            capacity: worker.capacity,
            status: worker.status(now, threshold),
            last_seen: format_time(Some(worker.last_seen)),
            restart_count: worker.restart_count,
            version: worker.version.clone(),
        }
    }
}

pub struct WorkersView {
    dash: Arc<Dashboard>,
    subscription: SubscriptionId,
}

impl WorkersView {
    pub async fn open(dash: Arc<Dashboard>) -> Self {
        let subscription = dash.open(QueryKey::Workers, dash.settings().poll.workers).await;
        Self { dash, subscription }
    }

    pub fn rows(&self) -> Snapshot<Vec<WorkerRow>> {
        let now = self.dash.now();
        let threshold = Duration::milliseconds(self.dash.settings().liveness_threshold_ms);
        self.dash.read(&QueryKey::Workers, |read| {
            Snapshot::from_read(read, |p| {
                p.as_workers().map(|workers| {
                    workers
                        .iter()
                        .map(|w| WorkerRow::build(w, now, threshold))
                        .collect()
                })
            })
        })
    }

    pub async fn refresh(&self) -> bool {
        self.dash.refresh(&QueryKey::Workers).await
    }
}

impl Drop for WorkersView {
    fn drop(&mut self) {
        self.dash.close(self.subscription);
    }
}
