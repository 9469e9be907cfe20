//! Query keys and prefixes
//!
//! Every cache entry is named by a [`QueryKey`]. Keys flatten to a segment
//! path so invalidation can address a whole family at once:
//!
//! | key                         | path                              |
//! |-----------------------------|-----------------------------------|
//! | all jobs                    | `jobs`                            |
//! | one job                     | `jobs/<id>`                       |
//! | runs of one job             | `runs/job/<id>[/worker/<w>]...`   |
//! | runs not scoped to a job    | `runs/all[/worker/<w>]...`        |
//! | workers                     | `workers`                         |

use chrono::SecondsFormat;
use std::fmt;

use dromio_model::{JobId, ListRunsQuery};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Jobs,
    Job(JobId),
    Runs(ListRunsQuery),
    Workers,
}

impl QueryKey {
    pub fn runs_for_job(job_id: JobId) -> Self {
        QueryKey::Runs(ListRunsQuery::for_job(job_id))
    }

    pub fn path(&self) -> Vec<String> {
        match self {
            QueryKey::Jobs => vec!["jobs".to_string()],
            QueryKey::Job(id) => vec!["jobs".to_string(), id.to_string()],
            QueryKey::Runs(query) => {
                let mut path = vec!["runs".to_string()];
                match &query.by_job_id {
                    Some(job) => {
                        path.push("job".to_string());
                        path.push(job.to_string());
                    }
                    None => path.push("all".to_string()),
                }
                if let Some(worker) = &query.by_worker_id {
                    path.push("worker".to_string());
                    path.push(worker.to_string());
                }
                if let Some(limit) = query.limit {
                    path.push("limit".to_string());
                    path.push(limit.to_string());
                }
                if let Some(after) = query.after {
                    path.push("after".to_string());
                    path.push(after.to_rfc3339_opts(SecondsFormat::Millis, true));
                }
                if let Some(before) = query.before {
                    path.push("before".to_string());
                    path.push(before.to_rfc3339_opts(SecondsFormat::Millis, true));
                }
                path
            }
            QueryKey::Workers => vec!["workers".to_string()],
        }
    }

    pub fn matches(&self, prefix: &QueryPrefix) -> bool {
        self.path().starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path().join("/"))
    }
}

/// Leading path segments selecting a family of keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryPrefix(Vec<String>);

impl QueryPrefix {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The job list and every single-job entry
    pub fn jobs() -> Self {
        Self::new(["jobs"])
    }

    pub fn job(id: &JobId) -> Self {
        Self::new(["jobs", id.as_str()])
    }

    /// Every runs entry, scoped or not
    pub fn runs() -> Self {
        Self::new(["runs"])
    }

    pub fn runs_for_job(id: &JobId) -> Self {
        Self::new(["runs", "job", id.as_str()])
    }

    /// Runs entries not scoped to a job
    pub fn runs_unscoped() -> Self {
        Self::new(["runs", "all"])
    }

    pub fn workers() -> Self {
        Self::new(["workers"])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/*", self.0.join("/"))
    }
}
