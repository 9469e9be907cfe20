//! Mutations and the cache entries each one invalidates

use std::fmt;

use dromio_model::{JobId, RunId};

use super::query::QueryPrefix;

/// A server-side change the cache has to catch up with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateJob,
    UpdateJob(JobId),
    DeleteJob(JobId),
    EnableJob(JobId),
    DisableJob(JobId),
    RunNow(JobId),
    CancelRun { run: RunId, job: JobId },
    /// Observed, not performed: a runs fetch saw a run change state
    RunStateChanged(JobId),
}

impl Mutation {
    /// Exactly the families this mutation can change.
    ///
    /// Job edits touch the job list and the job's own entry. Run changes
    /// touch the job's run history and the unscoped runs lists, never the
    /// jobs.
    pub fn invalidations(&self) -> Vec<QueryPrefix> {
        match self {
            Mutation::CreateJob
            | Mutation::UpdateJob(_)
            | Mutation::DeleteJob(_)
            | Mutation::EnableJob(_)
            | Mutation::DisableJob(_) => vec![QueryPrefix::jobs()],
            Mutation::RunNow(job)
            | Mutation::CancelRun { job, .. }
            | Mutation::RunStateChanged(job) => {
                vec![QueryPrefix::runs_for_job(job), QueryPrefix::runs_unscoped()]
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::CreateJob => "create_job",
            Mutation::UpdateJob(_) => "update_job",
            Mutation::DeleteJob(_) => "delete_job",
            Mutation::EnableJob(_) => "enable_job",
            Mutation::DisableJob(_) => "disable_job",
            Mutation::RunNow(_) => "run_now",
            Mutation::CancelRun { .. } => "cancel_run",
            Mutation::RunStateChanged(_) => "run_state_changed",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::CreateJob => write!(f, "create_job"),
            Mutation::UpdateJob(id)
            | Mutation::DeleteJob(id)
            | Mutation::EnableJob(id)
            | Mutation::DisableJob(id)
            | Mutation::RunNow(id)
            | Mutation::RunStateChanged(id) => write!(f, "{}({})", self.name(), id),
            Mutation::CancelRun { run, job } => write!(f, "cancel_run({}, job {})", run, job),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::QueryKey;
    use dromio_model::ListRunsQuery;

    fn hits(mutation: &Mutation, key: &QueryKey) -> bool {
        mutation.invalidations().iter().any(|p| key.matches(p))
    }

    #[test]
    fn test_job_mutations_leave_runs_alone() {
        let j1 = JobId::new("j1");
        for m in [
            Mutation::CreateJob,
            Mutation::UpdateJob(j1.clone()),
            Mutation::DeleteJob(j1.clone()),
            Mutation::EnableJob(j1.clone()),
            Mutation::DisableJob(j1.clone()),
        ] {
            assert!(hits(&m, &QueryKey::Jobs), "{m}");
            assert!(hits(&m, &QueryKey::Job(j1.clone())), "{m}");
            assert!(!hits(&m, &QueryKey::runs_for_job(j1.clone())), "{m}");
            assert!(!hits(&m, &QueryKey::Workers), "{m}");
        }
    }

    #[test]
    fn test_run_mutations_scope() {
        let j1 = JobId::new("j1");
        let j2 = JobId::new("j2");
        let m = Mutation::RunNow(j1.clone());

        assert!(hits(&m, &QueryKey::runs_for_job(j1.clone())));
        assert!(hits(&m, &QueryKey::Runs(ListRunsQuery::default().with_limit(100))));
        assert!(!hits(&m, &QueryKey::runs_for_job(j2)));
        assert!(!hits(&m, &QueryKey::Jobs));

        let cancel = Mutation::CancelRun {
            run: RunId::new("r1"),
            job: j1.clone(),
        };
        assert_eq!(cancel.invalidations(), m.invalidations());
        assert_eq!(
            Mutation::RunStateChanged(j1).invalidations(),
            m.invalidations()
        );
    }
}
