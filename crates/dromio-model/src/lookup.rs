//! Lookups across collections
//!
//! Runs reference jobs by id only. A run can outlive its job, and the jobs
//! list may simply not be loaded yet, so every lookup has a fallback.

use crate::ids::JobId;
use crate::job::JobSpec;

/// Shown for runs whose job is deleted or not loaded.
pub const UNKNOWN_JOB_NAME: &str = "<Unknown Job>";

pub fn find_job<'a>(job_id: &JobId, jobs: &'a [JobSpec]) -> Option<&'a JobSpec> {
    jobs.iter().find(|j| &j.id == job_id)
}

/// Job name for a run's `jobId`, or [`UNKNOWN_JOB_NAME`].
pub fn display_job_name<'a>(job_id: &JobId, jobs: Option<&'a [JobSpec]>) -> &'a str {
    jobs.and_then(|jobs| find_job(job_id, jobs))
        .map(|j| j.name.as_str())
        .unwrap_or(UNKNOWN_JOB_NAME)
}

/// True when a job with a different id already uses exactly this name.
///
/// Advisory only: the server accepts duplicates, so callers warn and let
/// the user confirm.
pub fn has_duplicate_name(name: &str, candidate_id: Option<&JobId>, existing: &[JobSpec]) -> bool {
    existing
        .iter()
        .any(|j| j.name == name && Some(&j.id) != candidate_id)
}
