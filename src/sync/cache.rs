//! Cache entries and what a read sees

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use dromio_model::{JobId, JobRun, JobSpec, RunId, RunState, WorkerRecord};

use super::interval::RefreshInterval;

/// A fetched collection or entity
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Jobs(Vec<JobSpec>),
    Job(JobSpec),
    Runs(Vec<JobRun>),
    Workers(Vec<WorkerRecord>),
}

impl Payload {
    pub fn as_jobs(&self) -> Option<&[JobSpec]> {
        match self {
            Payload::Jobs(jobs) => Some(jobs),
            _ => None,
        }
    }

    pub fn as_job(&self) -> Option<&JobSpec> {
        match self {
            Payload::Job(job) => Some(job),
            _ => None,
        }
    }

    pub fn as_runs(&self) -> Option<&[JobRun]> {
        match self {
            Payload::Runs(runs) => Some(runs),
            _ => None,
        }
    }

    pub fn as_workers(&self) -> Option<&[WorkerRecord]> {
        match self {
            Payload::Workers(workers) => Some(workers),
            _ => None,
        }
    }

    /// Number of rows, for logs
    pub fn len(&self) -> usize {
        match self {
            Payload::Jobs(v) => v.len(),
            Payload::Job(_) => 1,
            Payload::Runs(v) => v.len(),
            Payload::Workers(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A failed fetch, kept next to the last good value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Last state seen for each run, across every runs entry.
///
/// A transition is reported once, by whichever entry sees it first; other
/// entries catching up to the same state report nothing.
#[derive(Debug, Default)]
pub(crate) struct RunStates(HashMap<RunId, RunState>);

impl RunStates {
    /// Record `runs` and return the jobs whose runs moved to a new state.
    /// Runs seen for the first time are recorded without being reported.
    pub fn observe(&mut self, runs: &[JobRun]) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = Vec::new();
        for run in runs {
            let previous = self.0.insert(run.id.clone(), run.state);
            if previous.is_some_and(|state| state != run.state) {
                jobs.push(run.job_id.clone());
            }
        }
        jobs.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        jobs.dedup();
        jobs
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Subscription handle returned by `SyncEngine::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub value: Option<Payload>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error: Option<FetchError>,
    /// Invalidated and not yet refetched
    pub stale: bool,
    /// Highest sequence number issued for this entry
    pub issued: u64,
    /// Highest sequence number whose outcome has been recorded
    pub settled: u64,
    /// Outcomes of tickets at or below this are dropped
    pub floor: u64,
    pub next_due: Option<DateTime<Utc>>,
    pub subscribers: BTreeMap<SubscriptionId, RefreshInterval>,
}

impl CacheEntry {
    pub fn new(floor: u64) -> Self {
        Self {
            value: None,
            fetched_at: None,
            error: None,
            stale: false,
            issued: floor,
            settled: floor,
            floor,
            next_due: None,
            subscribers: BTreeMap::new(),
        }
    }

    /// A fetch newer than anything recorded is still out
    pub fn in_flight(&self) -> bool {
        self.issued > self.settled
    }

    /// Fastest interval any subscriber asked for
    pub fn interval(&self) -> RefreshInterval {
        self.subscribers
            .values()
            .fold(RefreshInterval::Manual, |acc, i| acc.fastest(*i))
    }

    /// Forget everything fetched so far; outstanding tickets will be dropped.
    pub fn reset(&mut self) {
        self.value = None;
        self.fetched_at = None;
        self.error = None;
        self.stale = false;
        self.floor = self.issued;
        self.settled = self.issued;
        self.next_due = None;
    }
}

/// What a view sees when it reads a key
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheRead<'a> {
    /// Nothing fetched yet (or not subscribed)
    Pending { fetching: bool },
    /// Last good value; `error` is set when the latest fetch failed
    Ready {
        value: &'a Payload,
        fetched_at: Option<DateTime<Utc>>,
        fetching: bool,
        stale: bool,
        error: Option<&'a FetchError>,
    },
    /// Never fetched successfully and the latest attempt failed
    Error {
        error: &'a FetchError,
        fetching: bool,
    },
}

impl<'a> CacheRead<'a> {
    pub fn value(&self) -> Option<&'a Payload> {
        match *self {
            CacheRead::Ready { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&'a FetchError> {
        match *self {
            CacheRead::Ready { error, .. } => error,
            CacheRead::Error { error, .. } => Some(error),
            CacheRead::Pending { .. } => None,
        }
    }

    pub fn is_fetching(&self) -> bool {
        match *self {
            CacheRead::Pending { fetching }
            | CacheRead::Ready { fetching, .. }
            | CacheRead::Error { fetching, .. } => fetching,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CacheRead::Pending { .. })
    }

    pub(crate) fn of(entry: Option<&'a CacheEntry>) -> Self {
        let Some(entry) = entry else {
            return CacheRead::Pending { fetching: false };
        };
        let fetching = entry.in_flight();
        match (&entry.value, &entry.error) {
            (Some(value), error) => CacheRead::Ready {
                value,
                fetched_at: entry.fetched_at,
                fetching,
                stale: entry.stale,
                error: error.as_ref(),
            },
            (None, Some(error)) => CacheRead::Error { error, fetching },
            (None, None) => CacheRead::Pending { fetching },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dromio_model::RunState;

    fn run(id: &str, job: &str, state: RunState) -> JobRun {
        JobRun {
            id: RunId::new(id),
            job_id: JobId::new(job),
            worker_id: None,
            state,
            scheduled_for: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
            output: None,
            error_output: None,
            snapshot: None,
        }
    }

    #[test]
    fn test_run_states_report_each_transition_once() {
        let mut states = RunStates::default();
        let before = vec![
            run("r1", "j1", RunState::Queued),
            run("r2", "j2", RunState::Running),
            run("r3", "j1", RunState::Running),
        ];
        let after = vec![
            run("r0", "j3", RunState::Queued),
            run("r1", "j1", RunState::Running),
            run("r2", "j2", RunState::Running),
            run("r3", "j1", RunState::Succeeded),
        ];
        assert!(states.observe(&before).is_empty());
        assert_eq!(states.observe(&after), vec![JobId::new("j1")]);
        // a second entry catching up to the same states
        assert!(states.observe(&after[1..2]).is_empty());

        states.clear();
        assert!(states.observe(&after).is_empty());
    }

    #[test]
    fn test_read_shapes() {
        let mut entry = CacheEntry::new(0);
        assert!(CacheRead::of(Some(&entry)).is_pending());

        entry.error = Some(FetchError {
            message: "down".to_string(),
            at: Utc::now(),
        });
        assert!(matches!(CacheRead::of(Some(&entry)), CacheRead::Error { .. }));

        entry.value = Some(Payload::Workers(Vec::new()));
        let read = CacheRead::of(Some(&entry));
        assert!(read.value().is_some());
        assert_eq!(read.error().map(|e| e.message.as_str()), Some("down"));
    }
}
