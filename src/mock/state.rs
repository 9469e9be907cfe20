//! Mock backend state
//!
//! Jobs, runs, workers and accounts held by the mock backend, plus the
//! one session a console process can have.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use dromio_model::{
    JobId, JobRun, JobSpec, ListRunsQuery, RunId, RunSnapshot, RunState, ShellSnapshot,
    SnapshotMeta, User, UserId, UserRole, WorkerRecord,
};

#[derive(Debug, Clone)]
pub struct Account {
    pub password: String,
    pub user: User,
}

#[derive(Debug, Default)]
pub struct MockState {
    /// Jobs in creation order
    pub jobs: Vec<JobSpec>,
    /// Runs in creation order; listed newest first
    pub runs: Vec<JobRun>,
    pub workers: Vec<WorkerRecord>,
    pub accounts: HashMap<String, Account>,
    pub session: Option<User>,
    next_id: u64,
}

impl MockState {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    pub fn add_account(&mut self, username: &str, password: &str, role: UserRole) -> User {
        let user = User {
            id: UserId::new(self.next_id("user")),
            username: username.to_string(),
            role,
            created_at: Some(Utc::now()),
        };
        self.accounts.insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// The user for these credentials, if they match
    pub fn authenticate(&self, username: &str, password: &str) -> Option<User> {
        self.accounts
            .get(username)
            .filter(|a| a.password == password)
            .map(|a| a.user.clone())
    }

    pub fn new_job_id(&mut self) -> JobId {
        JobId::new(self.next_id("job"))
    }

    pub fn job(&self, id: &JobId) -> Option<&JobSpec> {
        self.jobs.iter().find(|j| &j.id == id)
    }

    pub fn job_mut(&mut self, id: &JobId) -> Option<&mut JobSpec> {
        self.jobs.iter_mut().find(|j| &j.id == id)
    }

    /// Remove a job. Its runs stay behind.
    pub fn remove_job(&mut self, id: &JobId) -> Option<JobSpec> {
        let pos = self.jobs.iter().position(|j| &j.id == id)?;
        Some(self.jobs.remove(pos))
    }

    /// Queue a run of `job` with a snapshot of its current runner.
    pub fn queue_run(&mut self, job: &JobSpec, now: DateTime<Utc>) -> JobRun {
        let meta = match job.command() {
            Some(command) => {
                let mut shell = ShellSnapshot::new(command);
                shell.working_dir = job.runner_config.working_dir().map(str::to_string);
                SnapshotMeta::Shell(shell)
            }
            None => SnapshotMeta::Unknown(
                serde_json::to_value(&job.runner_config).unwrap_or(serde_json::Value::Null),
            ),
        };
        let run = JobRun {
            id: RunId::new(self.next_id("run")),
            job_id: job.id.clone(),
            worker_id: None,
            state: RunState::Queued,
            scheduled_for: Some(now),
            started_at: None,
            finished_at: None,
            exit_code: None,
            output: None,
            error_output: None,
            snapshot: Some(RunSnapshot {
                name: Some(job.name.clone()),
                job_name: job.name.clone(),
                meta,
            }),
        };
        self.runs.push(run.clone());
        run
    }

    pub fn run_mut(&mut self, id: &RunId) -> Option<&mut JobRun> {
        self.runs.iter_mut().find(|r| &r.id == id)
    }

    /// Runs matching the filters, newest first, truncated to `limit`.
    pub fn query_runs(&self, query: &ListRunsQuery) -> Vec<JobRun> {
        let matching = self.runs.iter().rev().filter(|run| {
            query.by_job_id.as_ref().map_or(true, |j| &run.job_id == j)
                && query
                    .by_worker_id
                    .as_ref()
                    .map_or(true, |w| run.worker_id.as_ref() == Some(w))
                && query
                    .after
                    .map_or(true, |after| run.scheduled_for.is_some_and(|t| t > after))
                && query
                    .before
                    .map_or(true, |before| run.scheduled_for.is_some_and(|t| t < before))
        });
        match query.limit {
            Some(limit) => matching.take(limit as usize).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dromio_model::{MisfirePolicy, RunnerConfig, WorkerId};

    fn job(state: &mut MockState, name: &str) -> JobSpec {
        let job = JobSpec {
            id: state.new_job_id(),
            name: name.to_string(),
            schedule_cron: None,
            enabled: true,
            runner_config: RunnerConfig::shell(format!("echo {}", name)),
            max_concurrency: 1,
            misfire_policy: MisfirePolicy::default(),
        };
        state.jobs.push(job.clone());
        job
    }

    #[test]
    fn test_queue_run_snapshots_command() {
        let mut state = MockState::new();
        let backup = job(&mut state, "backup");
        let run = state.queue_run(&backup, Utc::now());

        assert_eq!(run.state, RunState::Queued);
        let snapshot = run.snapshot.unwrap();
        assert_eq!(snapshot.job_name, "backup");
        assert_eq!(snapshot.meta.command(), Some("echo backup"));
    }

    #[test]
    fn test_query_runs_filters_and_orders() {
        let mut state = MockState::new();
        let a = job(&mut state, "a");
        let b = job(&mut state, "b");
        let now = Utc::now();
        let first = state.queue_run(&a, now);
        state.queue_run(&b, now);
        let third = state.queue_run(&a, now);
        state.run_mut(&third.id).unwrap().worker_id = Some(WorkerId::new("w1"));

        let runs = state.query_runs(&ListRunsQuery::for_job(a.id.clone()));
        let ids: Vec<_> = runs.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![third.id.clone(), first.id.clone()]);

        let runs = state.query_runs(&ListRunsQuery::default().with_worker(WorkerId::new("w1")));
        assert_eq!(runs.len(), 1);

        let runs = state.query_runs(&ListRunsQuery::default().with_limit(2));
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn test_removed_job_keeps_runs() {
        let mut state = MockState::new();
        let a = job(&mut state, "a");
        state.queue_run(&a, Utc::now());
        assert!(state.remove_job(&a.id).is_some());
        assert!(state.job(&a.id).is_none());
        assert_eq!(state.runs.len(), 1);
    }

    #[test]
    fn test_authenticate() {
        let mut state = MockState::new();
        state.add_account("ops", "hunter2", UserRole::Operator);
        assert!(state.authenticate("ops", "hunter2").is_some());
        assert!(state.authenticate("ops", "wrong").is_none());
        assert!(state.authenticate("nobody", "hunter2").is_none());
    }
}
