//! Mock Dromio backend
//!
//! An in-process stand-in for the REST API. Requests arrive as
//! [`ApiRequest`]s from `MockTransport` and are answered with the same
//! envelopes and status codes the real server uses.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

use dromio_model::{
    CreateJobRequest, JobId, JobRun, JobSpec, ListRunsQuery, LoginRequest, MisfirePolicy,
    RunId, RunState, RunnerConfig, ScheduleUpdate, ShellRunner, UpdateJobRequest, User,
    UserRole, WorkerId, WorkerRecord,
};

use crate::api::{ApiRequest, Method, RawResponse, TransportError};
use crate::protocol::{ApiEnvelope, ErrorCode, API_PREFIX, SESSION_PREFIX};

use super::failure::{FailureConfig, FailureInjector, FailureKind};
use super::state::MockState;

/// Routed endpoint, used for counting, failure injection and holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Logout,
    Me,
    ListJobs,
    GetJob,
    CreateJob,
    UpdateJob,
    DeleteJob,
    RunJob,
    EnableJob,
    DisableJob,
    ListRuns,
    CancelRun,
    ListWorkers,
}

impl Endpoint {
    /// Job, run and worker endpoints; the ones that need a session.
    pub fn is_resource(&self) -> bool {
        !matches!(self, Endpoint::Login | Endpoint::Logout | Endpoint::Me)
    }

    /// Route a request to an endpoint and its path id, if any.
    pub fn route(method: Method, path: &str) -> Option<(Endpoint, Option<String>)> {
        if let Some(rest) = path.strip_prefix(API_PREFIX) {
            let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();
            let id = |i: usize| segments.get(i).map(|s| s.to_string());
            let endpoint = match (method, segments.as_slice()) {
                (Method::Get, ["jobs"]) => Endpoint::ListJobs,
                (Method::Post, ["jobs"]) => Endpoint::CreateJob,
                (Method::Get, ["jobs", _]) => Endpoint::GetJob,
                (Method::Patch, ["jobs", _]) => Endpoint::UpdateJob,
                (Method::Delete, ["jobs", _]) => Endpoint::DeleteJob,
                (Method::Post, ["jobs", _, "run"]) => Endpoint::RunJob,
                (Method::Post, ["jobs", _, "enable"]) => Endpoint::EnableJob,
                (Method::Post, ["jobs", _, "disable"]) => Endpoint::DisableJob,
                (Method::Get, ["runs"]) => Endpoint::ListRuns,
                (Method::Post, ["runs", _, "cancel"]) => Endpoint::CancelRun,
                (Method::Get, ["workers"]) => Endpoint::ListWorkers,
                _ => return None,
            };
            return Some((endpoint, id(1)));
        }

        let name = path.strip_prefix(SESSION_PREFIX)?.trim_start_matches('/');
        let endpoint = match (method, name) {
            (Method::Post, "login") => Endpoint::Login,
            (Method::Post, "logout") => Endpoint::Logout,
            (Method::Get, "me") => Endpoint::Me,
            _ => return None,
        };
        Some((endpoint, None))
    }
}

type Reply = Result<RawResponse, TransportError>;

/// Configurable mock backend. Clones share state.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    failures: Arc<Mutex<FailureInjector>>,
    counts: Arc<Mutex<HashMap<Endpoint, u32>>>,
    holds: Arc<Mutex<HashMap<Endpoint, VecDeque<oneshot::Receiver<()>>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test configuration ===

    pub fn add_user(&self, username: &str, password: &str, role: UserRole) -> User {
        lock(&self.state).add_account(username, password, role)
    }

    /// Insert a job as is. Its id is kept.
    pub fn add_job(&self, job: JobSpec) {
        lock(&self.state).jobs.push(job);
    }

    /// Create a shell job with a fresh id and return it.
    pub fn seed_job(&self, name: &str, command: &str) -> JobSpec {
        let mut state = lock(&self.state);
        let job = JobSpec {
            id: state.new_job_id(),
            name: name.to_string(),
            schedule_cron: None,
            enabled: true,
            runner_config: RunnerConfig::shell(command),
            max_concurrency: 1,
            misfire_policy: MisfirePolicy::default(),
        };
        state.jobs.push(job.clone());
        job
    }

    /// Queue a run of an existing job, as the scheduler would.
    pub fn queue_run(&self, job_id: &JobId) -> Option<JobRun> {
        let mut state = lock(&self.state);
        let job = state.job(job_id)?.clone();
        Some(state.queue_run(&job, Utc::now()))
    }

    /// Backend with a sign-in, a few jobs, runs and workers, for `--mock`.
    pub fn demo() -> Self {
        let backend = Self::new();
        backend.add_user("admin", "admin", UserRole::Admin);

        let backup = backend.seed_job("backup", "pg_dump app > /var/backups/app.sql");
        let report = backend.seed_job("nightly-report", "./bin/report --since yesterday");
        let now = Utc::now();
        backend.add_worker(WorkerRecord {
            id: WorkerId::new("w-1"),
            display_name: "worker one".to_string(),
            hostname: "sched-01".to_string(),
            capacity: 4,
            last_seen: now,
            restart_count: 0,
            version: Some("0.1.0".to_string()),
        });
        backend.add_worker(WorkerRecord {
            id: WorkerId::new("w-2"),
            display_name: "worker two".to_string(),
            hostname: "sched-02".to_string(),
            capacity: 2,
            last_seen: now - chrono::Duration::minutes(5),
            restart_count: 3,
            version: Some("0.1.0".to_string()),
        });

        if let Some(run) = backend.queue_run(&backup.id) {
            backend.advance_run(&run.id, RunState::Running, Some(WorkerId::new("w-1")));
            backend.advance_run(&run.id, RunState::Succeeded, None);
        }
        backend.queue_run(&report.id);
        backend
    }

    pub fn add_run(&self, run: JobRun) {
        lock(&self.state).runs.push(run);
    }

    pub fn add_worker(&self, worker: WorkerRecord) {
        lock(&self.state).workers.push(worker);
    }

    /// Record a heartbeat for a worker.
    pub fn heartbeat(&self, worker_id: &WorkerId, at: DateTime<Utc>) -> bool {
        let mut state = lock(&self.state);
        match state.workers.iter_mut().find(|w| &w.id == worker_id) {
            Some(worker) => {
                worker.last_seen = at;
                true
            }
            None => false,
        }
    }

    /// Move a run along the run state machine, as a worker would.
    pub fn advance_run(&self, run_id: &RunId, to: RunState, worker: Option<WorkerId>) -> bool {
        let mut state = lock(&self.state);
        let Some(run) = state.run_mut(run_id) else {
            return false;
        };
        if !run.state.can_transition_to(to) {
            return false;
        }
        let now = Utc::now();
        run.state = to;
        if worker.is_some() {
            run.worker_id = worker;
        }
        match to {
            RunState::Running => run.started_at = Some(now),
            RunState::Succeeded => {
                run.finished_at = Some(now);
                run.exit_code = Some(0);
            }
            RunState::Failed => {
                run.finished_at = Some(now);
                run.exit_code = Some(1);
            }
            _ => run.finished_at = Some(now),
        }
        true
    }

    /// Drop the server-side session, as an expiry would.
    pub fn expire_session(&self) {
        lock(&self.state).session = None;
    }

    pub fn jobs(&self) -> Vec<JobSpec> {
        lock(&self.state).jobs.clone()
    }

    pub fn runs(&self) -> Vec<JobRun> {
        lock(&self.state).runs.clone()
    }

    pub fn inject_failure(&self, endpoint: Endpoint, config: FailureConfig) {
        lock(&self.failures).inject(endpoint, config);
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Hold the response to the next call of `endpoint` until the returned
    /// sender fires (or is dropped). The response reflects the state at the
    /// time the request arrived.
    pub fn hold_next(&self, endpoint: Endpoint) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.holds).entry(endpoint).or_default().push_back(rx);
        tx
    }

    pub fn request_count(&self, endpoint: Endpoint) -> u32 {
        lock(&self.counts).get(&endpoint).copied().unwrap_or(0)
    }

    /// Calls to job, run and worker endpoints
    pub fn resource_request_count(&self) -> u32 {
        lock(&self.counts)
            .iter()
            .filter(|(e, _)| e.is_resource())
            .map(|(_, n)| n)
            .sum()
    }

    // === Request handling ===

    pub async fn handle(&self, request: &ApiRequest) -> Reply {
        let (reply, gate) = self.respond(request);
        if let Some(gate) = gate {
            // a dropped sender releases the response too
            let _ = gate.await;
        }
        reply
    }

    fn respond(&self, request: &ApiRequest) -> (Reply, Option<oneshot::Receiver<()>>) {
        let Some((endpoint, id)) = Endpoint::route(request.method, &request.path) else {
            return (
                Ok(error_reply(404, ErrorCode::NotFound, format!("No route for {}", request.path))),
                None,
            );
        };

        *lock(&self.counts).entry(endpoint).or_insert(0) += 1;
        let gate = lock(&self.holds)
            .get_mut(&endpoint)
            .and_then(|queue| queue.pop_front());

        let failure = lock(&self.failures).check(endpoint).cloned();
        let reply = match failure {
            Some(failure) => failure_reply(failure),
            None => Ok(self.dispatch(endpoint, id, request)),
        };

        (reply, gate)
    }

    fn dispatch(&self, endpoint: Endpoint, id: Option<String>, request: &ApiRequest) -> RawResponse {
        let mut state = lock(&self.state);

        match endpoint {
            Endpoint::Login => return handle_login(&mut state, request),
            Endpoint::Logout => {
                state.session = None;
                return ok_empty();
            }
            Endpoint::Me => {
                return match &state.session {
                    Some(user) => ok_reply(user),
                    None => unauthenticated(),
                }
            }
            _ => {}
        }

        if state.session.is_none() {
            return unauthenticated();
        }

        let id = id.unwrap_or_default();
        match endpoint {
            Endpoint::ListJobs => ok_reply(&state.jobs),
            Endpoint::GetJob => match state.job(&JobId::new(id.as_str())) {
                Some(job) => ok_reply(job),
                None => job_not_found(&id),
            },
            Endpoint::CreateJob => handle_create(&mut state, request),
            Endpoint::UpdateJob => handle_update(&mut state, &JobId::new(id.as_str()), request),
            Endpoint::DeleteJob => match state.remove_job(&JobId::new(id.as_str())) {
                Some(_) => ok_empty(),
                None => job_not_found(&id),
            },
            Endpoint::RunJob => match state.job(&JobId::new(id.as_str())).cloned() {
                Some(job) => {
                    let run = state.queue_run(&job, Utc::now());
                    ok_reply(&run)
                }
                None => job_not_found(&id),
            },
            Endpoint::EnableJob | Endpoint::DisableJob => {
                let enabled = endpoint == Endpoint::EnableJob;
                match state.job_mut(&JobId::new(id.as_str())) {
                    Some(job) => {
                        job.enabled = enabled;
                        ok_reply(&*job)
                    }
                    None => job_not_found(&id),
                }
            }
            Endpoint::ListRuns => match parse_runs_query(&request.query) {
                Ok(query) => ok_reply(&state.query_runs(&query)),
                Err(message) => error_reply(400, ErrorCode::InvalidInput, message),
            },
            Endpoint::CancelRun => match state.run_mut(&RunId::new(id.as_str())) {
                Some(run) if run.state == RunState::Queued => {
                    run.state = RunState::Cancelled;
                    run.finished_at = Some(Utc::now());
                    ok_empty()
                }
                Some(run) => error_reply(
                    409,
                    ErrorCode::Conflict,
                    format!("Run {} is {} and cannot be cancelled", run.id, run.state),
                ),
                None => error_reply(404, ErrorCode::NotFound, format!("Run {} not found", id)),
            },
            Endpoint::ListWorkers => ok_reply(&state.workers),
            Endpoint::Login | Endpoint::Logout | Endpoint::Me => unauthenticated(),
        }
    }
}

fn handle_login(state: &mut MockState, request: &ApiRequest) -> RawResponse {
    let credentials: LoginRequest = match parse_body(request) {
        Ok(c) => c,
        Err(reply) => return reply,
    };
    match state.authenticate(&credentials.username, &credentials.password) {
        Some(user) => {
            state.session = Some(user);
            ok_empty()
        }
        None => error_reply(401, ErrorCode::Unauthenticated, "Invalid username or password"),
    }
}

fn handle_create(state: &mut MockState, request: &ApiRequest) -> RawResponse {
    let req: CreateJobRequest = match parse_body(request) {
        Ok(r) => r,
        Err(reply) => return reply,
    };
    if req.name.trim().is_empty() || req.command.trim().is_empty() {
        return error_reply(422, ErrorCode::ValidationError, "name and command are required");
    }
    let job = JobSpec {
        id: state.new_job_id(),
        name: req.name,
        schedule_cron: req.schedule_cron,
        enabled: true,
        runner_config: RunnerConfig::shell(req.command),
        max_concurrency: req.max_concurrency.unwrap_or(1).max(1),
        misfire_policy: req.misfire_policy.unwrap_or_default(),
    };
    state.jobs.push(job.clone());
    ok_reply(&job)
}

fn handle_update(state: &mut MockState, id: &JobId, request: &ApiRequest) -> RawResponse {
    let req: UpdateJobRequest = match parse_body(request) {
        Ok(r) => r,
        Err(reply) => return reply,
    };
    let Some(job) = state.job_mut(id) else {
        return job_not_found(id.as_str());
    };
    if let Some(name) = req.name {
        job.name = name;
    }
    match req.schedule_cron {
        ScheduleUpdate::Keep => {}
        ScheduleUpdate::Clear => job.schedule_cron = None,
        ScheduleUpdate::Set(cron) => job.schedule_cron = Some(cron),
    }
    if let Some(command) = req.command {
        let working_dir = job.runner_config.working_dir().map(str::to_string);
        job.runner_config = RunnerConfig::Shell(ShellRunner::new(command, working_dir));
    }
    if let Some(max) = req.max_concurrency {
        job.max_concurrency = max.max(1);
    }
    if let Some(policy) = req.misfire_policy {
        job.misfire_policy = policy;
    }
    ok_reply(&*job)
}

fn parse_body<T: DeserializeOwned>(request: &ApiRequest) -> Result<T, RawResponse> {
    let body = request.body.clone().unwrap_or(serde_json::Value::Null);
    serde_json::from_value(body)
        .map_err(|e| error_reply(400, ErrorCode::InvalidInput, format!("Invalid body: {}", e)))
}

fn parse_runs_query(pairs: &[(String, String)]) -> Result<ListRunsQuery, String> {
    let mut query = ListRunsQuery::default();
    for (key, value) in pairs {
        match key.as_str() {
            "byJobId" => query.by_job_id = Some(JobId::new(value.as_str())),
            "byWorkerId" => query.by_worker_id = Some(WorkerId::new(value.as_str())),
            "limit" => {
                query.limit = Some(value.parse().map_err(|_| format!("Invalid limit: {}", value))?)
            }
            "after" => query.after = Some(parse_time(value)?),
            "before" => query.before = Some(parse_time(value)?),
            other => return Err(format!("Unknown filter: {}", other)),
        }
    }
    Ok(query)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| format!("Invalid timestamp: {}", value))
}

fn reply<T: Serialize>(status: u16, envelope: &ApiEnvelope<T>) -> RawResponse {
    match serde_json::to_string(envelope) {
        Ok(body) => RawResponse { status, body },
        Err(e) => RawResponse {
            status: 500,
            body: format!("serialization failed: {}", e),
        },
    }
}

fn ok_reply<T: Serialize>(data: &T) -> RawResponse {
    reply(200, &ApiEnvelope::ok(data))
}

fn ok_empty() -> RawResponse {
    reply(200, &ApiEnvelope::<()>::empty())
}

fn error_reply(status: u16, code: ErrorCode, message: impl Into<String>) -> RawResponse {
    reply(status, &ApiEnvelope::<()>::error(status, code, message))
}

fn unauthenticated() -> RawResponse {
    error_reply(401, ErrorCode::Unauthenticated, "Not authenticated")
}

fn job_not_found(id: &str) -> RawResponse {
    error_reply(404, ErrorCode::NotFound, format!("Job {} not found", id))
}

fn failure_reply(failure: FailureConfig) -> Reply {
    match failure.kind {
        FailureKind::Status {
            status,
            code,
            message,
        } => Ok(error_reply(status, code, message)),
        FailureKind::Unauthorized => Ok(RawResponse {
            status: 401,
            body: String::new(),
        }),
        FailureKind::Disconnect => Err(TransportError::ConnectionFailed(
            "injected disconnect".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: Method, path: &str, body: Option<serde_json::Value>) -> ApiRequest {
        ApiRequest {
            method,
            path: path.to_string(),
            query: Vec::new(),
            body,
            request_id: "req-test".to_string(),
        }
    }

    fn body(response: &RawResponse) -> serde_json::Value {
        serde_json::from_str(&response.body).unwrap()
    }

    fn signed_in() -> MockBackend {
        let backend = MockBackend::new();
        backend.add_user("ops", "pw", UserRole::Operator);
        let login = request(
            Method::Post,
            "/api/login",
            Some(json!({"username": "ops", "password": "pw"})),
        );
        let (reply, _) = backend.respond(&login);
        assert_eq!(reply.unwrap().status, 200);
        backend
    }

    #[test]
    fn test_routes() {
        assert_eq!(
            Endpoint::route(Method::Post, "/api/v1/jobs/j1/disable"),
            Some((Endpoint::DisableJob, Some("j1".to_string())))
        );
        assert_eq!(
            Endpoint::route(Method::Get, "/api/v1/runs"),
            Some((Endpoint::ListRuns, None))
        );
        assert_eq!(Endpoint::route(Method::Get, "/api/me"), Some((Endpoint::Me, None)));
        assert_eq!(Endpoint::route(Method::Delete, "/api/v1/workers"), None);
    }

    #[test]
    fn test_resources_need_session() {
        let backend = MockBackend::new();
        let (reply, _) = backend.respond(&request(Method::Get, "/api/v1/jobs", None));
        let reply = reply.unwrap();
        assert_eq!(reply.status, 401);
        assert_eq!(body(&reply)["error"], "unauthenticated");
        assert_eq!(backend.resource_request_count(), 1);
    }

    #[test]
    fn test_bad_login_message() {
        let backend = MockBackend::new();
        backend.add_user("ops", "pw", UserRole::Operator);
        let (reply, _) = backend.respond(&request(
            Method::Post,
            "/api/login",
            Some(json!({"username": "ops", "password": "nope"})),
        ));
        let reply = reply.unwrap();
        assert_eq!(reply.status, 401);
        assert_eq!(body(&reply)["message"], "Invalid username or password");
    }

    #[test]
    fn test_create_then_disable() {
        let backend = signed_in();
        let (reply, _) = backend.respond(&request(
            Method::Post,
            "/api/v1/jobs",
            Some(json!({"name": "backup", "schedule_cron": null, "command": "pg_dump"})),
        ));
        let created = body(&reply.unwrap());
        let id = created["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["data"]["enabled"], true);

        let (reply, _) = backend.respond(&request(
            Method::Post,
            &format!("/api/v1/jobs/{}/disable", id),
            None,
        ));
        assert_eq!(body(&reply.unwrap())["data"]["enabled"], false);
        assert!(!backend.jobs()[0].enabled);
    }

    #[test]
    fn test_cancel_only_queued() {
        let backend = signed_in();
        let job = backend.seed_job("a", "true");
        let (reply, _) = backend.respond(&request(
            Method::Post,
            &format!("/api/v1/jobs/{}/run", job.id),
            None,
        ));
        let run_id = RunId::new(body(&reply.unwrap())["data"]["id"].as_str().unwrap());

        assert!(backend.advance_run(&run_id, RunState::Running, Some(WorkerId::new("w1"))));
        let (reply, _) = backend.respond(&request(
            Method::Post,
            &format!("/api/v1/runs/{}/cancel", run_id),
            None,
        ));
        assert_eq!(reply.unwrap().status, 409);
    }

    #[test]
    fn test_injected_disconnect() {
        let backend = signed_in();
        backend.inject_failure(Endpoint::ListWorkers, FailureConfig::disconnect().with_fail_count(1));

        let (reply, _) = backend.respond(&request(Method::Get, "/api/v1/workers", None));
        assert!(reply.is_err());
        let (reply, _) = backend.respond(&request(Method::Get, "/api/v1/workers", None));
        assert_eq!(reply.unwrap().status, 200);
        assert_eq!(backend.request_count(Endpoint::ListWorkers), 2);
    }
}
