//! Dashboard driver
//!
//! Owns the API client, the session machine and the sync engine, and
//! performs the fetches the engine asks for. Every other part of the
//! console (views, CLI) goes through a shared [`Dashboard`].
//!
//! Locks are never held across an await: state is read or updated, the
//! guard is dropped, then the network call happens.

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dromio_model::{
    CreateJobRequest, JobId, JobRun, JobSpec, LoginRequest, RunId, UpdateJobRequest, User,
};

use crate::api::{ApiClient, ApiError, ApiResult};
use crate::config::ConsoleSettings;
use crate::session::{Navigation, SessionEffect, SessionEvent, SessionMachine, SessionPhase};
use crate::sync::{
    CacheRead, Clock, Completion, DiscardReason, FetchTicket, Mutation, Payload, QueryKey, QueryPrefix,
    RefreshInterval, SubscriptionId, SyncEngine, SyncStats, SystemClock,
};

/// Scheduler resolution for [`Dashboard::run_until`]
const TICK: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Dashboard {
    client: ApiClient,
    settings: ConsoleSettings,
    clock: Arc<dyn Clock>,
    session: Mutex<SessionMachine>,
    engine: Mutex<SyncEngine>,
}

impl Dashboard {
    pub fn new(client: ApiClient, settings: ConsoleSettings) -> Self {
        Self::with_clock(client, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(client: ApiClient, settings: ConsoleSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            settings,
            clock,
            session: Mutex::new(SessionMachine::new()),
            engine: Mutex::new(SyncEngine::new()),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    // === Session ===

    pub fn session_phase(&self) -> SessionPhase {
        lock(&self.session).phase()
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.session).is_authenticated()
    }

    pub fn user(&self) -> Option<User> {
        lock(&self.session).user().cloned()
    }

    pub fn login_error(&self) -> Option<String> {
        lock(&self.session).last_error().map(str::to_string)
    }

    /// Probe the session once at startup.
    pub async fn start(&self) -> SessionPhase {
        let event = match self.client.me().await {
            Ok(user) => SessionEvent::ProbeSucceeded(user),
            Err(err) => {
                if !err.is_auth() {
                    tracing::warn!(error = %err, "Session probe failed");
                }
                SessionEvent::ProbeFailed
            }
        };
        let tickets = self.apply_session(event);
        self.execute(tickets).await;
        self.session_phase()
    }

    /// Sign in. A refused login leaves the session where it was and returns
    /// the server's message.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<User> {
        let credentials = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.client.login(&credentials).await {
            Ok(user) => {
                let tickets = self.apply_session(SessionEvent::LoginSucceeded(user.clone()));
                self.execute(tickets).await;
                Ok(user)
            }
            Err(err) => {
                self.apply_session(SessionEvent::LoginFailed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Sign out. The session ends locally even if the server call fails.
    pub async fn logout(&self) -> Navigation {
        if let Err(err) = self.client.logout().await {
            tracing::warn!(error = %err, "Logout request failed");
        }
        self.apply_session(SessionEvent::LoggedOut);
        Navigation::ToLogin
    }

    fn expire(&self) {
        if self.is_authenticated() {
            tracing::warn!("Session expired");
            self.apply_session(SessionEvent::Expired);
        }
    }

    fn apply_session(&self, event: SessionEvent) -> Vec<FetchTicket> {
        let effect = match lock(&self.session).apply(event) {
            Ok(effect) => effect,
            Err(err) => {
                tracing::warn!(error = %err, "Ignoring session event");
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let mut engine = lock(&self.engine);
        match effect {
            SessionEffect::None => Vec::new(),
            SessionEffect::Resume => engine.resume(now),
            SessionEffect::Restart => {
                engine.suspend();
                engine.resume(now)
            }
            SessionEffect::Suspend | SessionEffect::SuspendAndNavigate(_) => {
                engine.suspend();
                Vec::new()
            }
        }
    }

    // === Subscriptions and reads ===

    /// Subscribe to `key` and wait for its initial fetch, if one was needed.
    pub async fn open(&self, key: QueryKey, interval: RefreshInterval) -> SubscriptionId {
        let now = self.clock.now();
        let (id, ticket) = lock(&self.engine).subscribe(key, interval, now);
        self.execute(ticket.into_iter().collect()).await;
        id
    }

    pub fn close(&self, id: SubscriptionId) {
        lock(&self.engine).unsubscribe(id, self.clock.now());
    }

    pub fn set_interval(&self, id: SubscriptionId, interval: RefreshInterval) -> bool {
        lock(&self.engine).set_interval(id, interval, self.clock.now())
    }

    /// Run `f` over the current cache state of `key`.
    pub fn read<R>(&self, key: &QueryKey, f: impl FnOnce(CacheRead<'_>) -> R) -> R {
        f(lock(&self.engine).get(key))
    }

    pub fn jobs(&self) -> Option<Vec<JobSpec>> {
        self.read(&QueryKey::Jobs, |read| {
            read.value().and_then(Payload::as_jobs).map(<[JobSpec]>::to_vec)
        })
    }

    pub fn stats(&self) -> SyncStats {
        lock(&self.engine).stats()
    }

    /// Manual refresh. Returns false when it folded into a fetch already out.
    pub async fn refresh(&self, key: &QueryKey) -> bool {
        let ticket = lock(&self.engine).refresh(key, self.clock.now());
        let issued = ticket.is_some();
        self.execute(ticket.into_iter().collect()).await;
        issued
    }

    pub async fn invalidate(&self, prefix: &QueryPrefix) {
        let tickets = lock(&self.engine).invalidate(prefix, self.clock.now());
        self.execute(tickets).await;
    }

    /// Fetch whatever is due now and wait for it.
    pub async fn tick(&self) {
        let tickets = lock(&self.engine).tick(self.clock.now());
        self.execute(tickets).await;
    }

    /// Poll until `shutdown` resolves. Fetches run concurrently on this
    /// task; a slow one does not hold up polls of other keys.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut in_flight = FuturesUnordered::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let due = lock(&self.engine).tick(self.clock.now());
                    for ticket in due {
                        in_flight.push(self.fetch(ticket));
                    }
                }
                Some((ticket, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                    for follow_up in self.settle(&ticket, outcome) {
                        in_flight.push(self.fetch(follow_up));
                    }
                }
            }
        }
        tracing::info!(pending = in_flight.len(), "Polling stopped");
    }

    // === Fetching ===

    async fn execute(&self, tickets: Vec<FetchTicket>) {
        let mut pending = tickets;
        while !pending.is_empty() {
            let results = join_all(pending.into_iter().map(|t| self.fetch(t))).await;
            pending = results
                .into_iter()
                .flat_map(|(ticket, outcome)| self.settle(&ticket, outcome))
                .collect();
        }
    }

    async fn fetch(&self, ticket: FetchTicket) -> (FetchTicket, ApiResult<Payload>) {
        let outcome = match &ticket.key {
            QueryKey::Jobs => self.client.list_jobs().await.map(Payload::Jobs),
            QueryKey::Job(id) => self.client.get_job(id).await.map(Payload::Job),
            QueryKey::Runs(query) => self.client.list_runs(query).await.map(Payload::Runs),
            QueryKey::Workers => self.client.list_workers().await.map(Payload::Workers),
        };
        (ticket, outcome)
    }

    /// Hand one outcome to the engine; returns follow-up tickets.
    fn settle(&self, ticket: &FetchTicket, outcome: ApiResult<Payload>) -> Vec<FetchTicket> {
        let auth_failure = matches!(&outcome, Err(err) if err.is_auth());
        let completion = lock(&self.engine).complete(
            ticket,
            outcome.map_err(|err| err.to_string()),
            self.clock.now(),
        );
        match completion {
            Completion::Applied { follow_up } => follow_up,
            // a 401 on a fetch from a previous session says nothing about this one
            Completion::Discarded(DiscardReason::Reset) => Vec::new(),
            Completion::Failed | Completion::Discarded(_) => {
                if auth_failure {
                    self.expire();
                }
                Vec::new()
            }
        }
    }

    // === Mutations ===

    async fn mutate<T, Fut>(&self, mutation: Mutation, call: Fut) -> ApiResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        if !self.is_authenticated() {
            return Err(ApiError::Unauthenticated {
                message: "Sign in first".to_string(),
            });
        }
        match call.await {
            Ok(value) => {
                let tickets = lock(&self.engine).apply_mutation(&mutation, self.clock.now());
                self.execute(tickets).await;
                Ok(value)
            }
            Err(err) => {
                if err.is_auth() {
                    self.expire();
                } else {
                    tracing::warn!(mutation = %mutation, error = %err, "Mutation rejected");
                }
                Err(err)
            }
        }
    }

    pub async fn create_job(&self, request: &CreateJobRequest) -> ApiResult<JobSpec> {
        self.mutate(Mutation::CreateJob, self.client.create_job(request))
            .await
    }

    pub async fn update_job(&self, id: &JobId, request: &UpdateJobRequest) -> ApiResult<JobSpec> {
        self.mutate(Mutation::UpdateJob(id.clone()), self.client.update_job(id, request))
            .await
    }

    pub async fn delete_job(&self, id: &JobId) -> ApiResult<()> {
        self.mutate(Mutation::DeleteJob(id.clone()), self.client.delete_job(id))
            .await
    }

    pub async fn set_enabled(&self, id: &JobId, enabled: bool) -> ApiResult<JobSpec> {
        if enabled {
            self.mutate(Mutation::EnableJob(id.clone()), self.client.enable_job(id))
                .await
        } else {
            self.mutate(Mutation::DisableJob(id.clone()), self.client.disable_job(id))
                .await
        }
    }

    pub async fn run_now(&self, id: &JobId) -> ApiResult<JobRun> {
        self.mutate(Mutation::RunNow(id.clone()), self.client.run_job(id))
            .await
    }

    /// Cancel a queued run. `job` scopes the invalidation.
    pub async fn cancel_run(&self, run: &RunId, job: &JobId) -> ApiResult<()> {
        let mutation = Mutation::CancelRun {
            run: run.clone(),
            job: job.clone(),
        };
        self.mutate(mutation, self.client.cancel_run(run)).await
    }
}
