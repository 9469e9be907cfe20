//! Mutation and view tests
//!
//! Each mutation refetches exactly the collections it affects, right after
//! the server accepts it, without waiting for a poll.

use chrono::{DateTime, Utc};
use dromio_console::api::{ApiClient, ApiError, MockTransport};
use dromio_console::config::ConsoleSettings;
use dromio_console::mock::{Endpoint, FailureConfig, MockBackend};
use dromio_console::sync::ManualClock;
use dromio_console::views::{
    FormMode, FormOutcome, JobFormView, JobHistoryView, JobsView, RunDetailView, RunsView,
};
use dromio_console::Dashboard;
use dromio_model::{DraftField, MisfireKind, MisfirePolicy, RunState, UserRole, UNKNOWN_JOB_NAME};
use std::sync::Arc;

async fn signed_in() -> (Arc<Dashboard>, MockBackend) {
    let backend = MockBackend::new();
    backend.add_user("ops", "hunter2", UserRole::Operator);
    let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
    let dash = Arc::new(Dashboard::with_clock(
        ApiClient::new(Arc::new(MockTransport::with_backend(backend.clone()))),
        ConsoleSettings::default(),
        clock,
    ));
    dash.start().await;
    dash.login("ops", "hunter2").await.unwrap();
    (dash, backend)
}

// =============================================================================
// Jobs list
// =============================================================================

#[tokio::test]
async fn test_disable_reflected_without_poll() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let view = JobsView::open(dash.clone()).await;
    assert!(view.jobs().data.unwrap()[0].enabled);

    let updated = view.toggle_enabled(&job).await.unwrap();
    assert!(!updated.enabled);
    // clock never moved: the refetch came from invalidation
    assert!(!view.jobs().data.unwrap()[0].enabled);
    assert_eq!(backend.request_count(Endpoint::ListJobs), 2);
}

#[tokio::test]
async fn test_run_now_invalidates_runs_only() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let jobs = JobsView::open(dash.clone()).await;
    let history = JobHistoryView::open(dash.clone(), job.id.clone()).await;
    assert_eq!(history.rows().data.map(|r| r.len()), Some(0));
    let job_fetches = backend.request_count(Endpoint::ListJobs);

    let run = jobs.run_now(&job.id).await.unwrap();
    assert_eq!(run.state, RunState::Queued);

    let rows = history.rows().data.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].job_name, "backup");
    assert!(rows[0].can_cancel);
    assert_eq!(backend.request_count(Endpoint::ListJobs), job_fetches);
}

#[tokio::test]
async fn test_deleted_job_renders_unknown_name() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    backend.queue_run(&job.id).unwrap();
    let mut jobs = JobsView::open(dash.clone()).await;
    let runs = RunsView::open(dash.clone()).await;
    jobs.select(Some(job.id.clone()));
    assert_eq!(runs.rows().data.unwrap()[0].job_name, "backup");

    jobs.delete(&job.id).await.unwrap();
    assert!(jobs.selected().is_none());
    assert_eq!(jobs.jobs().data.map(|j| j.len()), Some(0));
    // the run outlives its job
    assert_eq!(runs.rows().data.unwrap()[0].job_name, UNKNOWN_JOB_NAME);
}

#[tokio::test]
async fn test_rejected_mutation_leaves_cache_alone() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let view = JobsView::open(dash.clone()).await;
    backend.inject_failure(Endpoint::DeleteJob, FailureConfig::error(409, "Job has active runs"));
    let fetches = backend.request_count(Endpoint::ListJobs);

    let err = dash.delete_job(&job.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 409, .. }));
    assert_eq!(err.to_string(), "Job has active runs");
    assert_eq!(view.jobs().data.map(|j| j.len()), Some(1));
    assert_eq!(backend.request_count(Endpoint::ListJobs), fetches);
}

// =============================================================================
// Job form
// =============================================================================

#[tokio::test]
async fn test_duplicate_name_needs_confirmation() {
    let (dash, backend) = signed_in().await;
    backend.seed_job("backup", "pg_dump app");
    let mut form = JobFormView::create(dash.clone()).await;
    form.draft.name = "backup".to_string();
    form.draft.command = "pg_dump other".to_string();

    let outcome = form.submit().await;
    assert!(
        matches!(&outcome, FormOutcome::NeedsConfirmation(w) if w.contains("backup")),
        "got {outcome:?}"
    );
    assert_eq!(backend.request_count(Endpoint::CreateJob), 0);

    let FormOutcome::Saved(job) = form.confirm().await else {
        panic!("confirmed submission should save");
    };
    assert_eq!(job.name, "backup");
    assert_eq!(dash.jobs().map(|j| j.len()), Some(2));
    assert_eq!(form.mode(), &FormMode::Edit(job.id.clone()));
}

#[tokio::test]
async fn test_invalid_form_never_reaches_network() {
    let (dash, backend) = signed_in().await;
    let mut form = JobFormView::create(dash.clone()).await;
    form.draft.cron = "every tuesday".to_string();

    let FormOutcome::Invalid(errors) = form.submit().await else {
        panic!("empty form should not validate");
    };
    assert!(errors.for_field(DraftField::Name).is_some());
    assert!(errors.for_field(DraftField::Command).is_some());
    assert!(errors.for_field(DraftField::Cron).is_some());
    assert_eq!(backend.request_count(Endpoint::CreateJob), 0);
}

#[tokio::test]
async fn test_edit_form_updates_job() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let mut form = JobFormView::edit(dash.clone(), &job).await;
    assert_eq!(form.draft.command, "pg_dump app");

    form.draft.cron = "0 3 * * *".to_string();
    form.draft.misfire_kind = MisfireKind::RunIfLateWithin;
    form.draft.misfire_duration_secs = 300;
    let FormOutcome::Saved(saved) = form.submit().await else {
        panic!("edit should save");
    };

    assert_eq!(saved.schedule_cron.as_deref(), Some("0 3 * * *"));
    assert!(matches!(saved.misfire_policy, MisfirePolicy::RunIfLateWithin(_)));
    let cached = dash.jobs().unwrap();
    assert_eq!(cached[0].schedule_cron.as_deref(), Some("0 3 * * *"));
}

// =============================================================================
// Run detail
// =============================================================================

#[tokio::test]
async fn test_cancel_queued_run() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let run = backend.queue_run(&job.id).unwrap();
    let view = RunDetailView::open(dash.clone(), run.id.clone(), job.id.clone()).await;

    let detail = view.detail().unwrap();
    assert!(detail.can_cancel);
    assert!(!detail.can_rerun);
    assert_eq!(detail.command.as_deref(), Some("pg_dump app"));

    view.cancel().await.unwrap();
    let detail = view.detail().unwrap();
    assert_eq!(detail.run.state, RunState::Cancelled);
    assert!(detail.can_rerun);
}

#[tokio::test]
async fn test_cancel_running_run_is_rejected() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let run = backend.queue_run(&job.id).unwrap();
    backend.advance_run(&run.id, RunState::Running, None);
    let view = RunDetailView::open(dash.clone(), run.id.clone(), job.id.clone()).await;

    let err = view.cancel().await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected { status: 409, .. }));
    assert_eq!(view.detail().unwrap().run.state, RunState::Running);
}

#[tokio::test]
async fn test_snapshot_command_survives_edit() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let run = backend.queue_run(&job.id).unwrap();
    let view = RunDetailView::open(dash.clone(), run.id.clone(), job.id.clone()).await;

    let mut form = JobFormView::edit(dash.clone(), &job).await;
    form.draft.command = "pg_dump --clean app".to_string();
    assert!(matches!(form.submit().await, FormOutcome::Saved(_)));

    // the run shows what was dispatched, not the job's new command
    assert_eq!(view.detail().unwrap().command.as_deref(), Some("pg_dump app"));
}

#[tokio::test]
async fn test_rerun_from_detail() {
    let (dash, backend) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let run = backend.queue_run(&job.id).unwrap();
    backend.advance_run(&run.id, RunState::Running, None);
    backend.advance_run(&run.id, RunState::Failed, None);
    let view = RunDetailView::open(dash.clone(), run.id.clone(), job.id.clone()).await;
    assert!(view.detail().unwrap().can_rerun);

    let rerun = view.rerun().await.unwrap();
    assert_eq!(rerun.job_id, job.id);
    assert_eq!(backend.runs().len(), 2);
}
