//! Fetch ordering tests
//!
//! Responses are held at the mock backend so an older fetch can be made to
//! land after a newer one. The newest initiated fetch must win.

use chrono::{DateTime, Utc};
use dromio_console::api::{ApiClient, MockTransport};
use dromio_console::config::ConsoleSettings;
use dromio_console::mock::{Endpoint, MockBackend};
use dromio_console::sync::{ManualClock, Payload, QueryKey, QueryPrefix, RefreshInterval};
use dromio_console::Dashboard;
use dromio_model::{ListRunsQuery, RunState, UserRole};
use std::sync::Arc;
use std::time::Duration;

async fn signed_in() -> (Arc<Dashboard>, MockBackend, Arc<ManualClock>) {
    let backend = MockBackend::new();
    backend.add_user("ops", "hunter2", UserRole::Operator);
    let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
    let dash = Arc::new(Dashboard::with_clock(
        ApiClient::new(Arc::new(MockTransport::with_backend(backend.clone()))),
        ConsoleSettings::default(),
        clock.clone(),
    ));
    dash.start().await;
    dash.login("ops", "hunter2").await.unwrap();
    (dash, backend, clock)
}

fn run_states(dash: &Dashboard, key: &QueryKey) -> Vec<RunState> {
    dash.read(key, |read| {
        read.value()
            .and_then(Payload::as_runs)
            .map(|runs| runs.iter().map(|r| r.state).collect())
            .unwrap_or_default()
    })
}

// =============================================================================
// Late older response
// =============================================================================

#[tokio::test]
async fn test_late_poll_does_not_overwrite_invalidation() {
    let (dash, backend, clock) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let run = backend.queue_run(&job.id).unwrap();
    let key = QueryKey::runs_for_job(job.id.clone());
    dash.open(key.clone(), RefreshInterval::from_millis(15_000)).await;
    assert_eq!(run_states(&dash, &key), vec![RunState::Queued]);

    // t=0: a poll goes out and its response is held (it saw "queued")
    let gate = backend.hold_next(Endpoint::ListRuns);
    clock.advance(Duration::from_millis(15_000));
    let slow = dash.tick();
    tokio::pin!(slow);
    assert!(futures::poll!(&mut slow).is_pending());

    // t=100: the run starts and an invalidation refetches; it lands first
    backend.advance_run(&run.id, RunState::Running, None);
    clock.advance(Duration::from_millis(100));
    dash.invalidate(&QueryPrefix::runs_for_job(&job.id)).await;
    assert_eq!(run_states(&dash, &key), vec![RunState::Running]);

    // t=200: the old poll finally answers
    gate.send(()).unwrap();
    slow.await;
    assert_eq!(run_states(&dash, &key), vec![RunState::Running]);
    assert_eq!(dash.stats().discarded, 1);
}

#[tokio::test]
async fn test_mutation_refetch_beats_in_flight_poll() {
    let (dash, backend, clock) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    dash.open(QueryKey::Jobs, RefreshInterval::from_millis(3000)).await;

    let gate = backend.hold_next(Endpoint::ListJobs);
    clock.advance(Duration::from_millis(3000));
    let poll = dash.tick();
    tokio::pin!(poll);
    assert!(futures::poll!(&mut poll).is_pending());

    dash.set_enabled(&job.id, false).await.unwrap();
    assert!(!dash.jobs().unwrap()[0].enabled);

    gate.send(()).unwrap();
    poll.await;
    assert!(!dash.jobs().unwrap()[0].enabled);
}

#[tokio::test]
async fn test_in_order_responses_both_apply() {
    let (dash, backend, _) = signed_in().await;
    backend.seed_job("backup", "pg_dump app");
    dash.open(QueryKey::Jobs, RefreshInterval::Manual).await;
    let applied = dash.stats().applied;

    dash.refresh(&QueryKey::Jobs).await;
    backend.seed_job("report", "./report");
    dash.invalidate(&QueryPrefix::jobs()).await;

    assert_eq!(dash.stats().applied, applied + 2);
    assert_eq!(dash.jobs().map(|j| j.len()), Some(2));
}

// =============================================================================
// Coalescing and unsubscribe
// =============================================================================

#[tokio::test]
async fn test_manual_refresh_coalesces_into_in_flight_fetch() {
    let (dash, backend, _) = signed_in().await;
    dash.open(QueryKey::Workers, RefreshInterval::Manual).await;
    assert_eq!(backend.request_count(Endpoint::ListWorkers), 1);

    let gate = backend.hold_next(Endpoint::ListWorkers);
    let first = dash.refresh(&QueryKey::Workers);
    tokio::pin!(first);
    assert!(futures::poll!(&mut first).is_pending());

    // clicks while the first refresh is out
    assert!(!dash.refresh(&QueryKey::Workers).await);
    assert!(!dash.refresh(&QueryKey::Workers).await);

    gate.send(()).unwrap();
    assert!(first.await);
    assert_eq!(backend.request_count(Endpoint::ListWorkers), 2);
    assert_eq!(dash.stats().coalesced, 2);
}

#[tokio::test]
async fn test_result_for_closed_view_is_dropped() {
    let (dash, backend, _) = signed_in().await;
    backend.seed_job("backup", "pg_dump app");
    let id = dash.open(QueryKey::Jobs, RefreshInterval::Manual).await;

    let gate = backend.hold_next(Endpoint::ListJobs);
    let pending = dash.refresh(&QueryKey::Jobs);
    tokio::pin!(pending);
    assert!(futures::poll!(&mut pending).is_pending());

    dash.close(id);
    gate.send(()).unwrap();
    pending.await;
    assert!(dash.read(&QueryKey::Jobs, |r| r.is_pending()));
    assert_eq!(dash.stats().discarded, 1);
}

#[tokio::test]
async fn test_run_state_change_refreshes_other_views() {
    let (dash, backend, clock) = signed_in().await;
    let job = backend.seed_job("backup", "pg_dump app");
    let run = backend.queue_run(&job.id).unwrap();

    let history = QueryKey::runs_for_job(job.id.clone());
    let all = QueryKey::Runs(ListRunsQuery::default().with_limit(100));
    dash.open(history.clone(), RefreshInterval::from_millis(15_000)).await;
    dash.open(all.clone(), RefreshInterval::from_millis(200)).await;

    backend.advance_run(&run.id, RunState::Running, None);
    clock.advance(Duration::from_millis(200));
    dash.tick().await;

    // the fast list saw the change and the history caught up without its own poll
    assert_eq!(run_states(&dash, &all), vec![RunState::Running]);
    assert_eq!(run_states(&dash, &history), vec![RunState::Running]);
    assert_eq!(backend.request_count(Endpoint::ListRuns), 4);
}
