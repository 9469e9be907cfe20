//! Dromio console CLI
//!
//! Entry point for the `dromio-console` command-line tool.

use clap::{Parser, Subcommand};
use dromio_console::api::{ApiClient, ApiError, HttpTransport, MockTransport, Transport};
use dromio_console::config::{deep_merge, ConsoleSettings, EffectiveConfig};
use dromio_console::mock::MockBackend;
use dromio_console::views::{JobsView, RunFilters, RunsView, Snapshot, WorkersView};
use dromio_console::{logging, Dashboard, PollRate, SessionPhase};
use dromio_model::{JobId, WorkerId, WorkerStatus};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

const EXIT_API: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_AUTH: i32 = 3;

#[derive(Parser)]
#[command(name = "dromio-console")]
#[command(about = "Dashboard client for the dromio job scheduler", version)]
struct Cli {
    /// Path to config file (layered over ~/.config/dromio/console.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// API base URL, overriding the config files
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[arg(long, env = "DROMIO_USERNAME", global = true)]
    username: Option<String>,

    #[arg(long, env = "DROMIO_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Talk to an in-process demo backend (sign in as admin/admin)
    #[arg(long, global = true)]
    mock: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check credentials and show the signed-in user
    Login,

    /// List jobs
    Jobs {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List recent runs
    Runs {
        /// Only runs of this job
        #[arg(long)]
        job: Option<String>,

        /// Only runs on this worker
        #[arg(long)]
        worker: Option<String>,

        /// Maximum rows (default from config, 100)
        #[arg(long)]
        limit: Option<u32>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List workers with their liveness
    Workers {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Keep jobs, runs and workers fresh until Ctrl-C
    Watch {
        /// Runs poll rate: 0.2s, 1s, 2s, 10s or off
        #[arg(long)]
        rate: Option<PollRate>,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let code = match &cli.command {
        Commands::Config => run_config(&cli),
        Commands::Login => run_login(&cli).await,
        Commands::Jobs { json } => run_jobs(&cli, *json).await,
        Commands::Runs {
            job,
            worker,
            limit,
            json,
        } => run_runs(&cli, job.clone(), worker.clone(), *limit, *json).await,
        Commands::Workers { json } => run_workers(&cli, *json).await,
        Commands::Watch { rate } => run_watch(&cli, *rate).await,
    };
    process::exit(code);
}

fn load_config(cli: &Cli, extra: Option<Value>) -> Result<EffectiveConfig, i32> {
    let mut overrides = json!({});
    if let Some(url) = &cli.base_url {
        overrides["api"] = json!({ "base_url": url });
    }
    if let Some(extra) = extra {
        overrides = deep_merge(overrides, extra);
    }
    let overrides = (overrides != json!({})).then_some(overrides);

    let user_path = EffectiveConfig::default_user_path();
    EffectiveConfig::build(user_path.as_deref(), cli.config.as_deref(), overrides).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        EXIT_CONFIG
    })
}

fn load_settings(cli: &Cli, extra: Option<Value>) -> Result<ConsoleSettings, i32> {
    load_config(cli, extra)?.settings().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        EXIT_CONFIG
    })
}

async fn open_dashboard(cli: &Cli, extra: Option<Value>) -> Result<Arc<Dashboard>, i32> {
    let settings = load_settings(cli, extra)?;
    connect(cli, settings).await
}

/// Build the dashboard and make sure it is signed in.
async fn connect(cli: &Cli, settings: ConsoleSettings) -> Result<Arc<Dashboard>, i32> {
    let transport: Arc<dyn Transport> = if cli.mock {
        Arc::new(MockTransport::with_backend(MockBackend::demo()))
    } else {
        match HttpTransport::new(&settings.api) {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                eprintln!("Error creating HTTP client: {}", e);
                return Err(EXIT_API);
            }
        }
    };

    let dash = Arc::new(Dashboard::new(ApiClient::new(transport), settings));
    if dash.start().await == SessionPhase::Authenticated {
        return Ok(dash);
    }

    let (Some(username), Some(password)) = (&cli.username, &cli.password) else {
        eprintln!("Not signed in: pass --username and --password (or DROMIO_USERNAME / DROMIO_PASSWORD)");
        return Err(EXIT_AUTH);
    };
    match dash.login(username, password).await {
        Ok(_) => Ok(dash),
        Err(e @ ApiError::Transport(_)) => {
            eprintln!("Login failed: {}", e);
            Err(EXIT_API)
        }
        Err(e) => {
            eprintln!("Login failed: {}", e);
            Err(EXIT_AUTH)
        }
    }
}

/// Report a collection that failed to load; `Ok` when there is data.
fn check<T>(what: &str, snapshot: &Snapshot<T>) -> Result<(), i32> {
    match (&snapshot.data, &snapshot.error) {
        (Some(_), _) => Ok(()),
        (None, Some(error)) => {
            eprintln!("Error loading {}: {}", what, error);
            Err(EXIT_API)
        }
        (None, None) => {
            eprintln!("Error loading {}: no data", what);
            Err(EXIT_API)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            EXIT_API
        }
    }
}

fn run_config(cli: &Cli) -> i32 {
    let config = match load_config(cli, None) {
        Ok(config) => config,
        Err(code) => return code,
    };
    match config.to_json() {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            EXIT_API
        }
    }
}

async fn run_login(cli: &Cli) -> i32 {
    let dash = match open_dashboard(cli, None).await {
        Ok(dash) => dash,
        Err(code) => return code,
    };
    match dash.user() {
        Some(user) => {
            println!("Signed in as {} ({})", user.username, user.role);
            0
        }
        None => EXIT_AUTH,
    }
}

async fn run_jobs(cli: &Cli, json_output: bool) -> i32 {
    let dash = match open_dashboard(cli, None).await {
        Ok(dash) => dash,
        Err(code) => return code,
    };

    let view = JobsView::open(dash.clone()).await;
    let snapshot = view.jobs();
    if let Err(code) = check("jobs", &snapshot) {
        return code;
    }
    let jobs = snapshot.data.unwrap_or_default();

    if json_output {
        return print_json(&jobs);
    }
    println!("{:<38} {:<24} {:<8} {:<16} MISFIRE", "ID", "NAME", "ENABLED", "SCHEDULE");
    for job in &jobs {
        println!(
            "{:<38} {:<24} {:<8} {:<16} {}",
            job.id,
            job.name,
            if job.enabled { "yes" } else { "no" },
            job.schedule_cron.as_deref().unwrap_or("-"),
            dromio_model::encode_label(&job.misfire_policy),
        );
    }
    0
}

async fn run_runs(
    cli: &Cli,
    job: Option<String>,
    worker: Option<String>,
    limit: Option<u32>,
    json_output: bool,
) -> i32 {
    let extra = limit.map(|limit| json!({ "runs": { "limit": limit } }));
    let dash = match open_dashboard(cli, extra).await {
        Ok(dash) => dash,
        Err(code) => return code,
    };

    let mut view = RunsView::open(dash.clone()).await;
    let filters = RunFilters {
        job: job.map(JobId::from),
        worker: worker.map(WorkerId::from),
    };
    if filters != RunFilters::default() {
        view.set_filters(filters).await;
    }

    let snapshot = view.rows();
    if let Err(code) = check("runs", &snapshot) {
        return code;
    }
    let rows = snapshot.data.unwrap_or_default();

    if json_output {
        let rows: Vec<Value> = rows
            .iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "jobId": r.job_id,
                    "jobName": r.job_name,
                    "state": r.state,
                    "workerId": r.worker,
                    "scheduledFor": r.scheduled_for,
                    "startedAt": r.started_at,
                    "finishedAt": r.finished_at,
                })
            })
            .collect();
        return print_json(&rows);
    }
    println!("{:<38} {:<24} {:<10} {:<12} STARTED", "ID", "JOB", "STATE", "WORKER");
    for row in &rows {
        println!(
            "{:<38} {:<24} {:<10} {:<12} {}",
            row.id,
            row.job_name,
            row.state.label(),
            row.worker.as_ref().map(|w| w.as_str()).unwrap_or("-"),
            row.started_at,
        );
    }
    0
}

async fn run_workers(cli: &Cli, json_output: bool) -> i32 {
    let dash = match open_dashboard(cli, None).await {
        Ok(dash) => dash,
        Err(code) => return code,
    };

    let view = WorkersView::open(dash.clone()).await;
    let snapshot = view.rows();
    if let Err(code) = check("workers", &snapshot) {
        return code;
    }
    let rows = snapshot.data.unwrap_or_default();

    if json_output {
        let rows: Vec<Value> = rows
            .iter()
            .map(|w| {
                json!({
                    "id": w.id,
                    "displayName": w.display_name,
                    "hostname": w.hostname,
                    "capacity": w.capacity,
                    "status": w.status.to_string(),
                    "lastSeen": w.last_seen,
                    "restartCount": w.restart_count,
                    "version": w.version,
                })
            })
            .collect();
        return print_json(&rows);
    }
    println!("{:<12} {:<20} {:<16} {:<8} {:<9} LAST SEEN", "ID", "NAME", "HOST", "CAPACITY", "STATUS");
    for w in &rows {
        println!(
            "{:<12} {:<20} {:<16} {:<8} {:<9} {}",
            w.id, w.display_name, w.hostname, w.capacity, w.status, w.last_seen
        );
    }
    0
}

async fn run_watch(cli: &Cli, rate: Option<PollRate>) -> i32 {
    let dash = match open_dashboard(cli, None).await {
        Ok(dash) => dash,
        Err(code) => return code,
    };

    let jobs = JobsView::open(dash.clone()).await;
    let workers = WorkersView::open(dash.clone()).await;
    let mut runs = RunsView::open(dash.clone()).await;
    if let Some(rate) = rate {
        runs.set_rate(rate);
    }
    println!("Watching (runs every {}); Ctrl-C to stop", runs.rate());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Error waiting for Ctrl-C: {}", e);
        }
    };
    let report = async {
        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        loop {
            ticker.tick().await;
            let job_rows = jobs.jobs();
            let run_rows = runs.rows();
            let worker_rows = workers.rows();
            let online = worker_rows
                .data
                .as_ref()
                .map(|rows| rows.iter().filter(|w| w.status == WorkerStatus::Online).count())
                .unwrap_or(0);
            println!(
                "jobs: {}  runs: {}  workers online: {}/{}{}",
                job_rows.data.as_ref().map_or(0, Vec::len),
                run_rows.data.as_ref().map_or(0, Vec::len),
                online,
                worker_rows.data.as_ref().map_or(0, Vec::len),
                banner(&[&job_rows.error, &run_rows.error, &worker_rows.error]),
            );
            if !dash.is_authenticated() {
                eprintln!("Session expired");
                return;
            }
        }
    };

    tokio::select! {
        _ = dash.run_until(shutdown) => 0,
        _ = report => EXIT_AUTH,
    }
}

fn banner(errors: &[&Option<String>]) -> String {
    errors
        .iter()
        .find_map(|e| e.as_deref())
        .map(|e| format!("  [error: {}]", e))
        .unwrap_or_default()
}
