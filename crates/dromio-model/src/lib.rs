//! Dromio domain model
//!
//! Shapes and invariants for the entities the dashboard reads from the
//! scheduler backend: job definitions, their runs, and worker heartbeats.
//! Everything in this crate is pure; no I/O, no clocks except where a
//! caller passes `now` in.

pub mod draft;
pub mod ids;
pub mod job;
pub mod lookup;
pub mod misfire;
pub mod requests;
pub mod run;
pub mod time;
pub mod user;
pub mod worker;

pub use draft::{DraftField, DraftReview, FieldError, JobDraft, ValidationErrors};
pub use ids::{JobId, RunId, UserId, WorkerId};
pub use job::{JobSpec, RunnerConfig, ShellRunner};
pub use lookup::{display_job_name, find_job, has_duplicate_name, UNKNOWN_JOB_NAME};
pub use misfire::{
    decode_label, encode_label, infer_duration, infer_variant_tag, LateWindow, MisfireKind,
    MisfireLabelError, MisfirePolicy,
};
pub use requests::{CreateJobRequest, ListRunsQuery, LoginRequest, ScheduleUpdate, UpdateJobRequest};
pub use run::{JobRun, RunSnapshot, RunState, ShellSnapshot, SnapshotMeta, UnknownRunState};
pub use time::format_time;
pub use user::{User, UserRole};
pub use worker::{WorkerRecord, WorkerStatus, LIVENESS_THRESHOLD_MS};
