//! Mock Dromio backend
//!
//! Serves the session, job, run and worker endpoints in process so the
//! client, session machine and sync engine can be tested end to end.
//! Supports per-endpoint failure injection, request counting and held
//! responses for ordering tests.

mod backend;
mod failure;
mod state;

pub use backend::{Endpoint, MockBackend};
pub use failure::{FailureConfig, FailureInjector, FailureKind};
pub use state::{Account, MockState};
