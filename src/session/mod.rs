//! Authentication session
//!
//! Gates every job, run and worker fetch: the sync engine only runs while
//! the machine is authenticated.

mod machine;

pub use machine::{
    Navigation, SessionEffect, SessionError, SessionEvent, SessionMachine, SessionPhase,
    SessionState,
};
