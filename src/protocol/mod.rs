//! Dromio API wire protocol
//!
//! Every list, detail and mutation response is wrapped in the same JSON
//! envelope: `{"status": "ok", "data": ...}` on success and
//! `{"status": "error", "error": code, "message": text, "code": http}`
//! on failure.

pub mod envelope;
pub mod errors;

pub use envelope::{ApiEnvelope, ApiFailure, API_PREFIX, SESSION_PREFIX};
pub use errors::ErrorCode;
