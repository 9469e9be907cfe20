//! API Envelope Types
//!
//! Defines the JSON response envelope every dromio endpoint emits.
//!
//! Protocol: JSON request body (where there is one) → single JSON envelope.

use serde::{Deserialize, Serialize};

use super::errors::ErrorCode;

/// Path prefix for resource endpoints (jobs, runs, workers)
pub const API_PREFIX: &str = "/api/v1";

/// Path prefix for session endpoints (login, logout, me)
pub const SESSION_PREFIX: &str = "/api";

/// Response envelope
///
/// `data` is absent for operations that return nothing (delete, cancel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ApiEnvelope<T> {
    Ok {
        #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
        data: Option<T>,
    },
    Error {
        /// Error code from the registry
        #[serde(default = "default_error_code")]
        error: ErrorCode,
        /// Human-readable message, shown verbatim
        #[serde(default)]
        message: String,
        /// HTTP status the server meant
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
}

fn default_error_code() -> ErrorCode {
    ErrorCode::Internal
}

/// Error half of an envelope, detached from the payload type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiFailure {
    pub code: ErrorCode,
    pub message: String,
    pub status: Option<u16>,
}

impl<T> ApiEnvelope<T> {
    /// Create a successful envelope
    pub fn ok(data: T) -> Self {
        ApiEnvelope::Ok { data: Some(data) }
    }

    /// Create an error envelope
    pub fn error(status: u16, code: ErrorCode, message: impl Into<String>) -> Self {
        ApiEnvelope::Error {
            error: code,
            message: message.into(),
            code: Some(status),
        }
    }

    /// Payload or failure. A success envelope without data is reported as
    /// `Ok(None)`; callers expecting data decide whether that is an error.
    pub fn into_result(self) -> Result<Option<T>, ApiFailure> {
        match self {
            ApiEnvelope::Ok { data } => Ok(data),
            ApiEnvelope::Error {
                error,
                message,
                code,
            } => Err(ApiFailure {
                code: error,
                message,
                status: code,
            }),
        }
    }
}

impl ApiEnvelope<()> {
    /// Create a successful envelope with no payload
    pub fn empty() -> Self {
        ApiEnvelope::Ok { data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ok_envelope() {
        let env: ApiEnvelope<Vec<u32>> =
            serde_json::from_value(json!({"status": "ok", "data": [1, 2, 3]})).unwrap();
        assert_eq!(env.into_result().unwrap(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_parse_ok_without_data() {
        let env: ApiEnvelope<()> = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert_eq!(env.into_result().unwrap(), None);
    }

    #[test]
    fn test_parse_error_envelope() {
        let env: ApiEnvelope<Vec<u32>> = serde_json::from_value(json!({
            "status": "error",
            "error": "conflict",
            "message": "Job already exists",
            "code": 409
        }))
        .unwrap();

        let failure = env.into_result().unwrap_err();
        assert_eq!(failure.code, ErrorCode::Conflict);
        assert_eq!(failure.message, "Job already exists");
        assert_eq!(failure.status, Some(409));
    }

    #[test]
    fn test_minimal_error_envelope() {
        let env: ApiEnvelope<u32> =
            serde_json::from_value(json!({"status": "error", "message": "Invalid credentials"}))
                .unwrap();
        let failure = env.into_result().unwrap_err();
        assert_eq!(failure.code, ErrorCode::Internal);
        assert_eq!(failure.message, "Invalid credentials");
    }

    #[test]
    fn test_serialize_round_trip_shape() {
        let value = serde_json::to_value(ApiEnvelope::ok(json!({"id": "j1"}))).unwrap();
        assert_eq!(value, json!({"status": "ok", "data": {"id": "j1"}}));

        let value =
            serde_json::to_value(ApiEnvelope::<()>::error(404, ErrorCode::NotFound, "no such job"))
                .unwrap();
        assert_eq!(
            value,
            json!({"status": "error", "error": "not_found", "message": "no such job", "code": 404})
        );
    }
}
