//! API Error Code Registry
//!
//! Machine-readable codes the server puts in the `error` field of an
//! error envelope.

use serde::{Deserialize, Serialize};

/// Error codes in API error envelopes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// No valid session
    Unauthenticated,
    /// Session valid, role insufficient
    Forbidden,
    /// Referenced entity does not exist
    NotFound,
    /// Entity already exists
    Conflict,
    /// Malformed field values
    InvalidInput,
    /// Field values fail server-side validation
    ValidationError,
    /// Server-side failure
    Internal,
    /// A code this client does not know; kept verbatim
    Other(String),
}

impl ErrorCode {
    /// Returns the string representation of the error code
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::Internal => "internal",
            ErrorCode::Other(code) => code,
        }
    }

    /// Codes that mean the session is gone rather than the request is bad
    pub fn is_auth(&self) -> bool {
        matches!(self, ErrorCode::Unauthenticated)
    }

    /// Default code for an HTTP status when the body carries none
    pub fn for_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthenticated,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            400 | 422 => ErrorCode::InvalidInput,
            _ => ErrorCode::Internal,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        match s.as_str() {
            "unauthenticated" | "unauthorized" => ErrorCode::Unauthenticated,
            "forbidden" => ErrorCode::Forbidden,
            "not_found" => ErrorCode::NotFound,
            "conflict" => ErrorCode::Conflict,
            "invalid_input" => ErrorCode::InvalidInput,
            "validation_error" => ErrorCode::ValidationError,
            "internal" => ErrorCode::Internal,
            _ => ErrorCode::Other(s),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::NotFound.as_str(), "not_found");
        assert_eq!(ErrorCode::from("conflict".to_string()), ErrorCode::Conflict);
        assert_eq!(
            ErrorCode::from("rate_limited".to_string()),
            ErrorCode::Other("rate_limited".to_string())
        );
        assert_eq!(ErrorCode::Other("rate_limited".to_string()).to_string(), "rate_limited");
    }

    #[test]
    fn test_auth_codes() {
        assert!(ErrorCode::from("unauthorized".to_string()).is_auth());
        assert!(ErrorCode::for_status(401).is_auth());
        assert!(!ErrorCode::for_status(403).is_auth());
        assert_eq!(ErrorCode::for_status(500), ErrorCode::Internal);
    }
}
