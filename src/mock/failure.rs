//! Failure injection for the mock backend

use std::collections::HashMap;

use crate::protocol::ErrorCode;

use super::backend::Endpoint;

/// What an injected failure looks like to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// An error envelope with this HTTP status
    Status {
        status: u16,
        code: ErrorCode,
        message: String,
    },
    /// A bare 401, as an expired session produces
    Unauthorized,
    /// No response at all
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct FailureConfig {
    pub kind: FailureKind,
    /// Number of calls that fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Status {
                status,
                code: ErrorCode::for_status(status),
                message: message.into(),
            },
            fail_count: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            kind: FailureKind::Unauthorized,
            fail_count: None,
        }
    }

    pub fn disconnect() -> Self {
        Self {
            kind: FailureKind::Disconnect,
            fail_count: None,
        }
    }

    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<Endpoint, FailureConfig>,
    call_counts: HashMap<Endpoint, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, endpoint: Endpoint, config: FailureConfig) {
        self.configs.insert(endpoint, config);
        self.call_counts.insert(endpoint, 0);
    }

    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    pub fn clear_endpoint(&mut self, endpoint: Endpoint) {
        self.configs.remove(&endpoint);
        self.call_counts.remove(&endpoint);
    }

    /// The failure to apply to this call, if any
    pub fn check(&mut self, endpoint: Endpoint) -> Option<&FailureConfig> {
        let config = self.configs.get(&endpoint)?;
        let count = self.call_counts.entry(endpoint).or_insert(0);
        *count += 1;

        match config.fail_count {
            Some(limit) if *count > limit => None,
            _ => Some(config),
        }
    }
}
