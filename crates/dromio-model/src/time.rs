//! Timestamp rendering

use chrono::{DateTime, Utc};

/// Placeholder for timestamps that are not set yet.
pub const NO_TIME: &str = "—";

pub fn format_time(t: Option<DateTime<Utc>>) -> String {
    match t {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => NO_TIME.to_string(),
    }
}
