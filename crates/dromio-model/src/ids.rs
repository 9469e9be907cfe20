//! Opaque identifiers.
//!
//! The backend hands out UUIDs, but the client never inspects them, so
//! they are carried as strings and compared by value.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Stable identity of a job definition.
    JobId
);
opaque_id!(
    /// Identity of a single run.
    RunId
);
opaque_id!(
    /// Identity of a worker process.
    WorkerId
);
opaque_id!(UserId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = JobId::new("j1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"j1\"");

        let parsed: WorkerId = serde_json::from_str("\"w-7\"").unwrap();
        assert_eq!(parsed.as_str(), "w-7");
    }
}
