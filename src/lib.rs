//! Dromio console
//!
//! Client side of the dromio job scheduler dashboard: a typed API client,
//! the authentication session that gates it, and a synchronization engine
//! that keeps cached jobs, runs and workers fresh by polling and by
//! invalidating after each mutation.

pub mod api;
pub mod config;
pub mod dashboard;
pub mod logging;
pub mod mock;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod views;

pub use api::{ApiClient, ApiError, ApiResult, HttpTransport, MockTransport, Transport};
pub use config::{ConfigError, ConsoleSettings, EffectiveConfig};
pub use dashboard::Dashboard;
pub use session::{Navigation, SessionPhase};
pub use sync::{Mutation, PollRate, QueryKey, QueryPrefix, RefreshInterval, SyncEngine};
