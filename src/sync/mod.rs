//! Client-side cache and fetch scheduling
//!
//! Views subscribe to [`QueryKey`]s; the [`SyncEngine`] decides when each
//! key is fetched (initial load, polling, manual refresh, invalidation
//! after a mutation) and which results are allowed to land.

pub mod cache;
pub mod clock;
pub mod engine;
pub mod interval;
pub mod mutation;
pub mod query;

pub use cache::{CacheRead, FetchError, Payload, SubscriptionId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Completion, DiscardReason, FetchOrigin, FetchTicket, SyncEngine, SyncStats};
pub use interval::{PollRate, RefreshInterval, UnknownPollRate};
pub use mutation::Mutation;
pub use query::{QueryKey, QueryPrefix};
