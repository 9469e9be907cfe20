//! View coordinators
//!
//! Each view subscribes to the collections it renders when opened and
//! unsubscribes when dropped. Views hold local selection and filter state
//! only; cached data always comes from the [`Dashboard`](crate::dashboard::Dashboard).

mod history;
mod job_form;
mod jobs;
mod run_detail;
mod runs;
mod workers;

pub use history::JobHistoryView;
pub use job_form::{FormMode, FormOutcome, JobFormView};
pub use jobs::JobsView;
pub use run_detail::{RunDetail, RunDetailView};
pub use runs::{RunFilters, RunRow, RunsView};
pub use workers::{WorkerRow, WorkersView};

use crate::sync::{CacheRead, Payload};

/// One collection as a view renders it. `error` is the banner for the
/// latest failed fetch; `data` is still the last good value when set.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub data: Option<T>,
    pub fetching: bool,
    pub error: Option<String>,
}

impl<T> Snapshot<T> {
    pub(crate) fn from_read(read: CacheRead<'_>, extract: impl FnOnce(&Payload) -> Option<T>) -> Self {
        Self {
            data: read.value().and_then(extract),
            fetching: read.is_fetching(),
            error: read.error().map(|e| e.message.clone()),
        }
    }

    /// Nothing to show yet and nothing went wrong
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Snapshot<U> {
        Snapshot {
            data: self.data.map(f),
            fetching: self.fetching,
            error: self.error,
        }
    }
}
