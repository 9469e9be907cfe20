//! Create and edit job form
//!
//! Validation runs before anything is sent. A name already used by another
//! job only warns: [`FormOutcome::NeedsConfirmation`] asks the user, and
//! [`JobFormView::confirm`] submits anyway.

use std::sync::Arc;

use dromio_model::{DraftReview, JobDraft, JobId, JobSpec, ValidationErrors};

use crate::api::ApiError;
use crate::dashboard::Dashboard;
use crate::sync::{QueryKey, RefreshInterval, SubscriptionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(JobId),
}

#[derive(Debug)]
pub enum FormOutcome {
    /// Blocked locally; nothing was sent
    Invalid(ValidationErrors),
    NeedsConfirmation(String),
    Saved(JobSpec),
    /// The server refused; shown next to the submit button
    Rejected(ApiError),
}

pub struct JobFormView {
    dash: Arc<Dashboard>,
    // keeps the job list loaded for the duplicate-name check
    subscription: SubscriptionId,
    mode: FormMode,
    pub draft: JobDraft,
}

impl JobFormView {
    pub async fn create(dash: Arc<Dashboard>) -> Self {
        Self::open(dash, FormMode::Create, JobDraft::default()).await
    }

    pub async fn edit(dash: Arc<Dashboard>, job: &JobSpec) -> Self {
        Self::open(dash, FormMode::Edit(job.id.clone()), JobDraft::from_job(job)).await
    }

    async fn open(dash: Arc<Dashboard>, mode: FormMode, draft: JobDraft) -> Self {
        let subscription = dash.open(QueryKey::Jobs, RefreshInterval::Manual).await;
        Self {
            dash,
            subscription,
            mode,
            draft,
        }
    }

    pub fn mode(&self) -> &FormMode {
        &self.mode
    }

    pub async fn submit(&mut self) -> FormOutcome {
        let existing = self.dash.jobs().unwrap_or_default();
        let editing = match &self.mode {
            FormMode::Create => None,
            FormMode::Edit(id) => Some(id),
        };
        match self.draft.clone().review(&existing, editing) {
            Err(errors) => FormOutcome::Invalid(errors),
            Ok(DraftReview::NeedsConfirmation { warning, .. }) => {
                FormOutcome::NeedsConfirmation(warning)
            }
            Ok(DraftReview::Ready(draft)) => self.save(&draft).await,
        }
    }

    /// Submit after the user accepted the duplicate-name warning.
    pub async fn confirm(&mut self) -> FormOutcome {
        if let Err(errors) = self.draft.validate() {
            return FormOutcome::Invalid(errors);
        }
        let draft = self.draft.clone();
        self.save(&draft).await
    }

    async fn save(&mut self, draft: &JobDraft) -> FormOutcome {
        let result = match &self.mode {
            FormMode::Create => self.dash.create_job(&draft.to_create_request()).await,
            FormMode::Edit(id) => self.dash.update_job(id, &draft.to_update_request()).await,
        };
        match result {
            Ok(job) => {
                // further saves from this form edit the job just written
                self.mode = FormMode::Edit(job.id.clone());
                FormOutcome::Saved(job)
            }
            Err(err) => FormOutcome::Rejected(err),
        }
    }
}

impl Drop for JobFormView {
    fn drop(&mut self) {
        self.dash.close(self.subscription);
    }
}
