//! Job form model and client-side validation
//!
//! Validation failures never reach the network: a draft has to pass
//! [`JobDraft::validate`] before a create or update request is built from
//! it. The duplicate-name check is separate because it only warns.

use regex_lite::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::ids::JobId;
use crate::job::JobSpec;
use crate::lookup::has_duplicate_name;
use crate::misfire::{infer_duration, infer_variant_tag, MisfireKind};
use crate::requests::{CreateJobRequest, ScheduleUpdate, UpdateJobRequest};

/// Characters allowed in one cron field (numbers, names, ranges, steps,
/// lists and the Quartz extensions).
const CRON_FIELD_PATTERN: &str = r"^[0-9A-Za-z*?/,\-#]+$";

const CRON_MACROS: &[&str] = &[
    "@yearly", "@annually", "@monthly", "@weekly", "@daily", "@midnight", "@hourly",
];

fn cron_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CRON_FIELD_PATTERN).expect("cron field pattern compiles"))
}

/// Editable job fields, as the form holds them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDraft {
    pub name: String,
    /// Empty means no schedule.
    pub cron: String,
    pub command: String,
    pub max_concurrency: u32,
    pub misfire_kind: MisfireKind,
    /// Only read when `misfire_kind` is the late-window variant.
    pub misfire_duration_secs: u64,
}

impl Default for JobDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            cron: String::new(),
            command: String::new(),
            max_concurrency: 1,
            misfire_kind: MisfireKind::RunImmediately,
            misfire_duration_secs: 0,
        }
    }
}

/// Form field a validation message is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Name,
    Cron,
    Command,
    MaxConcurrency,
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftField::Name => write!(f, "name"),
            DraftField::Cron => write!(f, "cron"),
            DraftField::Command => write!(f, "command"),
            DraftField::MaxConcurrency => write!(f, "max_concurrency"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: DraftField,
    pub message: String,
}

/// Every problem found in a draft, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", describe(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn for_field(&self, field: DraftField) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

/// Outcome of reviewing a valid draft against the loaded jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftReview {
    Ready(JobDraft),
    /// Submission allowed only after the user confirms the warning.
    NeedsConfirmation { draft: JobDraft, warning: String },
}

impl DraftReview {
    pub fn warning(&self) -> Option<&str> {
        match self {
            DraftReview::Ready(_) => None,
            DraftReview::NeedsConfirmation { warning, .. } => Some(warning),
        }
    }

    /// The user accepted the warning (or there was none).
    pub fn confirm(self) -> JobDraft {
        match self {
            DraftReview::Ready(draft) => draft,
            DraftReview::NeedsConfirmation { draft, .. } => draft,
        }
    }
}

impl JobDraft {
    /// Pre-populate the edit form from an existing job.
    pub fn from_job(job: &JobSpec) -> Self {
        Self {
            name: job.name.clone(),
            cron: job.schedule_cron.clone().unwrap_or_default(),
            command: job.command().unwrap_or_default().to_string(),
            max_concurrency: job.max_concurrency,
            misfire_kind: infer_variant_tag(&job.misfire_policy),
            misfire_duration_secs: infer_duration(&job.misfire_policy),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError {
                field: DraftField::Name,
                message: "Name is required".to_string(),
            });
        }
        if self.command.trim().is_empty() {
            errors.push(FieldError {
                field: DraftField::Command,
                message: "Command is required".to_string(),
            });
        }
        if let Err(message) = check_cron(&self.cron) {
            errors.push(FieldError {
                field: DraftField::Cron,
                message,
            });
        }
        if self.max_concurrency < 1 {
            errors.push(FieldError {
                field: DraftField::MaxConcurrency,
                message: "Max concurrency must be at least 1".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Validate, then check the name against the loaded jobs.
    /// `editing` is the id of the job being edited, if any.
    pub fn review(
        self,
        existing: &[JobSpec],
        editing: Option<&JobId>,
    ) -> Result<DraftReview, ValidationErrors> {
        self.validate()?;
        let name = self.name.trim();
        if has_duplicate_name(name, editing, existing) {
            let warning = format!("A job named \"{}\" already exists", name);
            return Ok(DraftReview::NeedsConfirmation {
                draft: self,
                warning,
            });
        }
        Ok(DraftReview::Ready(self))
    }

    fn schedule(&self) -> Option<String> {
        let cron = self.cron.trim();
        (!cron.is_empty()).then(|| cron.to_string())
    }

    pub fn to_create_request(&self) -> CreateJobRequest {
        CreateJobRequest {
            name: self.name.trim().to_string(),
            schedule_cron: self.schedule(),
            command: self.command.clone(),
            max_concurrency: Some(self.max_concurrency),
            misfire_policy: Some(self.misfire_kind.to_policy(self.misfire_duration_secs)),
        }
    }

    /// The edit form always sends every field.
    pub fn to_update_request(&self) -> UpdateJobRequest {
        UpdateJobRequest {
            name: Some(self.name.trim().to_string()),
            schedule_cron: ScheduleUpdate::from_form(&self.cron),
            command: Some(self.command.clone()),
            max_concurrency: Some(self.max_concurrency),
            misfire_policy: Some(self.misfire_kind.to_policy(self.misfire_duration_secs)),
        }
    }
}

/// Shape check only; the server evaluates the expression.
fn check_cron(cron: &str) -> Result<(), String> {
    let cron = cron.trim();
    if cron.is_empty() {
        return Ok(());
    }
    if cron.starts_with('@') {
        return if CRON_MACROS.contains(&cron) {
            Ok(())
        } else {
            Err(format!("Unknown cron macro: {}", cron))
        };
    }

    let fields: Vec<&str> = cron.split_whitespace().collect();
    if !(5..=7).contains(&fields.len()) {
        return Err(format!(
            "Cron expression needs 5 to 7 fields, got {}",
            fields.len()
        ));
    }
    if let Some(bad) = fields.iter().find(|f| !cron_field_regex().is_match(f)) {
        return Err(format!("Invalid cron field: {}", bad));
    }
    Ok(())
}
