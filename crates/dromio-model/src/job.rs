//! Job definitions

use serde::{Deserialize, Serialize};

use crate::ids::JobId;
use crate::misfire::MisfirePolicy;

/// A job definition as the API returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub id: JobId,

    /// Display name. Meant to be unique among jobs, not enforced server-side.
    pub name: String,

    /// Cron expression; `None` means the job only runs on demand.
    #[serde(default)]
    pub schedule_cron: Option<String>,

    /// Gate on scheduling. Disabled jobs can still be run by hand.
    pub enabled: bool,

    #[serde(rename = "runnerCfg", alias = "runnerConfig")]
    pub runner_config: RunnerConfig,

    /// Cap on simultaneous runs, at least 1.
    pub max_concurrency: u32,

    #[serde(default)]
    pub misfire_policy: MisfirePolicy,
}

impl JobSpec {
    /// Shell command, when the runner is a shell runner.
    pub fn command(&self) -> Option<&str> {
        self.runner_config.command()
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule_cron.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// How a job executes. Only the shell runner is edited from the
/// dashboard; every other runner kind is carried as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunnerConfig {
    Shell(ShellRunner),
    Unknown(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellRunner {
    #[serde(rename = "type")]
    kind: ShellTag,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

impl ShellRunner {
    pub fn new(command: impl Into<String>, working_dir: Option<String>) -> Self {
        Self {
            kind: ShellTag::Shell,
            command: command.into(),
            working_dir,
        }
    }
}

/// Pins the `type` discriminator so other runner kinds never parse as shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ShellTag {
    #[serde(rename = "shell")]
    Shell,
}

impl RunnerConfig {
    pub fn shell(command: impl Into<String>) -> Self {
        RunnerConfig::Shell(ShellRunner::new(command, None))
    }

    /// Runner kind as the API names it (`shell`, `http`, ...).
    pub fn kind(&self) -> &str {
        match self {
            RunnerConfig::Shell(_) => "shell",
            RunnerConfig::Unknown(raw) => raw
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown"),
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            RunnerConfig::Shell(shell) => Some(&shell.command),
            RunnerConfig::Unknown(_) => None,
        }
    }

    pub fn working_dir(&self) -> Option<&str> {
        match self {
            RunnerConfig::Shell(shell) => shell.working_dir.as_deref(),
            RunnerConfig::Unknown(_) => None,
        }
    }
}
