use super::{GenericLabels, JobConfigurations};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrtRunStatus {
    Created,
    Active,
    Finished,
    Failed,
}

impl OrtRunStatus {
    pub const TERMINAL: [OrtRunStatus; 2] = [OrtRunStatus::Finished, OrtRunStatus::Failed];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    pub fn terminal_names() -> Vec<String> {
        Self::TERMINAL.iter().map(|it| it.to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Hint,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrtIssue {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub message: String,
    pub severity: Severity,
}

impl OrtIssue {
    pub fn new(timestamp: DateTime<Utc>, source: &str, message: String, severity: Severity) -> Self {
        Self {
            timestamp,
            source: source.to_owned(),
            message,
            severity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrtRun {
    pub id: i32,
    pub index: i32,
    pub repository_id: i32,
    pub revision: String,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub job_configs: JobConfigurations,
    pub resolved_job_configs: Option<JobConfigurations>,
    pub job_config_context: Option<String>,
    pub resolved_job_config_context: Option<String>,
    pub status: OrtRunStatus,
    #[serde(flatten)]
    pub labels: GenericLabels,
    pub issues: Vec<OrtIssue>,
}

impl OrtRun {
    /// The configuration the stages are executed with.
    pub fn effective_job_configs(&self) -> &JobConfigurations {
        self.resolved_job_configs.as_ref().unwrap_or(&self.job_configs)
    }
}
