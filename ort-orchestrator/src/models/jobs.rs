use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The pipeline stages in their fixed execution order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Analyzer,
    Advisor,
    Scanner,
    Evaluator,
    Reporter,
}

impl JobType {
    /// Lower-case name used in URLs, e.g. `/workers/analyzer/next`.
    pub fn path_name(&self) -> String {
        self.as_ref().to_lowercase()
    }

    pub fn from_path_name(name: &str) -> Option<JobType> {
        name.to_uppercase().parse().ok()
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Scheduled,
    Running,
    Finished,
    Failed,
    FinishedWithIssues,
}

impl JobStatus {
    pub const TERMINAL: [JobStatus; 3] = [
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::FinishedWithIssues,
    ];

    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Terminal and usable as input for downstream stages.
    pub fn is_successful(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::FinishedWithIssues)
    }

    pub fn terminal_names() -> Vec<String> {
        Self::TERMINAL.iter().map(|it| it.to_string()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureService {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Names of secrets, resolved by the secrets subsystem when a worker runs.
    pub username_secret_ref: String,
    pub password_secret_ref: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub infrastructure_services: Vec<InfrastructureService>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerJobConfiguration {
    #[serde(default)]
    pub allow_dynamic_versions: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_package_managers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_package_managers: Option<Vec<String>>,
    #[serde(default)]
    pub skip_excluded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_config: Option<EnvironmentConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorJobConfiguration {
    #[serde(default)]
    pub advisors: Vec<String>,
    #[serde(default)]
    pub skip_excluded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerJobConfiguration {
    #[serde(default)]
    pub scanners: Vec<String>,
    #[serde(default)]
    pub project_scanners: Vec<String>,
    #[serde(default)]
    pub skip_concluded: bool,
    #[serde(default)]
    pub skip_excluded: bool,
    #[serde(default)]
    pub create_missing_archives: bool,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatorJobConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_classifications_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolutions_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright_garbage_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReporterJobConfiguration {
    pub formats: Vec<String>,
}

/// The requested stages of a run. A missing sub-configuration means the stage
/// is skipped, it is never run with defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurations {
    pub analyzer: AnalyzerJobConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor: Option<AdvisorJobConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner: Option<ScannerJobConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator: Option<EvaluatorJobConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter: Option<ReporterJobConfiguration>,
}

impl JobConfigurations {
    pub fn configured_stages(&self) -> BTreeSet<JobType> {
        let mut stages = BTreeSet::new();
        stages.insert(JobType::Analyzer);
        if self.advisor.is_some() {
            stages.insert(JobType::Advisor);
        }
        if self.scanner.is_some() {
            stages.insert(JobType::Scanner);
        }
        if self.evaluator.is_some() {
            stages.insert(JobType::Evaluator);
        }
        if self.reporter.is_some() {
            stages.insert(JobType::Reporter);
        }
        stages
    }

    pub fn for_stage(&self, job_type: JobType) -> Option<JobConfiguration> {
        match job_type {
            JobType::Analyzer => Some(JobConfiguration::Analyzer(self.analyzer.clone())),
            JobType::Advisor => self.advisor.clone().map(JobConfiguration::Advisor),
            JobType::Scanner => self.scanner.clone().map(JobConfiguration::Scanner),
            JobType::Evaluator => self.evaluator.clone().map(JobConfiguration::Evaluator),
            JobType::Reporter => self.reporter.clone().map(JobConfiguration::Reporter),
        }
    }
}

/// Configuration of a single worker job; the variant determines the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "configuration", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobConfiguration {
    Analyzer(AnalyzerJobConfiguration),
    Advisor(AdvisorJobConfiguration),
    Scanner(ScannerJobConfiguration),
    Evaluator(EvaluatorJobConfiguration),
    Reporter(ReporterJobConfiguration),
}

impl JobConfiguration {
    pub fn job_type(&self) -> JobType {
        match self {
            JobConfiguration::Analyzer(_) => JobType::Analyzer,
            JobConfiguration::Advisor(_) => JobType::Advisor,
            JobConfiguration::Scanner(_) => JobType::Scanner,
            JobConfiguration::Evaluator(_) => JobType::Evaluator,
            JobConfiguration::Reporter(_) => JobType::Reporter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerJob {
    pub id: i32,
    pub ort_run_id: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub configuration: JobConfiguration,
    pub status: JobStatus,
}

impl WorkerJob {
    pub fn job_type(&self) -> JobType {
        self.configuration.job_type()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_stages_are_not_configured() {
        let configs: JobConfigurations = serde_json::from_str(
            r#"{"analyzer": {"skipExcluded": true}, "scanner": {"scanners": ["ScanCode"]}}"#,
        )
        .unwrap();

        assert!(configs.analyzer.skip_excluded);
        assert_eq!(
            configs.configured_stages().into_iter().collect::<Vec<_>>(),
            vec![JobType::Analyzer, JobType::Scanner]
        );
        assert_eq!(configs.for_stage(JobType::Advisor), None);
        assert_eq!(
            configs.for_stage(JobType::Scanner).map(|it| it.job_type()),
            Some(JobType::Scanner)
        );
    }

    #[test]
    fn analyzer_is_mandatory() {
        assert!(serde_json::from_str::<JobConfigurations>(r#"{"advisor": {}}"#).is_err());
    }

    #[test]
    fn job_configuration_is_tagged_by_stage() {
        let configuration = JobConfiguration::Reporter(ReporterJobConfiguration {
            formats: vec!["WebApp".to_owned()],
        });
        let value = serde_json::to_value(&configuration).unwrap();
        assert_eq!(value["type"], "REPORTER");
        assert_eq!(value["configuration"]["formats"][0], "WebApp");

        let parsed: JobConfiguration = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.job_type(), JobType::Reporter);
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::FinishedWithIssues.is_terminal());
        assert!(JobStatus::FinishedWithIssues.is_successful());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Failed.is_successful());
        assert!(!JobStatus::Running.is_terminal());
        assert_eq!(JobType::from_path_name("evaluator"), Some(JobType::Evaluator));
        assert_eq!(JobType::Advisor.path_name(), "advisor");
        assert_eq!(JobStatus::FinishedWithIssues.to_string(), "FINISHED_WITH_ISSUES");
    }
}
