use crate::models::{JobConfiguration, JobStatus, JobType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything a worker needs to execute a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: i32,
    pub ort_run_id: i32,
    pub repository_id: i32,
    pub repository_url: String,
    pub revision: String,
    #[serde(flatten)]
    pub configuration: JobConfiguration,
}

impl JobMessage {
    pub fn job_type(&self) -> JobType {
        self.configuration.job_type()
    }
}

/// Result reported by a worker. Delivered at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletion {
    pub job_id: i32,
    pub status: JobStatus,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStarted {
    pub job_id: i32,
    pub started_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No workers are attached for {job_type} jobs")]
    StageDisabled { job_type: JobType },
}

/// Hands jobs to the worker pool. Implementations only enqueue; the result of
/// a job comes back later through the completion path.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: JobMessage) -> Result<(), DispatchError>;
}
