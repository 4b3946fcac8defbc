use super::{resolver, BackendError, DefaultBackend};
use crate::database::prelude::*;
use crate::models::{
    JobConfigurations, JobType, ListQueryParameters, ListResult, OrtRun, WorkerJob,
};
use crate::orchestrator::{
    self,
    dispatcher::{JobCompletion, JobMessage, JobStarted},
    CompletionOutcome,
};
use std::collections::BTreeMap;
use tracing::{error, info};
use tracing_attributes::instrument;

/// A run as requested by a client, before repository overrides are applied.
#[derive(Debug, Clone)]
pub struct CreateRun {
    pub revision: String,
    pub job_configs: JobConfigurations,
    pub labels: BTreeMap<String, String>,
    pub job_config_context: Option<String>,
}

impl DefaultBackend {
    /// Creates the run and its first jobs in one transaction, then hands the
    /// jobs to the workers. An invalid configuration is rejected before
    /// anything is written.
    #[instrument(skip(self, request), fields(revision = %request.revision))]
    pub async fn create_run(
        &self,
        repository_id: i32,
        request: CreateRun,
    ) -> Result<OrtRun, BackendError> {
        resolver::validate_run_request(&request.revision, &request.job_configs, &request.labels)?;

        let txn = self.database.begin().await?;
        let repository = txn.sql_lock_repository(repository_id).await?;
        let resolved = resolver::resolve_job_configs(
            &request.job_configs,
            repository.job_config_overrides.as_ref(),
        )?;

        let run = txn
            .create_run(CreateRunParam {
                repository_id: repository.id,
                revision: request.revision,
                job_configs: request.job_configs,
                resolved_job_configs: Some(resolved),
                resolved_job_config_context: request.job_config_context.clone(),
                job_config_context: request.job_config_context,
                labels: request.labels,
            })
            .await?;

        let advanced = orchestrator::advance(&txn, &run).await?;
        txn.commit().await?;

        info!(
            ort_run_id = run.id,
            "Run #{} created with {} job(s)",
            run.index,
            advanced.created.len()
        );
        // The run is committed at this point. Jobs left undispatched are
        // picked up again by the next completion of the run or at startup.
        if let Err(e) = self.orchestrator.dispatch_jobs(advanced.created).await {
            error!(ort_run_id = run.id, "Unable to dispatch jobs of new run: {}", e);
        }

        Ok(self.database.get_run(run.id).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_run(&self, id: i32) -> Result<OrtRun, BackendError> {
        Ok(self.database.get_run(id).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_run_by_index(
        &self,
        repository_id: i32,
        index: i32,
    ) -> Result<OrtRun, BackendError> {
        Ok(self.database.get_run_by_index(repository_id, index).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_runs_for_repository(
        &self,
        repository_id: i32,
        query: ListQueryParameters,
    ) -> Result<ListResult<OrtRun>, BackendError> {
        let query = self.list_query(query)?;
        Ok(self
            .database
            .list_runs_for_repository(repository_id, &query)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get_jobs_for_run(&self, run_id: i32) -> Result<Vec<WorkerJob>, BackendError> {
        let run = self.database.get_run(run_id).await?;
        Ok(self.database.list_jobs_for_run(run.id).await?)
    }

    /// Next message for a worker of `job_type`, oldest first.
    pub async fn next_job(&self, job_type: JobType) -> Option<JobMessage> {
        self.worker_queue.next(job_type).await
    }

    pub async fn job_started(&self, started: JobStarted) -> Result<WorkerJob, BackendError> {
        Ok(self.orchestrator.on_job_started(started).await?)
    }

    pub async fn job_completed(
        &self,
        completion: JobCompletion,
    ) -> Result<CompletionOutcome, BackendError> {
        Ok(self.orchestrator.on_receive_completion(completion).await?)
    }
}
