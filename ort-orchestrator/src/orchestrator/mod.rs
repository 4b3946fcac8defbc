pub mod dispatcher;
pub mod state;
pub mod transport;

use crate::database::prelude::*;
use crate::metrics::{DUPLICATE_JOB_COMPLETIONS, JOBS_DISPATCHED, JOB_COMPLETIONS, ORT_RUNS_FINALIZED};
use crate::models::{JobStatus, JobType, OrtIssue, OrtRun, OrtRunStatus, Severity, WorkerJob};
use derivative::Derivative;
use dispatcher::{Dispatcher, JobCompletion, JobMessage, JobStarted};
use sea_orm::ConnectionTrait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_attributes::instrument;

const ISSUE_SOURCE: &str = "Orchestrator";

/// Result of feeding one completion message into the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// The job was moved to its terminal status and the run was re-evaluated.
    Applied {
        job: WorkerJob,
        run_status: OrtRunStatus,
    },
    /// The job was already terminal, nothing changed.
    Duplicate,
    /// No job with this id exists (any more).
    UnknownJob,
}

/// Jobs created while advancing a run, and the run status afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    pub created: Vec<WorkerJob>,
    pub status: OrtRunStatus,
}

/// Re-evaluates `run` inside the caller's transaction: creates the jobs of
/// newly eligible stages, activates the run with its first job and finalizes
/// it once no stage can make progress. The caller must hold the run lock.
///
/// Terminal runs are left alone, so calling this repeatedly for the same
/// event has no further effect.
#[instrument(skip(txn, run), fields(ort_run_id = run.id))]
pub async fn advance<C>(txn: &BackendDatabase<C>, run: &OrtRun) -> DbResult<Advance>
where
    C: ConnectionTrait + Send + Sync,
{
    if run.status.is_terminal() {
        return Ok(Advance {
            created: vec![],
            status: run.status,
        });
    }

    let configs = run.effective_job_configs();
    let configured = configs.configured_stages();
    let jobs = txn.list_jobs_for_run(run.id).await?;
    let statuses: BTreeMap<JobType, JobStatus> =
        jobs.iter().map(|job| (job.job_type(), job.status)).collect();

    let evaluation = state::evaluate(&configured, &statuses);
    let mut status = run.status;

    let mut created = Vec::new();
    for stage in &evaluation.to_create {
        if let Some(configuration) = configs.for_stage(*stage) {
            created.push(txn.create_job(run.id, configuration).await?);
        }
    }

    if !created.is_empty() && txn.try_activate_run(run.id).await? {
        info!("Run {} is active", run.id);
        status = OrtRunStatus::Active;
    }

    if let Some(final_status) = evaluation.final_status {
        let now = txn.date_time_provider.now();
        let finished_at = jobs
            .iter()
            .filter_map(|job| job.finished_at)
            .max()
            .map_or(now, |latest| latest.max(now));

        if txn
            .try_finalize_run(run.id, final_status, finished_at)
            .await?
        {
            let issues = evaluation
                .blocked
                .iter()
                .map(|(stage, cause)| {
                    OrtIssue::new(
                        now,
                        ISSUE_SOURCE,
                        format!(
                            "{} job was not started because the {} job did not finish successfully.",
                            stage, cause
                        ),
                        Severity::Error,
                    )
                })
                .collect();
            txn.add_run_issues(run.id, issues).await?;

            ORT_RUNS_FINALIZED
                .with_label_values(&[final_status.as_ref()])
                .inc();
            info!("Run {} finished with status {}", run.id, final_status);
            status = final_status;
        }
    }

    Ok(Advance { created, status })
}

/// Drives runs forward from job completions and hands new jobs to the
/// dispatcher once the transaction that created them has committed.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Orchestrator {
    pub database: BackendDatabase,
    #[derivative(Debug = "ignore")]
    dispatcher: Arc<dyn Dispatcher>,
}

impl Orchestrator {
    pub fn new(database: BackendDatabase, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            database,
            dispatcher,
        }
    }

    /// Entry point for completion messages. Safe to call any number of times
    /// for the same message, concurrently or not.
    #[instrument(skip(self))]
    pub async fn on_receive_completion(
        &self,
        completion: JobCompletion,
    ) -> DbResult<CompletionOutcome> {
        let (outcome, created) = self.apply_completion(&completion, None).await?;
        self.dispatch_jobs(created).await?;
        Ok(outcome)
    }

    /// Records that a worker picked up a job. Only CREATED or SCHEDULED jobs
    /// move to RUNNING, late or repeated messages are ignored.
    #[instrument(skip(self))]
    pub async fn on_job_started(&self, started: JobStarted) -> DbResult<WorkerJob> {
        let moved = self
            .database
            .try_start_job(started.job_id, started.started_at)
            .await?;

        match self.database.get_job(started.job_id).await? {
            Some(job) => {
                if !moved {
                    debug!(
                        job_id = job.id,
                        "Ignoring start of job in status {}.", job.status
                    );
                }
                Ok(job)
            }
            None => Err(DatabaseError::not_found(NotFoundError::WorkerJob {
                id: started.job_id,
            })),
        }
    }

    async fn apply_completion(
        &self,
        completion: &JobCompletion,
        issue: Option<OrtIssue>,
    ) -> DbResult<(CompletionOutcome, Vec<WorkerJob>)> {
        if !completion.status.is_terminal() {
            return Err(DatabaseError::InvalidArgument {
                message: format!(
                    "Completion of job {} has non-terminal status {}",
                    completion.job_id, completion.status
                ),
            });
        }

        let txn = self.database.begin().await?;

        let job = match txn.get_job(completion.job_id).await? {
            Some(job) => job,
            None => {
                warn!(
                    job_id = completion.job_id,
                    "Received completion for unknown job."
                );
                return Ok((CompletionOutcome::UnknownJob, vec![]));
            }
        };

        let run = match txn.sql_lock_run(job.ort_run_id).await? {
            Some(run) => run,
            None => {
                warn!(
                    job_id = job.id,
                    "Received completion for job of deleted run {}.", job.ort_run_id
                );
                return Ok((CompletionOutcome::UnknownJob, vec![]));
            }
        };

        let completed = match txn
            .try_complete_job(job.id, completion.finished_at, completion.status)
            .await?
        {
            Some(completed) => completed,
            None => {
                debug!(job_id = job.id, "Ignoring duplicate completion.");
                DUPLICATE_JOB_COMPLETIONS.inc();
                // A redelivery also retries jobs whose dispatch did not happen
                // after the original completion committed.
                let undispatched = txn.list_undispatched_jobs(Some(run.id)).await?;
                return Ok((CompletionOutcome::Duplicate, undispatched));
            }
        };

        JOB_COMPLETIONS
            .with_label_values(&[completed.job_type().as_ref(), completed.status.as_ref()])
            .inc();
        info!(
            job_id = completed.id,
            ort_run_id = run.id,
            "{} job completed with {}",
            completed.job_type(),
            completed.status
        );

        if let Some(issue) = issue {
            txn.add_run_issues(run.id, vec![issue]).await?;
        }

        let advance = advance(&txn, &run).await?;
        let undispatched = txn.list_undispatched_jobs(Some(run.id)).await?;
        txn.commit().await?;

        Ok((
            CompletionOutcome::Applied {
                job: completed,
                run_status: advance.status,
            },
            undispatched,
        ))
    }

    /// Hands `jobs` to the dispatcher. A job is claimed (CREATED -> SCHEDULED)
    /// before it is sent, so concurrent callers never send the same job twice.
    /// A job the transport refuses is failed through the regular completion
    /// path, which may in turn create more jobs, so this works through a queue
    /// rather than recursing.
    #[instrument(skip(self, jobs))]
    pub async fn dispatch_jobs(&self, jobs: Vec<WorkerJob>) -> DbResult<()> {
        let mut pending: VecDeque<WorkerJob> = jobs.into();

        while let Some(job) = pending.pop_front() {
            let message = match self.job_message(&job).await {
                Ok(message) => message,
                Err(DatabaseError::NotFound { error }) => {
                    warn!(job_id = job.id, "Not dispatching job: {}", error);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !self.database.try_schedule_job(job.id).await? {
                debug!(job_id = job.id, "Job was already dispatched.");
                continue;
            }

            match self.dispatcher.dispatch(message).await {
                Ok(()) => {
                    JOBS_DISPATCHED
                        .with_label_values(&[job.job_type().as_ref()])
                        .inc();
                }
                Err(e) => {
                    error!(job_id = job.id, "Unable to dispatch {} job: {}", job.job_type(), e);

                    let now = self.database.date_time_provider.now();
                    let completion = JobCompletion {
                        job_id: job.id,
                        status: JobStatus::Failed,
                        finished_at: now,
                    };
                    let issue = OrtIssue::new(
                        now,
                        ISSUE_SOURCE,
                        format!("Failed to dispatch {} job: {}", job.job_type(), e),
                        Severity::Error,
                    );

                    let (_, created) = self.apply_completion(&completion, Some(issue)).await?;
                    pending.extend(created);
                }
            }
        }

        Ok(())
    }

    /// Dispatches every job that is not known to be with the transport. Meant
    /// for startup: SCHEDULED jobs go back to CREATED first because the worker
    /// queue does not outlive the process.
    #[instrument(skip(self))]
    pub async fn recover_pending_jobs(&self) -> DbResult<usize> {
        let reset = self.database.reset_scheduled_jobs().await?;
        let jobs = self.database.list_undispatched_jobs(None).await?;
        let count = jobs.len();

        if count > 0 {
            info!(
                "Dispatching {} pending job(s), {} of them were scheduled before",
                count, reset
            );
        }
        self.dispatch_jobs(jobs).await?;

        Ok(count)
    }

    async fn job_message(&self, job: &WorkerJob) -> DbResult<JobMessage> {
        let run = self.database.get_run(job.ort_run_id).await?;
        let repository = self.database.get_repository(run.repository_id).await?;

        Ok(JobMessage {
            job_id: job.id,
            ort_run_id: run.id,
            repository_id: repository.id,
            repository_url: repository.url,
            revision: run.revision,
            configuration: job.configuration.clone(),
        })
    }
}
