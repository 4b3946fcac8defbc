use crate::database::{
    entity::{self, prelude::*},
    BackendDatabase, DatabaseError, DbResult, NotFoundError,
};
use crate::models::{JobConfiguration, JobStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, ConnectionTrait};
use tracing::debug;
use tracing_attributes::instrument;

pub mod models {
    use crate::database::{entity, parse_stored, DatabaseError};
    use crate::models::{JobConfiguration, JobType};

    pub type DbWorkerJob = crate::models::WorkerJob;

    impl TryFrom<entity::worker_job::Model> for DbWorkerJob {
        type Error = DatabaseError;

        fn try_from(source: entity::worker_job::Model) -> Result<Self, Self::Error> {
            let configuration: JobConfiguration = serde_json::from_str(&source.configuration)?;
            let job_type: JobType = parse_stored("job type", &source.job_type)?;
            if configuration.job_type() != job_type {
                return Err(DatabaseError::CorruptValue {
                    kind: "job configuration",
                    value: source.configuration,
                });
            }

            Ok(Self {
                id: source.id,
                ort_run_id: source.ort_run_id,
                created_at: source.created_at,
                started_at: source.started_at,
                finished_at: source.finished_at,
                configuration,
                status: parse_stored("job status", &source.status)?,
            })
        }
    }
}

pub use models::*;

/**
 * WorkerJobQueries persists the jobs of all stages in one table, the stage
 * being carried by the configuration variant.
 *
 * `try_complete_job` is the entry point for completion messages. It is a single
 * conditional update, so a job is completed at most once no matter how many
 * copies of its completion arrive or how they interleave. `complete_job`
 * overwrites unconditionally and is only meant for callers that already know
 * the job is not terminal.
 */
#[async_trait]
pub trait WorkerJobQueries {
    async fn create_job(
        &self,
        ort_run_id: i32,
        configuration: JobConfiguration,
    ) -> DbResult<DbWorkerJob>;

    async fn get_job(&self, id: i32) -> DbResult<Option<DbWorkerJob>>;

    async fn list_jobs_for_run(&self, ort_run_id: i32) -> DbResult<Vec<DbWorkerJob>>;

    async fn complete_job(
        &self,
        id: i32,
        finished_at: DateTime<Utc>,
        status: JobStatus,
    ) -> DbResult<DbWorkerJob>;

    /// Completes the job unless it is already terminal, in which case nothing
    /// is written and `None` is returned. Unknown ids are an error.
    async fn try_complete_job(
        &self,
        id: i32,
        finished_at: DateTime<Utc>,
        status: JobStatus,
    ) -> DbResult<Option<DbWorkerJob>>;

    /// CREATED -> SCHEDULED, once the job was handed to the transport.
    async fn try_schedule_job(&self, id: i32) -> DbResult<bool>;

    /// CREATED or SCHEDULED -> RUNNING.
    async fn try_start_job(&self, id: i32, started_at: DateTime<Utc>) -> DbResult<bool>;

    /// Jobs still in CREATED, i.e. never handed to the transport. Limited to
    /// one run when `ort_run_id` is set.
    async fn list_undispatched_jobs(&self, ort_run_id: Option<i32>) -> DbResult<Vec<DbWorkerJob>>;

    /// SCHEDULED -> CREATED for every job, so that jobs of a transport that
    /// lost its messages get dispatched again.
    async fn reset_scheduled_jobs(&self) -> DbResult<u64>;
}

fn require_terminal(id: i32, status: JobStatus) -> DbResult<()> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(DatabaseError::InvalidArgument {
            message: format!(
                "Job {} cannot be completed with non-terminal status {}",
                id, status
            ),
        })
    }
}

#[async_trait]
impl<C> WorkerJobQueries for BackendDatabase<C>
where
    C: ConnectionTrait + Send + Sync,
{
    #[instrument(skip(self, configuration), fields(job_type = %configuration.job_type()))]
    async fn create_job(
        &self,
        ort_run_id: i32,
        configuration: JobConfiguration,
    ) -> DbResult<DbWorkerJob> {
        use entity::worker_job;

        let model = worker_job::ActiveModel {
            ort_run_id: Set(ort_run_id),
            job_type: Set(configuration.job_type().to_string()),
            created_at: Set(self.date_time_provider.now()),
            started_at: Set(None),
            finished_at: Set(None),
            configuration: Set(serde_json::to_string(&configuration)?),
            status: Set(JobStatus::Created.to_string()),
            ..Default::default()
        };

        let res = WorkerJob::insert(model).exec(&self.db).await?;
        match self.get_job(res.last_insert_id).await? {
            Some(job) => Ok(job),
            None => Err(DatabaseError::not_found(NotFoundError::WorkerJob {
                id: res.last_insert_id,
            })),
        }
    }

    #[instrument(skip(self))]
    async fn get_job(&self, id: i32) -> DbResult<Option<DbWorkerJob>> {
        match WorkerJob::find_by_id(id).one(&self.db).await? {
            Some(model) => Ok(Some(DbWorkerJob::try_from(model)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_jobs_for_run(&self, ort_run_id: i32) -> DbResult<Vec<DbWorkerJob>> {
        use entity::worker_job::Column;

        let found = WorkerJob::find()
            .filter(Column::OrtRunId.eq(ort_run_id))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?;

        let mut jobs = Vec::with_capacity(found.len());
        for model in found {
            jobs.push(DbWorkerJob::try_from(model)?);
        }
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn complete_job(
        &self,
        id: i32,
        finished_at: DateTime<Utc>,
        status: JobStatus,
    ) -> DbResult<DbWorkerJob> {
        use entity::worker_job::Column;

        require_terminal(id, status)?;

        let res = WorkerJob::update_many()
            .col_expr(Column::Status, Expr::value(status.to_string()))
            .col_expr(Column::FinishedAt, Expr::value(finished_at))
            .filter(Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if res.rows_affected == 0 {
            return Err(DatabaseError::not_found(NotFoundError::WorkerJob { id }));
        }

        match self.get_job(id).await? {
            Some(job) => Ok(job),
            None => Err(DatabaseError::not_found(NotFoundError::WorkerJob { id })),
        }
    }

    #[instrument(skip(self))]
    async fn try_complete_job(
        &self,
        id: i32,
        finished_at: DateTime<Utc>,
        status: JobStatus,
    ) -> DbResult<Option<DbWorkerJob>> {
        use entity::worker_job::Column;

        require_terminal(id, status)?;

        let res = WorkerJob::update_many()
            .col_expr(Column::Status, Expr::value(status.to_string()))
            .col_expr(Column::FinishedAt, Expr::value(finished_at))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_not_in(JobStatus::terminal_names()))
            .exec(&self.db)
            .await?;

        if res.rows_affected == 1 {
            return self.get_job(id).await;
        }

        match self.get_job(id).await? {
            Some(job) => {
                debug!(
                    job_id = id,
                    "Job is already {}, ignoring completion with {}.", job.status, status
                );
                Ok(None)
            }
            None => Err(DatabaseError::InvalidArgument {
                message: format!("Worker job with id {} does not exist", id),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn try_schedule_job(&self, id: i32) -> DbResult<bool> {
        use entity::worker_job::Column;

        let res = WorkerJob::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Scheduled.to_string()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(JobStatus::Created.to_string()))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected == 1)
    }

    #[instrument(skip(self))]
    async fn try_start_job(&self, id: i32, started_at: DateTime<Utc>) -> DbResult<bool> {
        use entity::worker_job::Column;

        let res = WorkerJob::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Running.to_string()))
            .col_expr(Column::StartedAt, Expr::value(started_at))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_in(vec![
                JobStatus::Created.to_string(),
                JobStatus::Scheduled.to_string(),
            ]))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected == 1)
    }

    #[instrument(skip(self))]
    async fn list_undispatched_jobs(&self, ort_run_id: Option<i32>) -> DbResult<Vec<DbWorkerJob>> {
        use entity::worker_job::Column;

        let mut select = WorkerJob::find().filter(Column::Status.eq(JobStatus::Created.to_string()));
        if let Some(ort_run_id) = ort_run_id {
            select = select.filter(Column::OrtRunId.eq(ort_run_id));
        }

        let found = select.order_by_asc(Column::Id).all(&self.db).await?;

        let mut jobs = Vec::with_capacity(found.len());
        for model in found {
            jobs.push(DbWorkerJob::try_from(model)?);
        }
        Ok(jobs)
    }

    #[instrument(skip(self))]
    async fn reset_scheduled_jobs(&self) -> DbResult<u64> {
        use entity::worker_job::Column;

        let res = WorkerJob::update_many()
            .col_expr(Column::Status, Expr::value(JobStatus::Created.to_string()))
            .filter(Column::Status.eq(JobStatus::Scheduled.to_string()))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected)
    }
}

#[cfg(test)]
mod integ_test {
    use super::*;
    use crate::database::run_queries::RunQueries;
    use crate::models::{AnalyzerJobConfiguration, JobType, ScannerJobConfiguration};
    use crate::test_utils::*;
    use chrono::TimeZone;
    use serial_test::serial;

    fn analyzer() -> JobConfiguration {
        JobConfiguration::Analyzer(AnalyzerJobConfiguration::default())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_create_job() {
        let db = make_db().await;
        let run = create_test_run(&db, vec![]).await;

        let job = db.create_job(run.id, analyzer()).await.unwrap();
        assert_eq!(job.ort_run_id, run.id);
        assert_eq!(job.job_type(), JobType::Analyzer);
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.started_at, None);
        assert_eq!(job.finished_at, None);

        let scanner = db
            .create_job(
                run.id,
                JobConfiguration::Scanner(ScannerJobConfiguration {
                    skip_concluded: true,
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(db.get_job(scanner.id).await.unwrap(), Some(scanner.clone()));
        assert_eq!(db.get_job(scanner.id + 100).await.unwrap(), None);
        assert_eq!(
            db.list_jobs_for_run(run.id).await.unwrap(),
            vec![job, scanner]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_try_complete_is_idempotent() {
        let db = make_db().await;
        let run = create_test_run(&db, vec![]).await;
        let job = db.create_job(run.id, analyzer()).await.unwrap();

        let first = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let later = Utc.timestamp_opt(1_700_000_500, 0).unwrap();

        let completed = db
            .try_complete_job(job.id, first, JobStatus::Finished)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, JobStatus::Finished);
        assert_eq!(completed.finished_at, Some(first));

        assert_eq!(
            db.try_complete_job(job.id, first, JobStatus::Finished)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            db.try_complete_job(job.id, later, JobStatus::Failed)
                .await
                .unwrap(),
            None
        );

        let stored = db.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Finished);
        assert_eq!(stored.finished_at, Some(first));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_try_complete_unknown_job() {
        let db = make_db().await;
        let finished_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        assert!(matches!(
            db.try_complete_job(4711, finished_at, JobStatus::Finished)
                .await,
            Err(DatabaseError::InvalidArgument { .. })
        ));
        assert!(matches!(
            db.complete_job(4711, finished_at, JobStatus::Finished).await,
            Err(DatabaseError::NotFound {
                error: NotFoundError::WorkerJob { id: 4711 }
            })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_complete_overwrites() {
        let db = make_db().await;
        let run = create_test_run(&db, vec![]).await;
        let job = db.create_job(run.id, analyzer()).await.unwrap();

        let first = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let later = Utc.timestamp_opt(1_700_000_500, 0).unwrap();

        db.complete_job(job.id, first, JobStatus::Finished)
            .await
            .unwrap();
        let job = db
            .complete_job(job.id, later, JobStatus::FinishedWithIssues)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::FinishedWithIssues);
        assert_eq!(job.finished_at, Some(later));

        assert!(matches!(
            db.complete_job(job.id, later, JobStatus::Running).await,
            Err(DatabaseError::InvalidArgument { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_job_start_transitions() {
        let db = make_db().await;
        let run = create_test_run(&db, vec![]).await;
        let job = db.create_job(run.id, analyzer()).await.unwrap();
        let started_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        assert!(db.try_schedule_job(job.id).await.unwrap());
        assert!(!db.try_schedule_job(job.id).await.unwrap());
        assert!(db.try_start_job(job.id, started_at).await.unwrap());
        assert!(!db.try_start_job(job.id, started_at).await.unwrap());

        let job = db.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.started_at, Some(started_at));

        db.try_complete_job(job.id, started_at, JobStatus::Failed)
            .await
            .unwrap();
        assert!(!db.try_start_job(job.id, started_at).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_jobs_are_deleted_with_their_run() {
        let db = make_db().await;
        let run = create_test_run(&db, vec![]).await;
        let job = db.create_job(run.id, analyzer()).await.unwrap();

        db.delete_repository(run.repository_id).await.unwrap();
        assert_eq!(db.get_job(job.id).await.unwrap(), None);
        assert!(matches!(
            db.get_run(run.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_undispatched_jobs() {
        let db = make_db().await;
        let first = create_test_run(&db, vec![]).await;
        let second = create_test_run(&db, vec![]).await;

        let created = db.create_job(first.id, analyzer()).await.unwrap();
        let scheduled = db.create_job(second.id, analyzer()).await.unwrap();
        let finished = db
            .create_job(
                second.id,
                JobConfiguration::Scanner(ScannerJobConfiguration::default()),
            )
            .await
            .unwrap();
        assert!(db.try_schedule_job(scheduled.id).await.unwrap());
        db.complete_job(finished.id, Utc::now(), JobStatus::Finished)
            .await
            .unwrap();

        let ids = |jobs: Vec<DbWorkerJob>| jobs.iter().map(|it| it.id).collect::<Vec<_>>();
        assert_eq!(ids(db.list_undispatched_jobs(None).await.unwrap()), vec![created.id]);
        assert!(db
            .list_undispatched_jobs(Some(second.id))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(db.reset_scheduled_jobs().await.unwrap(), 1);
        assert_eq!(
            ids(db.list_undispatched_jobs(None).await.unwrap()),
            vec![created.id, scheduled.id]
        );
        assert_eq!(
            ids(db.list_undispatched_jobs(Some(second.id)).await.unwrap()),
            vec![scheduled.id]
        );
        assert_eq!(db.reset_scheduled_jobs().await.unwrap(), 0);
    }
}
