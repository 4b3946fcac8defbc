use crate::database::{
    apply_list_query,
    entity::{self, prelude::*},
    repo_queries::RepositoryQueries,
    run_label_queries::RunLabelQueries,
    BackendDatabase, DatabaseError, DbResult, NotFoundError,
};
use crate::models::{JobConfigurations, ListQueryParameters, ListResult, OrtIssue, OrtRunStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{join_all, ready, TryFutureExt};
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, ConnectionTrait};
use tracing::info;
use tracing_attributes::instrument;

pub mod models {
    use crate::database::{entity, parse_stored, run_label_queries::RunLabels, DbResult};
    use crate::models::{JobConfigurations, OrtIssue};
    use std::collections::BTreeMap;

    pub type DbOrtRun = crate::models::OrtRun;

    pub fn run_from_model(model: entity::ort_run::Model, labels: RunLabels) -> DbResult<DbOrtRun> {
        let resolved_job_configs = match model.resolved_job_configs {
            Some(text) => Some(serde_json::from_str(&text)?),
            None => None,
        };
        let issues: Vec<OrtIssue> = serde_json::from_str(&model.issues)?;

        Ok(DbOrtRun {
            id: model.id,
            index: model.run_index,
            repository_id: model.repository_id,
            revision: model.revision,
            created_at: model.created_at,
            finished_at: model.finished_at,
            job_configs: serde_json::from_str(&model.job_configs)?,
            resolved_job_configs,
            job_config_context: model.job_config_context,
            resolved_job_config_context: model.resolved_job_config_context,
            status: parse_stored("run status", &model.status)?,
            labels,
            issues,
        })
    }

    #[derive(Debug, Clone)]
    pub struct CreateRunParam {
        pub repository_id: i32,
        pub revision: String,
        pub job_configs: JobConfigurations,
        pub resolved_job_configs: Option<JobConfigurations>,
        pub job_config_context: Option<String>,
        pub resolved_job_config_context: Option<String>,
        pub labels: BTreeMap<String, String>,
    }
}

pub use models::*;

/**
 * RunQueries persists ORT runs. Status changes are conditional updates so that
 * a terminal run can never be moved again, no matter how often the orchestrator
 * re-evaluates it.
 */
#[async_trait]
pub trait RunQueries {
    /// Inserts a CREATED run with the next index of its repository. Callers
    /// hold the repository lock so that concurrent creations cannot pick the
    /// same index.
    async fn create_run(&self, params: CreateRunParam) -> DbResult<DbOrtRun>;

    async fn get_run(&self, id: i32) -> DbResult<DbOrtRun>;

    async fn get_run_by_index(&self, repository_id: i32, index: i32) -> DbResult<DbOrtRun>;

    async fn list_runs_for_repository(
        &self,
        repository_id: i32,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbOrtRun>>;

    /// Locks the run row for the rest of the transaction. Returns `None` when
    /// the run no longer exists.
    async fn sql_lock_run(&self, id: i32) -> DbResult<Option<DbOrtRun>>;

    /// CREATED -> ACTIVE. Returns false if the run was not CREATED.
    async fn try_activate_run(&self, id: i32) -> DbResult<bool>;

    /// Moves a non-terminal run into `status` and stamps `finished_at`.
    /// Returns false if the run was already terminal.
    async fn try_finalize_run(
        &self,
        id: i32,
        status: OrtRunStatus,
        finished_at: DateTime<Utc>,
    ) -> DbResult<bool>;

    async fn add_run_issues(&self, id: i32, issues: Vec<OrtIssue>) -> DbResult<()>;
}

fn sort_column(name: &str) -> Option<entity::ort_run::Column> {
    use entity::ort_run::Column;

    match name {
        "id" => Some(Column::Id),
        "index" => Some(Column::RunIndex),
        "revision" => Some(Column::Revision),
        "createdAt" => Some(Column::CreatedAt),
        "finishedAt" => Some(Column::FinishedAt),
        "status" => Some(Column::Status),
        _ => None,
    }
}

fn configs_to_text(configs: &JobConfigurations) -> DbResult<String> {
    Ok(serde_json::to_string(configs)?)
}

#[async_trait]
impl<C> RunQueries for BackendDatabase<C>
where
    C: ConnectionTrait + Send + Sync,
{
    #[instrument(skip(self, params), fields(repository_id = params.repository_id))]
    async fn create_run(&self, params: CreateRunParam) -> DbResult<DbOrtRun> {
        use entity::ort_run::{self, Column};

        let repository = self.sql_get_repository(params.repository_id).await?;

        let last_run = OrtRun::find()
            .filter(Column::RepositoryId.eq(repository.id))
            .order_by_desc(Column::RunIndex)
            .one(&self.db)
            .await?;
        let index = last_run.map(|it| it.run_index + 1).unwrap_or(1);

        let resolved_job_configs = match &params.resolved_job_configs {
            Some(configs) => Some(configs_to_text(configs)?),
            None => None,
        };

        let model = ort_run::ActiveModel {
            repository_id: Set(repository.id),
            run_index: Set(index),
            revision: Set(params.revision),
            created_at: Set(self.date_time_provider.now()),
            finished_at: Set(None),
            status: Set(OrtRunStatus::Created.to_string()),
            job_configs: Set(configs_to_text(&params.job_configs)?),
            resolved_job_configs: Set(resolved_job_configs),
            job_config_context: Set(params.job_config_context),
            resolved_job_config_context: Set(params.resolved_job_config_context),
            issues: Set(serde_json::to_string(&Vec::<OrtIssue>::new())?),
            ..Default::default()
        };

        let res = OrtRun::insert(model).exec(&self.db).await?;
        self.sql_set_run_labels(res.last_insert_id, &params.labels)
            .await?;

        info!(
            ort_run_id = res.last_insert_id,
            "Created run #{} for repository {}", index, repository.id
        );
        self.get_run(res.last_insert_id).await
    }

    #[instrument(skip(self))]
    async fn get_run(&self, id: i32) -> DbResult<DbOrtRun> {
        match OrtRun::find_by_id(id).one(&self.db).await? {
            Some(model) => {
                let labels = self.get_run_labels(model.id).await?;
                run_from_model(model, labels)
            }
            None => Err(DatabaseError::not_found(NotFoundError::OrtRun { id })),
        }
    }

    #[instrument(skip(self))]
    async fn get_run_by_index(&self, repository_id: i32, index: i32) -> DbResult<DbOrtRun> {
        use entity::ort_run::Column;

        let condition = Condition::all()
            .add(Column::RepositoryId.eq(repository_id))
            .add(Column::RunIndex.eq(index));
        match OrtRun::find().filter(condition).one(&self.db).await? {
            Some(model) => {
                let labels = self.get_run_labels(model.id).await?;
                run_from_model(model, labels)
            }
            None => Err(DatabaseError::not_found(NotFoundError::OrtRunByIndex {
                repository_id,
                index,
            })),
        }
    }

    #[instrument(skip(self))]
    async fn list_runs_for_repository(
        &self,
        repository_id: i32,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbOrtRun>> {
        use entity::ort_run::Column;

        let repository = self.sql_get_repository(repository_id).await?;
        let select = repository.find_related(OrtRun);

        let total_count = select.clone().count(&self.db).await?;
        let found = apply_list_query(select, query, Column::Id, sort_column)?
            .all(&self.db)
            .await?;

        let mut future_runs = Vec::new();
        for run in found {
            future_runs.push(
                self.get_run_labels(run.id)
                    .and_then(move |labels| ready(run_from_model(run, labels))),
            );
        }

        let mut items = Vec::new();
        for resolved in join_all(future_runs).await {
            items.push(resolved?);
        }

        Ok(ListResult {
            items,
            total_count,
            query: query.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn sql_lock_run(&self, id: i32) -> DbResult<Option<DbOrtRun>> {
        let model = OrtRun::find_by_id(id).lock_exclusive().one(&self.db).await?;
        match model {
            Some(model) => {
                let labels = self.get_run_labels(model.id).await?;
                Ok(Some(run_from_model(model, labels)?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn try_activate_run(&self, id: i32) -> DbResult<bool> {
        use entity::ort_run::Column;

        let res = OrtRun::update_many()
            .col_expr(Column::Status, Expr::value(OrtRunStatus::Active.to_string()))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(OrtRunStatus::Created.to_string()))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected == 1)
    }

    #[instrument(skip(self))]
    async fn try_finalize_run(
        &self,
        id: i32,
        status: OrtRunStatus,
        finished_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        use entity::ort_run::Column;

        if !status.is_terminal() {
            return Err(DatabaseError::InvalidArgument {
                message: format!("Run {} cannot be finalized with status {}", id, status),
            });
        }

        let res = OrtRun::update_many()
            .col_expr(Column::Status, Expr::value(status.to_string()))
            .col_expr(Column::FinishedAt, Expr::value(finished_at))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.is_not_in(OrtRunStatus::terminal_names()))
            .exec(&self.db)
            .await?;

        Ok(res.rows_affected == 1)
    }

    #[instrument(skip(self, issues))]
    async fn add_run_issues(&self, id: i32, issues: Vec<OrtIssue>) -> DbResult<()> {
        if issues.is_empty() {
            return Ok(());
        }

        let model = match OrtRun::find_by_id(id).one(&self.db).await? {
            Some(model) => model,
            None => return Err(DatabaseError::not_found(NotFoundError::OrtRun { id })),
        };

        let mut stored: Vec<OrtIssue> = serde_json::from_str(&model.issues)?;
        stored.extend(issues);

        let mut model: entity::ort_run::ActiveModel = model.into();
        model.issues = Set(serde_json::to_string(&stored)?);
        model.update(&self.db).await?;

        Ok(())
    }
}
