use super::prelude::*;
use crate::backend::{BackendError, CreateRun};
use crate::database::prelude::UpdateRepositoryParam;
use crate::models::{JobConfigurations, ListQueryParameters, OptionalValue, RepositoryType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::TryFrom;
use tracing::info;
use tracing_attributes::instrument;
use warp::{Filter, Rejection, Reply};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRepository {
    #[serde(rename = "type", default, skip_serializing_if = "OptionalValue::is_absent")]
    pub repo_type: OptionalValue<RepositoryType>,
    #[serde(default, skip_serializing_if = "OptionalValue::is_absent")]
    pub url: OptionalValue<String>,
    #[serde(default, skip_serializing_if = "OptionalValue::is_absent")]
    pub description: OptionalValue<Option<String>>,
    #[serde(default, skip_serializing_if = "OptionalValue::is_absent")]
    pub job_config_overrides: OptionalValue<Option<serde_json::Value>>,
}

impl From<UpdateRepository> for UpdateRepositoryParam {
    fn from(source: UpdateRepository) -> Self {
        Self {
            repo_type: source.repo_type,
            url: source.url,
            description: source.description,
            job_config_overrides: source.job_config_overrides,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrtRun {
    pub revision: String,
    pub job_configs: JobConfigurations,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub job_config_context: Option<String>,
}

impl From<CreateOrtRun> for CreateRun {
    fn from(source: CreateOrtRun) -> Self {
        Self {
            revision: source.revision,
            job_configs: source.job_configs,
            labels: source.labels,
            job_config_context: source.job_config_context,
        }
    }
}

pub fn create_repo_api(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    get_a_repo(db.clone())
        .or(update_repo(db.clone()))
        .or(delete_repo(db.clone()))
        .or(create_run(db.clone()))
        .or(list_runs(db.clone()))
        .or(get_run_by_index(db))
}

fn get_a_repo(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/repositories/{{id}}");
    warp::path!("api" / "v1" / "repositories" / i32)
        .and(warp::get())
        .and(with_db(db))
        .and_then(get_a_repo_impl)
}

#[instrument(name = "rest_repo_get", skip(db))]
async fn get_a_repo_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.get_repository(id).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn update_repo(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("PATCH /api/v1/repositories/{{id}}");
    warp::path!("api" / "v1" / "repositories" / i32)
        .and(warp::patch())
        .and(json_body::<UpdateRepository>())
        .and(with_db(db))
        .and_then(update_repo_impl)
}

#[instrument(name = "rest_repo_update", skip(db))]
async fn update_repo_impl(
    id: i32,
    update: UpdateRepository,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db.update_repository(id, update.into()).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn delete_repo(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("DELETE /api/v1/repositories/{{id}}");
    warp::path!("api" / "v1" / "repositories" / i32)
        .and(warp::delete())
        .and(with_db(db))
        .and_then(delete_repo_impl)
}

#[instrument(name = "rest_repo_delete", skip(db))]
async fn delete_repo_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.delete_repository(id).await;
    let result: Result<DeleteStatus, BackendError> = result.map(DeleteStatus::from);
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn create_run(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("POST /api/v1/repositories/{{id}}/runs");
    warp::path!("api" / "v1" / "repositories" / i32 / "runs")
        .and(warp::post())
        .and(json_body::<CreateOrtRun>())
        .and(with_db(db))
        .and_then(create_run_impl)
}

#[instrument(name = "rest_run_create", skip(db, run), fields(revision = %run.revision))]
async fn create_run_impl(
    repository_id: i32,
    run: CreateOrtRun,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db.create_run(repository_id, run.into()).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn list_runs(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/repositories/{{id}}/runs");
    warp::path!("api" / "v1" / "repositories" / i32 / "runs")
        .and(warp::get())
        .and(warp::query::<ApiListQuery>())
        .and(with_db(db))
        .and_then(list_runs_impl)
}

#[instrument(name = "rest_run_list", skip(db))]
async fn list_runs_impl(
    repository_id: i32,
    query: ApiListQuery,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = match ListQueryParameters::try_from(query) {
        Ok(query) => db.list_runs_for_repository(repository_id, query).await,
        Err(e) => Err(BackendError::from(e)),
    };
    let result = result.map(PaginatedWrapperResponse::with_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn get_run_by_index(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/repositories/{{id}}/runs/{{index}}");
    warp::path!("api" / "v1" / "repositories" / i32 / "runs" / i32)
        .and(warp::get())
        .and(with_db(db))
        .and_then(get_run_by_index_impl)
}

#[instrument(name = "rest_run_get_by_index", skip(db))]
async fn get_run_by_index_impl(
    repository_id: i32,
    index: i32,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db.get_run_by_index(repository_id, index).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}
