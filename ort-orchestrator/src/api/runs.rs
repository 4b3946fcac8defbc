use super::prelude::*;
use tracing::info;
use tracing_attributes::instrument;
use warp::{Filter, Rejection, Reply};

pub fn create_run_api(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    get_a_run(db.clone()).or(get_run_jobs(db))
}

fn get_a_run(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/runs/{{id}}");
    warp::path!("api" / "v1" / "runs" / i32)
        .and(warp::get())
        .and(with_db(db))
        .and_then(get_a_run_impl)
}

#[instrument(name = "rest_run_get", skip(db))]
async fn get_a_run_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.get_run(id).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn get_run_jobs(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/runs/{{id}}/jobs");
    warp::path!("api" / "v1" / "runs" / i32 / "jobs")
        .and(warp::get())
        .and(with_db(db))
        .and_then(get_run_jobs_impl)
}

#[instrument(name = "rest_run_jobs", skip(db))]
async fn get_run_jobs_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.get_jobs_for_run(id).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}
