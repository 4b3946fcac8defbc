use super::prelude::*;
use crate::backend::BackendError;
use crate::database::prelude::{DatabaseError, NotFoundError};
use crate::models::{JobType, OrtRunStatus, WorkerJob};
use crate::orchestrator::dispatcher::{JobCompletion, JobStarted};
use crate::orchestrator::CompletionOutcome;
use serde::Serialize;
use tracing::info;
use tracing_attributes::instrument;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Answer to a completion message. `applied` is false for redeliveries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionResponse {
    applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    job: Option<WorkerJob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_status: Option<OrtRunStatus>,
}

pub fn create_worker_api(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    next_job(db.clone())
        .or(job_started(db.clone()))
        .or(job_completed(db))
}

fn next_job(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/workers/{{stage}}/next");
    warp::path!("api" / "v1" / "workers" / String / "next")
        .and(warp::get())
        .and(with_db(db))
        .and_then(next_job_impl)
}

#[instrument(name = "rest_worker_next", skip(db))]
async fn next_job_impl(
    stage: String,
    db: crate::Backend,
) -> Result<warp::reply::Response, Rejection> {
    let job_type = match JobType::from_path_name(&stage) {
        Some(job_type) => job_type,
        None => {
            return Err(warp::reject::custom(
                ErrorStatusResponse::from_error_message(
                    StatusCode::NOT_FOUND,
                    format!("Unknown stage '{}'", stage),
                ),
            ))
        }
    };

    match db.next_job(job_type).await {
        Some(message) => {
            let result: Result<_, ErrorStatusResponse> =
                Ok(PaginatedWrapperResponse::without_page(message));
            wrap_body(result).map(|reply| reply.into_response())
        }
        None => Ok(warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT).into_response()),
    }
}

fn job_started(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("POST /api/v1/workers/started");
    warp::path!("api" / "v1" / "workers" / "started")
        .and(warp::post())
        .and(json_body::<JobStarted>())
        .and(with_db(db))
        .and_then(job_started_impl)
}

#[instrument(name = "rest_worker_started", skip(db))]
async fn job_started_impl(
    started: JobStarted,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db.job_started(started).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn job_completed(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("POST /api/v1/workers/completions");
    warp::path!("api" / "v1" / "workers" / "completions")
        .and(warp::post())
        .and(json_body::<JobCompletion>())
        .and(with_db(db))
        .and_then(job_completed_impl)
}

#[instrument(name = "rest_worker_completed", skip(db))]
async fn job_completed_impl(
    completion: JobCompletion,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let job_id = completion.job_id;
    let result = db
        .job_completed(completion)
        .await
        .and_then(|outcome| match outcome {
            CompletionOutcome::Applied { job, run_status } => Ok(CompletionResponse {
                applied: true,
                job: Some(job),
                run_status: Some(run_status),
            }),
            CompletionOutcome::Duplicate => Ok(CompletionResponse {
                applied: false,
                job: None,
                run_status: None,
            }),
            CompletionOutcome::UnknownJob => Err(BackendError::from(DatabaseError::not_found(
                NotFoundError::WorkerJob { id: job_id },
            ))),
        });
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

#[cfg(test)]
mod integ_test {
    use super::*;
    use crate::backend::CreateRun;
    use crate::models::{JobConfigurations, ScannerJobConfiguration};
    use crate::test_utils::*;
    use json::object;
    use serial_test::serial;
    use warp::test::request;

    async fn create_run(db: &crate::Backend, job_configs: JobConfigurations) -> i32 {
        let repository = create_test_repository(&db.database, "example").await;
        db.create_run(
            repository.id,
            CreateRun {
                revision: "main".to_owned(),
                job_configs,
                labels: Default::default(),
                job_config_context: None,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_worker_pulls_and_reports() {
        let db = make_backend().await;
        let run_id = create_run(
            &db,
            JobConfigurations {
                scanner: Some(ScannerJobConfiguration::default()),
                ..Default::default()
            },
        )
        .await;
        let filter =
            create_worker_api(db.clone()).recover(crate::api::canned_response::handle_rejection);

        let response = request()
            .path("/api/v1/workers/analyzer/next")
            .method("GET")
            .reply(&filter)
            .await;
        let body = parse_body(&response);
        assert_eq!(body["data"]["ortRunId"], run_id);
        assert_eq!(body["data"]["type"], "ANALYZER");
        assert_eq!(body["data"]["revision"], "main");
        let job_id = body["data"]["jobId"].as_i32().unwrap();

        let response = request()
            .path("/api/v1/workers/analyzer/next")
            .method("GET")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
        assert!(response.body().is_empty());

        let response = request()
            .path("/api/v1/workers/started")
            .body(json::stringify(object! {
                "jobId": job_id,
                "startedAt": "2023-11-14T22:13:20Z"
            }))
            .method("POST")
            .reply(&filter)
            .await;
        let body = parse_body(&response);
        assert_eq!(body["data"]["status"], "RUNNING");

        let completion = json::stringify(object! {
            "jobId": job_id,
            "status": "FINISHED",
            "finishedAt": "2023-11-14T22:20:00Z"
        });
        let response = request()
            .path("/api/v1/workers/completions")
            .body(completion.clone())
            .method("POST")
            .reply(&filter)
            .await;
        let body = parse_body(&response);
        assert_eq!(body["data"]["applied"], true);
        assert_eq!(body["data"]["runStatus"], "ACTIVE");
        assert_eq!(body["data"]["job"]["status"], "FINISHED");

        let response = request()
            .path("/api/v1/workers/completions")
            .body(completion)
            .method("POST")
            .reply(&filter)
            .await;
        assert_200_response(response, object! {"applied": false});

        let response = request()
            .path("/api/v1/workers/scanner/next")
            .method("GET")
            .reply(&filter)
            .await;
        let body = parse_body(&response);
        assert_eq!(body["data"]["type"], "SCANNER");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_invalid_worker_messages() {
        let db = make_backend().await;
        let filter =
            create_worker_api(db.clone()).recover(crate::api::canned_response::handle_rejection);

        let response = request()
            .path("/api/v1/workers/compiler/next")
            .method("GET")
            .reply(&filter)
            .await;
        assert_error_response(
            response,
            http::StatusCode::NOT_FOUND,
            "Unknown stage 'compiler'",
        );

        let response = request()
            .path("/api/v1/workers/completions")
            .body(json::stringify(object! {
                "jobId": 4711,
                "status": "FAILED",
                "finishedAt": "2023-11-14T22:20:00Z"
            }))
            .method("POST")
            .reply(&filter)
            .await;
        assert_error_response(
            response,
            http::StatusCode::NOT_FOUND,
            "Worker job with id 4711 not found",
        );

        let response = request()
            .path("/api/v1/workers/started")
            .body(json::stringify(object! {
                "jobId": 4711,
                "startedAt": "2023-11-14T22:20:00Z"
            }))
            .method("POST")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);

        let run_id = create_run(&db, JobConfigurations::default()).await;
        let job_id = db.get_jobs_for_run(run_id).await.unwrap()[0].id;
        let response = request()
            .path("/api/v1/workers/completions")
            .body(json::stringify(object! {
                "jobId": job_id,
                "status": "RUNNING",
                "finishedAt": "2023-11-14T22:20:00Z"
            }))
            .method("POST")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }
}
