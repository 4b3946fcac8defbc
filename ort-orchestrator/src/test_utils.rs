use crate::backend::authorization::{AuthorizationService, InMemoryAuthorizationService};
use crate::backend::DefaultBackend;
use crate::config::ServerConfig;
use crate::models::{OrtRun, Repository, RepositoryType};
pub use crate::database::prelude::{
    BackendDatabase, CreateRepositoryParam, CreateRunParam, DatabaseError, DateTimeProvider,
    DbResult, OrganizationQueries, ProductQueries, RepositoryQueries, RunLabelQueries, RunQueries,
    UpdateRepositoryParam, WorkerJobQueries,
};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub async fn make_db() -> BackendDatabase {
    BackendDatabase {
        db: setup_schema().await.unwrap(),
        date_time_provider: DateTimeProvider::RealDateTime,
    }
}

/// Like [make_db], but the database clock is stopped at `now`.
pub async fn make_db_at(now: DateTime<Utc>) -> BackendDatabase {
    BackendDatabase {
        db: setup_schema().await.unwrap(),
        date_time_provider: DateTimeProvider::FixedDateTime(now),
    }
}

pub async fn make_backend() -> crate::Backend {
    make_backend_with_auth(Arc::new(InMemoryAuthorizationService::default())).await
}

pub async fn make_backend_with_auth(
    authorization: Arc<dyn AuthorizationService>,
) -> crate::Backend {
    make_backend_with_config(ServerConfig::default(), authorization).await
}

pub async fn make_backend_with_config(
    config: ServerConfig,
    authorization: Arc<dyn AuthorizationService>,
) -> crate::Backend {
    Arc::new(DefaultBackend::from_parts(
        make_db().await,
        config,
        authorization,
    ))
}

pub async fn setup_schema() -> DbResult<DatabaseConnection> {
    use crate::database::entity::prelude as entities;
    let db = Database::connect("sqlite::memory:").await?;

    // Setup Schema helper
    let schema = Schema::new(DbBackend::Sqlite);
    let backend = db.get_database_backend();

    // Derive from Entity, parents before children
    db.execute(backend.build(&schema.create_table_from_entity(entities::Organization)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(entities::Product)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(entities::Repository)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(entities::OrtRun)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(entities::OrtRunLabel)))
        .await?;
    db.execute(backend.build(&schema.create_table_from_entity(entities::WorkerJob)))
        .await?;

    Ok(db)
}

/// Creates organization `org`, a product and a git repository inside it.
pub async fn create_test_repository(db: &BackendDatabase, org: &str) -> Repository {
    let org = db.create_organization(org, None).await.unwrap();
    let product = db.create_product(org.id, "product", None).await.unwrap();

    db.create_repository(
        product.id,
        CreateRepositoryParam {
            repo_type: RepositoryType::Git,
            url: format!("https://example.org/{}.git", org.name),
            description: None,
            job_config_overrides: None,
        },
    )
    .await
    .unwrap()
}

static TEST_ORGS: AtomicUsize = AtomicUsize::new(0);

/// Creates a CREATED run with the default job configuration in a fresh
/// repository.
pub async fn create_test_run(db: &BackendDatabase, labels: Vec<(&str, &str)>) -> OrtRun {
    let org = format!("test-org-{}", TEST_ORGS.fetch_add(1, Ordering::SeqCst));
    let repository = create_test_repository(db, &org).await;
    db.create_run(run_param(repository.id, labels)).await.unwrap()
}

pub fn run_param(repository_id: i32, labels: Vec<(&str, &str)>) -> CreateRunParam {
    CreateRunParam {
        repository_id,
        revision: "main".to_owned(),
        job_configs: Default::default(),
        resolved_job_configs: None,
        job_config_context: None,
        resolved_job_config_context: None,
        labels: labels
            .into_iter()
            .map(|(key, value)| (key.to_owned(), value.to_owned()))
            .collect(),
    }
}

pub fn parse_body(response: &http::Response<bytes::Bytes>) -> json::JsonValue {
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    println!("{:?}", body);
    match json::parse(&body) {
        Err(e) => {
            println!("Unable to deserialize {:?}. Error: {:?}", body, e);
            unreachable!()
        }
        Ok(body) => body,
    }
}

pub fn assert_200_response(response: http::Response<bytes::Bytes>, expected_body: json::JsonValue) {
    use json::object;
    assert_response(
        response,
        http::StatusCode::OK,
        object! {
            "status": { "code": 200 },
            "data": expected_body
        },
    );
}

pub fn assert_200_list_response(
    response: http::Response<bytes::Bytes>,
    expected_body: json::JsonValue,
    total: usize,
    has_more: bool,
) {
    let body = parse_body(&response);
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(body["status"]["code"], 200);
    assert_eq!(body["data"], expected_body);
    assert_eq!(body["page"]["total"], total);
    assert_eq!(body["page"]["more"], has_more);
}

pub fn assert_response(
    response: http::Response<bytes::Bytes>,
    status: http::StatusCode,
    expected_body: json::JsonValue,
) {
    let body = parse_body(&response);
    assert_eq!(body, expected_body);
    assert_eq!(response.status(), status);
}

pub fn assert_error_response(
    response: http::Response<bytes::Bytes>,
    status: http::StatusCode,
    message: &str,
) {
    use json::object;
    let body = parse_body(&response);
    assert_eq!(
        body,
        object! {
            "status": { "code": response.status().as_u16(), "error": [message] },
        }
    );
    assert_eq!(response.status(), status);
}
