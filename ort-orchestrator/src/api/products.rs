use super::orgs::UpdateNamedEntity;
use super::prelude::*;
use crate::backend::BackendError;
use crate::database::prelude::CreateRepositoryParam;
use crate::models::{ListQueryParameters, RepositoryType};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use tracing::info;
use tracing_attributes::instrument;
use warp::{Filter, Rejection, Reply};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRepository {
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub job_config_overrides: Option<serde_json::Value>,
}

impl From<CreateRepository> for CreateRepositoryParam {
    fn from(source: CreateRepository) -> Self {
        Self {
            repo_type: source.repo_type,
            url: source.url,
            description: source.description,
            job_config_overrides: source.job_config_overrides,
        }
    }
}

pub fn create_product_api(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    get_a_product(db.clone())
        .or(update_product(db.clone()))
        .or(delete_product(db.clone()))
        .or(create_repository(db.clone()))
        .or(list_repositories(db))
}

fn get_a_product(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/products/{{id}}");
    warp::path!("api" / "v1" / "products" / i32)
        .and(warp::get())
        .and(with_db(db))
        .and_then(get_a_product_impl)
}

#[instrument(name = "rest_product_get", skip(db))]
async fn get_a_product_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.get_product(id).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn update_product(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("PATCH /api/v1/products/{{id}}");
    warp::path!("api" / "v1" / "products" / i32)
        .and(warp::patch())
        .and(json_body::<UpdateNamedEntity>())
        .and(with_db(db))
        .and_then(update_product_impl)
}

#[instrument(name = "rest_product_update", skip(db))]
async fn update_product_impl(
    id: i32,
    update: UpdateNamedEntity,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db.update_product(id, update.name, update.description).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn delete_product(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("DELETE /api/v1/products/{{id}}");
    warp::path!("api" / "v1" / "products" / i32)
        .and(warp::delete())
        .and(with_db(db))
        .and_then(delete_product_impl)
}

#[instrument(name = "rest_product_delete", skip(db))]
async fn delete_product_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.delete_product(id).await;
    let result: Result<DeleteStatus, BackendError> = result.map(DeleteStatus::from);
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn create_repository(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("POST /api/v1/products/{{id}}/repositories");
    warp::path!("api" / "v1" / "products" / i32 / "repositories")
        .and(warp::post())
        .and(json_body::<CreateRepository>())
        .and(with_db(db))
        .and_then(create_repository_impl)
}

#[instrument(name = "rest_repo_create", skip(db))]
async fn create_repository_impl(
    product_id: i32,
    repository: CreateRepository,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db.create_repository(product_id, repository.into()).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn list_repositories(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/products/{{id}}/repositories");
    warp::path!("api" / "v1" / "products" / i32 / "repositories")
        .and(warp::get())
        .and(warp::query::<ApiListQuery>())
        .and(with_db(db))
        .and_then(list_repositories_impl)
}

#[instrument(name = "rest_repo_list", skip(db))]
async fn list_repositories_impl(
    product_id: i32,
    query: ApiListQuery,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = match ListQueryParameters::try_from(query) {
        Ok(query) => db.list_repositories_for_product(product_id, query).await,
        Err(e) => Err(BackendError::from(e)),
    };
    let result = result.map(PaginatedWrapperResponse::with_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

#[cfg(test)]
mod integ_test {
    use super::*;
    use crate::test_utils::*;
    use json::{array, object};
    use serial_test::serial;
    use warp::test::request;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_product_lifecycle() {
        let db = make_backend().await;
        let org = db.create_organization("example", None).await.unwrap();
        let product = db.create_product(org.id, "core", None).await.unwrap();

        let filter = create_product_api(db.clone())
            .recover(crate::api::canned_response::handle_rejection);

        let response = request()
            .path(&format!("/api/v1/products/{}", product.id))
            .body(json::stringify(object! {
                "description": "Core libraries"
            }))
            .method("PATCH")
            .reply(&filter)
            .await;
        assert_200_response(
            response,
            object! {"id": product.id, "organizationId": org.id, "name": "core", "description": "Core libraries"},
        );

        let response = request()
            .path(&format!("/api/v1/products/{}", product.id))
            .method("DELETE")
            .reply(&filter)
            .await;
        assert_200_response(response, object! {"deleted": true});

        let response = request()
            .path(&format!("/api/v1/products/{}", product.id))
            .method("GET")
            .reply(&filter)
            .await;
        assert_error_response(
            response,
            http::StatusCode::NOT_FOUND,
            &format!("Product with id {} not found", product.id),
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_repositories_of_product() {
        let db = make_backend().await;
        let org = db.create_organization("example", None).await.unwrap();
        let product = db.create_product(org.id, "core", None).await.unwrap();

        let filter = create_product_api(db.clone())
            .recover(crate::api::canned_response::handle_rejection);

        let response = request()
            .path(&format!("/api/v1/products/{}/repositories", product.id))
            .body(json::stringify(object! {
                "type": "GIT",
                "url": "https://example.org/core.git",
                "jobConfigOverrides": {"analyzer": {"skipExcluded": true}}
            }))
            .method("POST")
            .reply(&filter)
            .await;
        let repository = object! {
            "id": 1,
            "organizationId": org.id,
            "productId": product.id,
            "type": "GIT",
            "url": "https://example.org/core.git",
            "description": null,
            "jobConfigOverrides": {"analyzer": {"skipExcluded": true}}
        };
        assert_200_response(response, repository.clone());

        let response = request()
            .path(&format!("/api/v1/products/{}/repositories?sort=url", product.id))
            .method("GET")
            .reply(&filter)
            .await;
        assert_200_list_response(response, array![repository], 1, false);

        let response = request()
            .path(&format!("/api/v1/products/{}/repositories", product.id))
            .body(json::stringify(object! {
                "type": "CVS",
                "url": "https://example.org/core.git"
            }))
            .method("POST")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);

        let response = request()
            .path("/api/v1/products/99/repositories")
            .method("GET")
            .reply(&filter)
            .await;
        assert_error_response(
            response,
            http::StatusCode::NOT_FOUND,
            "Product with id 99 not found",
        );
    }
}
