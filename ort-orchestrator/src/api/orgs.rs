use super::prelude::*;
use crate::backend::BackendError;
use crate::models::{ListQueryParameters, OptionalValue, Product};
use std::convert::TryFrom;
use tracing::info;
use tracing_attributes::instrument;
use warp::{Filter, Rejection, Reply};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CreateNamedEntity {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct UpdateNamedEntity {
    #[serde(default, skip_serializing_if = "OptionalValue::is_absent")]
    pub name: OptionalValue<String>,
    #[serde(default, skip_serializing_if = "OptionalValue::is_absent")]
    pub description: OptionalValue<Option<String>>,
}

pub fn create_org_api(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    create_org(db.clone())
        .or(list_orgs(db.clone()))
        .or(get_an_org(db.clone()))
        .or(update_org(db.clone()))
        .or(delete_org(db.clone()))
        .or(create_product(db.clone()))
        .or(list_products(db))
}

fn create_org(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("POST /api/v1/organizations");
    warp::path!("api" / "v1" / "organizations")
        .and(warp::post())
        .and(json_body::<CreateNamedEntity>())
        .and(with_db(db))
        .and_then(create_org_impl)
}

#[instrument(name = "rest_org_create", skip(db))]
async fn create_org_impl(
    org: CreateNamedEntity,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db.create_organization(&org.name, org.description).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn list_orgs(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/organizations");
    warp::path!("api" / "v1" / "organizations")
        .and(warp::get())
        .and(warp::query::<ApiListQuery>())
        .and(with_db(db))
        .and_then(list_orgs_impl)
}

#[instrument(name = "rest_org_list", skip(db))]
async fn list_orgs_impl(query: ApiListQuery, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = match ListQueryParameters::try_from(query) {
        Ok(query) => db.list_organizations(query).await,
        Err(e) => Err(BackendError::from(e)),
    };
    let result = result.map(PaginatedWrapperResponse::with_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn get_an_org(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/organizations/{{id}}");
    warp::path!("api" / "v1" / "organizations" / i32)
        .and(warp::get())
        .and(with_db(db))
        .and_then(get_an_org_impl)
}

#[instrument(name = "rest_org_get", skip(db))]
async fn get_an_org_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.get_organization(id).await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn update_org(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("PATCH /api/v1/organizations/{{id}}");
    warp::path!("api" / "v1" / "organizations" / i32)
        .and(warp::patch())
        .and(json_body::<UpdateNamedEntity>())
        .and(with_db(db))
        .and_then(update_org_impl)
}

#[instrument(name = "rest_org_update", skip(db))]
async fn update_org_impl(
    id: i32,
    update: UpdateNamedEntity,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = db
        .update_organization(id, update.name, update.description)
        .await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn delete_org(db: crate::Backend) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("DELETE /api/v1/organizations/{{id}}");
    warp::path!("api" / "v1" / "organizations" / i32)
        .and(warp::delete())
        .and(with_db(db))
        .and_then(delete_org_impl)
}

#[instrument(name = "rest_org_delete", skip(db))]
async fn delete_org_impl(id: i32, db: crate::Backend) -> Result<impl Reply, Rejection> {
    let result = db.delete_organization(id).await;
    let result: Result<DeleteStatus, BackendError> = result.map(DeleteStatus::from);
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn create_product(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("POST /api/v1/organizations/{{id}}/products");
    warp::path!("api" / "v1" / "organizations" / i32 / "products")
        .and(warp::post())
        .and(json_body::<CreateNamedEntity>())
        .and(with_db(db))
        .and_then(create_product_impl)
}

#[instrument(name = "rest_product_create", skip(db))]
async fn create_product_impl(
    organization_id: i32,
    product: CreateNamedEntity,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result: Result<Product, BackendError> = db
        .create_product(organization_id, &product.name, product.description)
        .await;
    let result = result.map(PaginatedWrapperResponse::without_page);
    wrap_body(result.map_err(ErrorStatusResponse::from))
}

fn list_products(
    db: crate::Backend,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    info!("GET /api/v1/organizations/{{id}}/products");
    warp::path!("api" / "v1" / "organizations" / i32 / "products")
        .and(warp::get())
        .and(warp::query::<ApiListQuery>())
        .and(with_db(db))
        .and_then(list_products_impl)
}

#[instrument(name = "rest_product_list", skip(db))]
async fn list_products_impl(
    organization_id: i32,
    query: ApiListQuery,
    db: crate::Backend,
) -> Result<impl Reply, Rejection> {
    let result = match ListQueryParameters::try_from(query) {
        Ok(query) => db.list_products_for_organization(organization_id, query).await,
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

    async fn post_org(db: &crate::Backend, name: &str) -> http::Response<bytes::Bytes> {
        let filter = create_org(db.clone()).recover(crate::api::canned_response::handle_rejection);
        request()
            .path("/api/v1/organizations")
            .body(json::stringify(object! {
                "name": name
            }))
            .method("POST")
            .reply(&filter)
            .await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_create_org() {
        let db = make_backend().await;

        let response = post_org(&db, "example-org").await;
        assert_200_response(
            response,
            object! {"id": 1, "name": "example-org", "description": null},
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_duplicate_org() {
        let db = make_backend().await;

        post_org(&db, "example-org").await;
        let response = post_org(&db, "example-org").await;

        assert_error_response(
            response,
            http::StatusCode::CONFLICT,
            "Organization example-org exists",
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_list_org() {
        let db = make_backend().await;
        post_org(&db, "b-org").await;
        post_org(&db, "a-org").await;
        post_org(&db, "c-org").await;

        let filter = list_orgs(db.clone()).recover(crate::api::canned_response::handle_rejection);

        let response = request()
            .path("/api/v1/organizations?sort=-name&limit=2")
            .method("GET")
            .reply(&filter)
            .await;

        let body = parse_body(&response);
        assert_eq!(
            body["page"],
            object! {
                "sortFields": [{"name": "name", "direction": "DESCENDING"}],
                "limit": 2,
                "offset": 0,
                "total": 3,
                "more": true
            }
        );

        let response = request()
            .path("/api/v1/organizations?sort=-name&limit=2&offset=2")
            .method("GET")
            .reply(&filter)
            .await;

        assert_200_list_response(
            response,
            array![{"id": 2, "name": "a-org", "description": null}],
            3,
            false,
        );

        let response = request()
            .path("/api/v1/organizations?sort=unknown")
            .method("GET")
            .reply(&filter)
            .await;
        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);

        let response = request()
            .path("/api/v1/organizations?limit=500")
            .method("GET")
            .reply(&filter)
            .await;
        assert_error_response(
            response,
            http::StatusCode::BAD_REQUEST,
            "Limit 500 exceeds the maximum of 100",
        );

        let response = request()
            .path("/api/v1/organizations?limit=2&offset=18446744073709551615")
            .method("GET")
            .reply(&filter)
            .await;
        assert_error_response(
            response,
            http::StatusCode::BAD_REQUEST,
            "Offset 18446744073709551615 exceeds the maximum of 9223372036854775807",
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_update_org() {
        let db = make_backend().await;
        let filter = create_org(db.clone()).recover(crate::api::canned_response::handle_rejection);
        request()
            .path("/api/v1/organizations")
            .body(json::stringify(object! {
                "name": "example-org",
                "description": "Example"
            }))
            .method("POST")
            .reply(&filter)
            .await;

        let filter = update_org(db.clone()).recover(crate::api::canned_response::handle_rejection);
        let response = request()
            .path("/api/v1/organizations/1")
            .body(json::stringify(object! {
                "description": null
            }))
            .method("PATCH")
            .reply(&filter)
            .await;

        assert_200_response(
            response,
            object! {"id": 1, "name": "example-org", "description": null},
        );

        let response = request()
            .path("/api/v1/organizations/7")
            .body(json::stringify(object! {
                "name": "other"
            }))
            .method("PATCH")
            .reply(&filter)
            .await;
        assert_error_response(
            response,
            http::StatusCode::NOT_FOUND,
            "Organization with id 7 not found",
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_delete_org() {
        let db = make_backend().await;
        post_org(&db, "example-org").await;

        let filter = delete_org(db.clone()).recover(crate::api::canned_response::handle_rejection);
        let response = request()
            .path("/api/v1/organizations/1")
            .method("DELETE")
            .reply(&filter)
            .await;

        assert_200_response(
            response,
            object! {
                "deleted": true,
            },
        );

        let filter = get_an_org(db.clone()).recover(crate::api::canned_response::handle_rejection);
        let response = request()
            .path("/api/v1/organizations/1")
            .method("GET")
            .reply(&filter)
            .await;

        assert_error_response(
            response,
            http::StatusCode::NOT_FOUND,
            "Organization with id 1 not found",
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_products_of_org() {
        let db = make_backend().await;
        post_org(&db, "example-org").await;

        let filter =
            create_product(db.clone()).recover(crate::api::canned_response::handle_rejection);
        let response = request()
            .path("/api/v1/organizations/1/products")
            .body(json::stringify(object! {
                "name": "core",
                "description": "Core libraries"
            }))
            .method("POST")
            .reply(&filter)
            .await;

        assert_200_response(
            response,
            object! {"id": 1, "organizationId": 1, "name": "core", "description": "Core libraries"},
        );

        let filter =
            list_products(db.clone()).recover(crate::api::canned_response::handle_rejection);
        let response = request()
            .path("/api/v1/organizations/1/products")
            .method("GET")
            .reply(&filter)
            .await;

        assert_200_list_response(
            response,
            array![{"id": 1, "organizationId": 1, "name": "core", "description": "Core libraries"}],
            1,
            false,
        );
    }
}
