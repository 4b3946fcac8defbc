pub mod metrics;
mod orgs;
mod products;
mod repos;
mod runs;
mod workers;

use warp::{Filter, Reply};

pub async fn create_filters(
    db: crate::Backend,
) -> impl Filter<Extract = (impl Reply,)> + Clone + Send + Sync + 'static {
    filters::api(db)
        .recover(canned_response::handle_rejection)
        .with(warp::trace::request())
}

pub mod prelude {
    pub use super::models::*;
    use crate::models::{InvalidListQuery, ListQueryParameters, ListResult};
    use serde::{de::DeserializeOwned, Deserialize, Serialize};
    use std::convert::TryFrom;
    use warp::{reject::Reject, Filter, Rejection, Reply};

    pub fn json_body<T: Send + DeserializeOwned>(
    ) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
        // When accepting a body, we want a JSON body
        // (and to reject huge payloads)...
        warp::body::content_length_limit(1024 * 16).and(warp::body::json())
    }

    pub fn with_db(
        db: crate::Backend,
    ) -> impl Filter<Extract = (crate::Backend,), Error = std::convert::Infallible> + Clone {
        warp::any().map(move || db.clone())
    }

    pub fn wrap_body<T>(
        body: Result<PaginatedWrapperResponse<T>, impl Reject>,
    ) -> Result<impl Reply, Rejection>
    where
        T: Serialize,
    {
        let body = match body {
            Err(e) => {
                return Err(warp::reject::custom(e));
            }
            Ok(value) => value,
        };

        let response = ApplicationResponse {
            status: StatusResponse::ok(),
            data: Some(body.data),
            page: body.page_options,
        };

        Ok(warp::reply::json(&response))
    }

    /// `?sort=name,-createdAt&limit=20&offset=40`
    #[derive(Debug, Default, Deserialize, Serialize)]
    pub struct ApiListQuery {
        pub sort: Option<String>,
        pub limit: Option<u64>,
        pub offset: Option<u64>,
    }

    impl TryFrom<ApiListQuery> for ListQueryParameters {
        type Error = InvalidListQuery;

        fn try_from(source: ApiListQuery) -> Result<Self, Self::Error> {
            let sort_fields = match source.sort {
                Some(sort) => ListQueryParameters::parse_sort(&sort)?,
                None => vec![],
            };

            Ok(Self {
                sort_fields,
                limit: source.limit,
                offset: source.offset,
            })
        }
    }

    #[derive(Deserialize, Serialize)]
    pub struct DeleteStatus {
        pub deleted: bool,
    }

    impl From<()> for DeleteStatus {
        fn from(_: ()) -> Self {
            Self { deleted: true }
        }
    }

    pub struct PaginatedWrapperResponse<T>
    where
        T: Serialize,
    {
        data: T,
        page_options: Option<super::models::PaginationState>,
    }

    impl<T: Serialize> PaginatedWrapperResponse<T> {
        pub fn without_page(body: T) -> PaginatedWrapperResponse<T> {
            PaginatedWrapperResponse {
                data: body,
                page_options: None,
            }
        }
    }

    impl<T: Serialize> PaginatedWrapperResponse<Vec<T>> {
        pub fn with_page(list: ListResult<T>) -> PaginatedWrapperResponse<Vec<T>> {
            let page_options = PaginationState {
                more: list.has_more(),
                total: list.total_count,
                sort_fields: list.query.sort_fields.clone(),
                limit: list.query.limit(),
                offset: list.query.offset(),
            };

            PaginatedWrapperResponse {
                data: list.items,
                page_options: Some(page_options),
            }
        }
    }
}

mod models {
    use crate::models::OrderField;
    use serde::Serialize;
    use warp::http::StatusCode;

    /// The list query that produced a page, echoed so clients can continue.
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PaginationState {
        pub sort_fields: Vec<OrderField>,
        pub limit: u64,
        pub offset: u64,
        pub total: u64,
        pub more: bool,
    }

    #[derive(Serialize)]
    #[serde(remote = "StatusCode")]
    struct StatusCodeDef {
        #[serde(getter = "StatusCode::as_u16")]
        code: u16,
    }

    #[derive(Debug, Serialize)]
    #[serde(untagged)]
    pub enum StatusResponse {
        Success(SuccessfulStatusResponse),
        Error(ErrorStatusResponse),
    }

    #[derive(Debug, Serialize)]
    pub struct SuccessfulStatusResponse {
        #[serde(flatten, with = "StatusCodeDef")]
        pub code: StatusCode,
    }

    #[derive(Debug, Serialize)]
    pub struct ErrorStatusResponse {
        #[serde(flatten, with = "StatusCodeDef")]
        pub code: StatusCode,
        pub error: Option<Vec<String>>,
    }

    impl ErrorStatusResponse {
        pub fn from_error_message(code: StatusCode, error: String) -> Self {
            Self {
                code,
                error: Some(vec![error]),
            }
        }
    }

    impl StatusResponse {
        pub fn ok() -> Self {
            StatusResponse::Success(SuccessfulStatusResponse {
                code: StatusCode::OK,
            })
        }

        pub fn status(&self) -> StatusCode {
            match self {
                StatusResponse::Error(err) => err.code,
                StatusResponse::Success(suc) => suc.code,
            }
        }
    }

    #[derive(Debug, Serialize)]
    pub struct ApplicationResponse<T>
    where
        T: Serialize,
    {
        pub status: StatusResponse,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub data: Option<T>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub page: Option<PaginationState>,
    }

    #[test]
    fn validate_empty_response() {
        use json::object;

        let serialized = serde_json::to_string(&ApplicationResponse::<()> {
            status: StatusResponse::ok(),
            data: None,
            page: None,
        })
        .unwrap();

        assert_eq!(
            serialized,
            json::stringify(object! {
                    "status": {
                        "code": 200
                    },
            })
        );
    }

    #[test]
    fn validate_page_serialization() {
        let serialized = serde_json::to_value(&ApplicationResponse {
            status: StatusResponse::ok(),
            data: Some(vec![1, 2]),
            page: Some(PaginationState {
                sort_fields: vec![OrderField::descending("createdAt")],
                limit: 2,
                offset: 0,
                total: 5,
                more: true,
            }),
        })
        .unwrap();

        assert_eq!(
            serialized,
            serde_json::json!({
                "status": {"code": 200},
                "data": [1, 2],
                "page": {
                    "sortFields": [{"name": "createdAt", "direction": "DESCENDING"}],
                    "limit": 2,
                    "offset": 0,
                    "total": 5,
                    "more": true
                }
            })
        );
    }
}

mod filters {
    use warp::{Filter, Rejection, Reply};

    pub fn api(
        db: crate::Backend,
    ) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        super::orgs::create_org_api(db.clone())
            .or(super::products::create_product_api(db.clone()))
            .or(super::repos::create_repo_api(db.clone()))
            .or(super::runs::create_run_api(db.clone()))
            .or(super::workers::create_worker_api(db))
            .with(warp::log::custom(super::metrics::track_status))
    }
}

pub(crate) mod canned_response {
    use super::models::*;
    use crate::backend::BackendError;
    use crate::database::DatabaseError;
    use std::convert::Infallible;
    use std::error::Error;
    use tracing::error;
    use warp::{http::StatusCode, reject::Reject, Rejection, Reply};

    impl From<Rejection> for ErrorStatusResponse {
        fn from(source: Rejection) -> Self {
            if source.is_not_found() {
                ErrorStatusResponse::from_error_message(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND".to_owned(),
                )
            } else if let Some(resp) = source.find::<ErrorStatusResponse>() {
                resp.into()
            } else if let Some(e) = source.find::<warp::filters::body::BodyDeserializeError>() {
                let message_body: String = match e.source() {
                    Some(cause) => cause.to_string(),
                    None => "BAD_REQUEST".into(),
                };
                ErrorStatusResponse::from_error_message(StatusCode::BAD_REQUEST, message_body)
            } else if let Some(e) = source.find::<warp::reject::InvalidQuery>() {
                ErrorStatusResponse::from_error_message(StatusCode::BAD_REQUEST, e.to_string())
            } else if source.find::<warp::reject::MethodNotAllowed>().is_some() {
                ErrorStatusResponse::from_error_message(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "METHOD_NOT_ALLOWED".to_owned(),
                )
            } else {
                error!("unhandled rejection: {:?}", source);
                ErrorStatusResponse::from_error_message(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "UNHANDLED_REJECTION".to_owned(),
                )
            }
        }
    }

    impl From<&ErrorStatusResponse> for ErrorStatusResponse {
        fn from(source: &ErrorStatusResponse) -> Self {
            Self {
                code: source.code,
                error: source.error.clone(),
            }
        }
    }

    impl From<BackendError> for ErrorStatusResponse {
        fn from(error: BackendError) -> Self {
            (&error).into()
        }
    }

    impl From<&BackendError> for ErrorStatusResponse {
        fn from(error: &BackendError) -> Self {
            let message = error.to_string();
            match error {
                BackendError::DatabaseError { source } => match source {
                    DatabaseError::NotFound { error } => ErrorStatusResponse::from_error_message(
                        StatusCode::NOT_FOUND,
                        error.to_string(),
                    ),
                    DatabaseError::AlreadyExists { error } => {
                        ErrorStatusResponse::from_error_message(
                            StatusCode::CONFLICT,
                            error.to_string(),
                        )
                    }
                    DatabaseError::InvalidArgument { .. } => {
                        ErrorStatusResponse::from_error_message(StatusCode::BAD_REQUEST, message)
                    }
                    _ => {
                        error!("Internal Error: {}", source);
                        ErrorStatusResponse::from_error_message(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            message,
                        )
                    }
                },
                BackendError::InvalidConfiguration { .. } | BackendError::InvalidQuery { .. } => {
                    ErrorStatusResponse::from_error_message(StatusCode::BAD_REQUEST, message)
                }
            }
        }
    }

    impl Reject for ErrorStatusResponse {}

    pub async fn handle_rejection(err: Rejection) -> std::result::Result<impl Reply, Infallible> {
        let status = StatusResponse::Error(err.into());
        let status_code = status.status();
        let response: ApplicationResponse<()> = ApplicationResponse {
            data: None,
            status,
            page: None,
        };

        let json = warp::reply::json(&response);

        Ok(warp::reply::with_status(json, status_code))
    }
}
