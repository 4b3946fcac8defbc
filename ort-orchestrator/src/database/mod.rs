pub(crate) mod entity;

mod job_queries;
mod org_queries;
mod product_queries;
mod repo_queries;
mod run_label_queries;
mod run_queries;

use crate::models::{ListQueryParameters, OrderDirection};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Order;
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, EntityTrait,
    IdenStatic, QueryOrder, QuerySelect, Select, TransactionTrait,
};
use thiserror::Error;

pub type DbResult<T> = Result<T, DatabaseError>;

#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("Organization with id {id} not found")]
    Organization { id: i32 },
    #[error("Product with id {id} not found")]
    Product { id: i32 },
    #[error("Repository with id {id} not found")]
    Repository { id: i32 },
    #[error("ORT run with id {id} not found")]
    OrtRun { id: i32 },
    #[error("ORT run with index {index} not found for repository {repository_id}")]
    OrtRunByIndex { repository_id: i32, index: i32 },
    #[error("Worker job with id {id} not found")]
    WorkerJob { id: i32 },
}

#[derive(Error, Debug)]
pub enum AlreadyExistsError {
    #[error("Organization {name} exists")]
    Organization { name: String },
    #[error("Product {name} exists in organization {organization_id}")]
    Product { organization_id: i32, name: String },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error(transparent)]
    NotFound { error: NotFoundError },
    #[error(transparent)]
    AlreadyExists { error: AlreadyExistsError },
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
    #[error("Stored document could not be (de)serialized: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
    #[error("Stored value '{value}' is not a valid {kind}")]
    CorruptValue { kind: &'static str, value: String },
    #[error(transparent)]
    SeaOrmError {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error(transparent)]
    SqlxError {
        #[from]
        source: sqlx::Error,
    },
    #[error(transparent)]
    MigrateError {
        #[from]
        source: sqlx::migrate::MigrateError,
    },
}

impl DatabaseError {
    pub fn not_found(error: NotFoundError) -> Self {
        DatabaseError::NotFound { error }
    }
}

#[derive(Clone, Debug)]
pub enum DateTimeProvider {
    RealDateTime,
    #[cfg_attr(not(test), allow(dead_code))]
    FixedDateTime(DateTime<Utc>),
}

impl DateTimeProvider {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            DateTimeProvider::RealDateTime => Utc::now(),
            DateTimeProvider::FixedDateTime(time) => *time,
        }
    }
}

/// Database access for the query traits. `C` is either the pooled connection or
/// an open transaction, so every query can take part in a caller's transaction.
#[derive(Clone, Debug)]
pub struct BackendDatabase<C = DatabaseConnection> {
    pub db: C,
    pub date_time_provider: DateTimeProvider,
}

impl BackendDatabase {
    pub async fn new<S: Into<String>>(connection_url: S) -> prelude::DbResult<Self> {
        use std::time::Duration;

        let mut opts: ConnectOptions = ConnectOptions::new(connection_url.into());
        opts.max_connections(100)
            .min_connections(5)
            .connect_timeout(Duration::from_secs(5))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(10));
        opts.sqlx_logging(cfg!(debug_assertions) || cfg!(test_assertions));
        let db: DatabaseConnection = Database::connect(opts).await?;

        Ok(Self {
            db,
            date_time_provider: DateTimeProvider::RealDateTime,
        })
    }

    pub async fn begin(&self) -> DbResult<BackendDatabase<DatabaseTransaction>> {
        Ok(BackendDatabase {
            db: self.db.begin().await?,
            date_time_provider: self.date_time_provider.clone(),
        })
    }
}

impl BackendDatabase<DatabaseTransaction> {
    pub async fn commit(self) -> DbResult<()> {
        Ok(self.db.commit().await?)
    }
}

/// Applies ordering and paging to `select`. The id column is appended as the
/// last sort key so page boundaries stay stable for equal sort values.
pub(crate) fn apply_list_query<E, F>(
    select: Select<E>,
    query: &ListQueryParameters,
    id_column: E::Column,
    resolve_column: F,
) -> DbResult<Select<E>>
where
    E: EntityTrait,
    F: Fn(&str) -> Option<E::Column>,
{
    let mut select = select;
    let mut ordered_by_id = false;

    for field in &query.sort_fields {
        let column = resolve_column(&field.name).ok_or_else(|| DatabaseError::InvalidArgument {
            message: format!("Unsupported sort field '{}'", field.name),
        })?;

        if column.as_str() == id_column.as_str() {
            ordered_by_id = true;
        }

        let order = match field.direction {
            OrderDirection::Ascending => Order::Asc,
            OrderDirection::Descending => Order::Desc,
        };
        select = select.order_by(column, order);
    }

    if !ordered_by_id {
        select = select.order_by(id_column, Order::Asc);
    }

    Ok(select.offset(query.offset()).limit(query.limit()))
}

pub(crate) fn parse_stored<T: std::str::FromStr>(kind: &'static str, value: &str) -> DbResult<T> {
    value.parse().map_err(|_| DatabaseError::CorruptValue {
        kind,
        value: value.to_owned(),
    })
}

#[allow(unused_imports)]
pub mod prelude {
    pub use super::entity::prelude::*;
    pub use super::job_queries::WorkerJobQueries;
    pub use super::org_queries::OrganizationQueries;
    pub use super::product_queries::ProductQueries;
    pub use super::repo_queries::{CreateRepositoryParam, RepositoryQueries, UpdateRepositoryParam};
    pub use super::run_label_queries::{RunLabelQueries, RunLabels};
    pub use super::run_queries::{CreateRunParam, RunQueries};
    pub use super::DbResult;
    pub use super::{
        AlreadyExistsError, BackendDatabase, DatabaseError, DateTimeProvider, NotFoundError,
    };
    pub use thiserror::Error;
}
