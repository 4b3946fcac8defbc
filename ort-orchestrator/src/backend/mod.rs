pub mod authorization;
mod hierarchy;
pub mod resolver;
mod runs;

pub use runs::CreateRun;

use crate::config::ServerConfig;
use crate::database::prelude::*;
use crate::models::{InvalidListQuery, ListQueryParameters};
use crate::orchestrator::{transport::WorkerQueue, Orchestrator};
use authorization::AuthorizationService;
use derivative::Derivative;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    DatabaseError {
        #[from]
        source: DatabaseError,
    },
    #[error("Invalid job configuration: {reason}")]
    InvalidConfiguration { reason: ConstraintViolation },
    #[error(transparent)]
    InvalidQuery {
        #[from]
        source: InvalidListQuery,
    },
}

impl From<ConstraintViolation> for BackendError {
    fn from(reason: ConstraintViolation) -> Self {
        BackendError::InvalidConfiguration { reason }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConstraintViolation {
    #[error("Revision must not be empty")]
    EmptyRevision,
    #[error("Label keys must not be empty")]
    EmptyLabelKey,
    #[error("Reporter job needs at least one report format")]
    EmptyReporterFormats,
    #[error("Infrastructure service '{name}' is defined more than once")]
    DuplicateInfrastructureService { name: String },
    #[error("Infrastructure service '{name}' is incomplete, {reason}")]
    InvalidInfrastructureService { name: String, reason: String },
    #[error("Repository job configuration overrides are invalid: {reason}")]
    InvalidOverrides { reason: String },
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct DefaultBackend {
    pub database: BackendDatabase,
    pub orchestrator: Orchestrator,
    pub worker_queue: Arc<WorkerQueue>,
    pub config: ServerConfig,
    #[derivative(Debug = "ignore")]
    authorization: Arc<dyn AuthorizationService>,
}

impl DefaultBackend {
    pub async fn new(
        db_connection_string: String,
        config: ServerConfig,
        authorization: Arc<dyn AuthorizationService>,
    ) -> Result<Self, BackendError> {
        info!(
            "Server Configured\n{}",
            toml::to_string_pretty(&config)
                .unwrap_or_else(|_| "Configuration failed to render".to_owned())
        );

        let database = BackendDatabase::new(db_connection_string).await?;
        Ok(Self::from_parts(database, config, authorization))
    }

    pub fn from_parts(
        database: BackendDatabase,
        config: ServerConfig,
        authorization: Arc<dyn AuthorizationService>,
    ) -> Self {
        let worker_queue = Arc::new(WorkerQueue::new(
            config.transport.enabled_stages.iter().copied().collect(),
        ));
        let orchestrator = Orchestrator::new(database.clone(), worker_queue.clone());

        Self {
            database,
            orchestrator,
            worker_queue,
            config,
            authorization,
        }
    }

    /// Applies the configured default and maximum page size.
    fn list_query(&self, query: ListQueryParameters) -> Result<ListQueryParameters, BackendError> {
        Ok(query.normalized(self.config.list.default_limit, self.config.list.max_limit)?)
    }
}
