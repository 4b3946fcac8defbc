use crate::database::{
    apply_list_query,
    entity::{self, prelude::*},
    product_queries::ProductQueries,
    BackendDatabase, DatabaseError, DbResult, NotFoundError,
};
use crate::models::{ListQueryParameters, ListResult, OptionalValue};
use async_trait::async_trait;
use sea_orm::{entity::*, query::*, ConnectionTrait};
use tracing_attributes::instrument;

pub mod models {
    use crate::database::{entity, parse_stored, DatabaseError};
    use crate::models::{OptionalValue, RepositoryType};

    pub type DbRepository = crate::models::Repository;

    impl TryFrom<entity::repository::Model> for DbRepository {
        type Error = DatabaseError;

        fn try_from(source: entity::repository::Model) -> Result<Self, Self::Error> {
            let job_config_overrides = match source.job_config_overrides {
                Some(text) => Some(serde_json::from_str(&text)?),
                None => None,
            };

            Ok(Self {
                id: source.id,
                organization_id: source.organization_id,
                product_id: source.product_id,
                repo_type: parse_stored("repository type", &source.repo_type)?,
                url: source.url,
                description: source.description,
                job_config_overrides,
            })
        }
    }

    #[derive(Debug, Clone)]
    pub struct CreateRepositoryParam {
        pub repo_type: RepositoryType,
        pub url: String,
        pub description: Option<String>,
        pub job_config_overrides: Option<serde_json::Value>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct UpdateRepositoryParam {
        pub repo_type: OptionalValue<RepositoryType>,
        pub url: OptionalValue<String>,
        pub description: OptionalValue<Option<String>>,
        pub job_config_overrides: OptionalValue<Option<serde_json::Value>>,
    }
}

pub use models::*;

/**
 * RepositoryQueries is the CRUD API for repositories, the leaves of the
 * hierarchy that runs are created against.
 */
#[async_trait]
pub trait RepositoryQueries {
    async fn create_repository(
        &self,
        product_id: i32,
        params: CreateRepositoryParam,
    ) -> DbResult<DbRepository>;

    async fn get_repository(&self, id: i32) -> DbResult<DbRepository>;

    async fn list_repositories_for_product(
        &self,
        product_id: i32,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbRepository>>;

    async fn update_repository(
        &self,
        id: i32,
        params: UpdateRepositoryParam,
    ) -> DbResult<DbRepository>;

    async fn delete_repository(&self, id: i32) -> DbResult<()>;

    async fn sql_get_repository(&self, id: i32) -> DbResult<entity::repository::Model>;

    /// Reads the repository with a row lock held until the surrounding
    /// transaction ends.
    async fn sql_lock_repository(&self, id: i32) -> DbResult<DbRepository>;
}

fn sort_column(name: &str) -> Option<entity::repository::Column> {
    use entity::repository::Column;

    match name {
        "id" => Some(Column::Id),
        "type" => Some(Column::RepoType),
        "url" => Some(Column::Url),
        "description" => Some(Column::Description),
        "createdAt" => Some(Column::CreatedAt),
        _ => None,
    }
}

fn overrides_to_text(value: Option<serde_json::Value>) -> DbResult<Option<String>> {
    Ok(match value {
        Some(value) => Some(serde_json::to_string(&value)?),
        None => None,
    })
}

#[async_trait]
impl<C> RepositoryQueries for BackendDatabase<C>
where
    C: ConnectionTrait + Send + Sync,
{
    #[instrument(skip(self))]
    async fn create_repository(
        &self,
        product_id: i32,
        params: CreateRepositoryParam,
    ) -> DbResult<DbRepository> {
        use entity::repository;

        let product = self.sql_get_product(product_id).await?;

        let model = repository::ActiveModel {
            organization_id: Set(product.organization_id),
            product_id: Set(product.id),
            repo_type: Set(params.repo_type.to_string()),
            url: Set(params.url),
            description: Set(params.description),
            job_config_overrides: Set(overrides_to_text(params.job_config_overrides)?),
            created_at: Set(self.date_time_provider.now()),
            ..Default::default()
        };

        let res = Repository::insert(model).exec(&self.db).await?;
        self.get_repository(res.last_insert_id).await
    }

    #[instrument(skip(self))]
    async fn get_repository(&self, id: i32) -> DbResult<DbRepository> {
        DbRepository::try_from(self.sql_get_repository(id).await?)
    }

    #[instrument(skip(self))]
    async fn list_repositories_for_product(
        &self,
        product_id: i32,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbRepository>> {
        use entity::repository::Column;

        let product = self.sql_get_product(product_id).await?;
        let select = product.find_related(Repository);

        let total_count = select.clone().count(&self.db).await?;
        let found = apply_list_query(select, query, Column::Id, sort_column)?
            .all(&self.db)
            .await?;

        let mut items = Vec::with_capacity(found.len());
        for repo in found {
            items.push(DbRepository::try_from(repo)?);
        }

        Ok(ListResult {
            items,
            total_count,
            query: query.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn update_repository(
        &self,
        id: i32,
        params: UpdateRepositoryParam,
    ) -> DbResult<DbRepository> {
        let found = self.sql_get_repository(id).await?;
        let mut model: entity::repository::ActiveModel = found.clone().into();

        params
            .repo_type
            .if_present(|value| model.repo_type = Set(value.to_string()));
        params.url.if_present(|value| model.url = Set(value));
        params
            .description
            .if_present(|value| model.description = Set(value));
        if let OptionalValue::Present(overrides) = params.job_config_overrides {
            model.job_config_overrides = Set(overrides_to_text(overrides)?);
        }

        if !model.is_changed() {
            return DbRepository::try_from(found);
        }

        DbRepository::try_from(model.update(&self.db).await?)
    }

    #[instrument(skip(self))]
    async fn delete_repository(&self, id: i32) -> DbResult<()> {
        let res = Repository::delete_by_id(id).exec(&self.db).await?;

        if res.rows_affected == 0 {
            return Err(DatabaseError::not_found(NotFoundError::Repository { id }));
        }

        Ok(())
    }

    async fn sql_get_repository(&self, id: i32) -> DbResult<entity::repository::Model> {
        match Repository::find_by_id(id).one(&self.db).await? {
            Some(repo) => Ok(repo),
            None => Err(DatabaseError::not_found(NotFoundError::Repository { id })),
        }
    }

    #[instrument(skip(self))]
    async fn sql_lock_repository(&self, id: i32) -> DbResult<DbRepository> {
        match Repository::find_by_id(id)
            .lock_exclusive()
            .one(&self.db)
            .await?
        {
            Some(repo) => DbRepository::try_from(repo),
            None => Err(DatabaseError::not_found(NotFoundError::Repository { id })),
        }
    }
}
