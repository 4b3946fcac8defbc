use super::authorization::{cleanup_best_effort, provision_best_effort, HierarchyScope};
use super::{BackendError, DefaultBackend};
use crate::database::prelude::*;
use crate::models::{
    ListQueryParameters, ListResult, OptionalValue, Organization, Product, Repository,
};
use tracing_attributes::instrument;

impl DefaultBackend {
    #[instrument(skip(self))]
    pub async fn create_organization(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Organization, BackendError> {
        let org = self.database.create_organization(name, description).await?;
        provision_best_effort(
            self.authorization.as_ref(),
            HierarchyScope::Organization(org.id),
        )
        .await;
        Ok(org)
    }

    #[instrument(skip(self))]
    pub async fn get_organization(&self, id: i32) -> Result<Organization, BackendError> {
        Ok(self.database.get_organization(id).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_organizations(
        &self,
        query: ListQueryParameters,
    ) -> Result<ListResult<Organization>, BackendError> {
        let query = self.list_query(query)?;
        Ok(self.database.list_organizations(&query).await?)
    }

    #[instrument(skip(self))]
    pub async fn update_organization(
        &self,
        id: i32,
        name: OptionalValue<String>,
        description: OptionalValue<Option<String>>,
    ) -> Result<Organization, BackendError> {
        Ok(self
            .database
            .update_organization(id, name, description)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_organization(&self, id: i32) -> Result<(), BackendError> {
        self.database.delete_organization(id).await?;
        cleanup_best_effort(
            self.authorization.as_ref(),
            HierarchyScope::Organization(id),
        )
        .await;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        organization_id: i32,
        name: &str,
        description: Option<String>,
    ) -> Result<Product, BackendError> {
        let product = self
            .database
            .create_product(organization_id, name, description)
            .await?;
        provision_best_effort(
            self.authorization.as_ref(),
            HierarchyScope::Product(product.id),
        )
        .await;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, id: i32) -> Result<Product, BackendError> {
        Ok(self.database.get_product(id).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_products_for_organization(
        &self,
        organization_id: i32,
        query: ListQueryParameters,
    ) -> Result<ListResult<Product>, BackendError> {
        let query = self.list_query(query)?;
        Ok(self
            .database
            .list_products_for_organization(organization_id, &query)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: i32,
        name: OptionalValue<String>,
        description: OptionalValue<Option<String>>,
    ) -> Result<Product, BackendError> {
        Ok(self.database.update_product(id, name, description).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: i32) -> Result<(), BackendError> {
        self.database.delete_product(id).await?;
        cleanup_best_effort(self.authorization.as_ref(), HierarchyScope::Product(id)).await;
        Ok(())
    }

    #[instrument(skip(self, params))]
    pub async fn create_repository(
        &self,
        product_id: i32,
        params: CreateRepositoryParam,
    ) -> Result<Repository, BackendError> {
        let repository = self.database.create_repository(product_id, params).await?;
        provision_best_effort(
            self.authorization.as_ref(),
            HierarchyScope::Repository(repository.id),
        )
        .await;
        Ok(repository)
    }

    #[instrument(skip(self))]
    pub async fn get_repository(&self, id: i32) -> Result<Repository, BackendError> {
        Ok(self.database.get_repository(id).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_repositories_for_product(
        &self,
        product_id: i32,
        query: ListQueryParameters,
    ) -> Result<ListResult<Repository>, BackendError> {
        let query = self.list_query(query)?;
        Ok(self
            .database
            .list_repositories_for_product(product_id, &query)
            .await?)
    }

    #[instrument(skip(self, params))]
    pub async fn update_repository(
        &self,
        id: i32,
        params: UpdateRepositoryParam,
    ) -> Result<Repository, BackendError> {
        Ok(self.database.update_repository(id, params).await?)
    }

    /// Deleting a repository removes its runs and jobs. Jobs that are still out
    /// with a worker are not cancelled; their completions are dropped later.
    #[instrument(skip(self))]
    pub async fn delete_repository(&self, id: i32) -> Result<(), BackendError> {
        self.database.delete_repository(id).await?;
        cleanup_best_effort(self.authorization.as_ref(), HierarchyScope::Repository(id)).await;
        Ok(())
    }
}
