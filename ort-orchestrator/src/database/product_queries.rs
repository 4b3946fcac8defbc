use crate::database::{
    apply_list_query,
    entity::{self, prelude::*},
    org_queries::OrganizationQueries,
    AlreadyExistsError, BackendDatabase, DatabaseError, DbResult, NotFoundError,
};
use crate::models::{ListQueryParameters, ListResult, OptionalValue};
use async_trait::async_trait;
use sea_orm::{entity::*, query::*, ConnectionTrait};
use tracing::info;
use tracing_attributes::instrument;

pub mod models {
    use crate::database::entity;

    pub type DbProduct = crate::models::Product;

    impl From<entity::product::Model> for DbProduct {
        fn from(source: entity::product::Model) -> Self {
            Self {
                id: source.id,
                organization_id: source.organization_id,
                name: source.name,
                description: source.description,
            }
        }
    }
}

pub use models::*;

/**
 * ProductQueries manages the products of an organization. Product names only
 * need to be unique inside their organization.
 */
#[async_trait]
pub trait ProductQueries {
    async fn create_product(
        &self,
        organization_id: i32,
        name: &str,
        description: Option<String>,
    ) -> DbResult<DbProduct>;

    async fn get_product(&self, id: i32) -> DbResult<DbProduct>;

    async fn list_products_for_organization(
        &self,
        organization_id: i32,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbProduct>>;

    async fn update_product(
        &self,
        id: i32,
        name: OptionalValue<String>,
        description: OptionalValue<Option<String>>,
    ) -> DbResult<DbProduct>;

    async fn delete_product(&self, id: i32) -> DbResult<()>;

    async fn sql_get_product(&self, id: i32) -> DbResult<entity::product::Model>;

    async fn sql_find_product_by_name(
        &self,
        organization_id: i32,
        name: &str,
    ) -> DbResult<Option<entity::product::Model>>;
}

fn sort_column(name: &str) -> Option<entity::product::Column> {
    use entity::product::Column;

    match name {
        "id" => Some(Column::Id),
        "name" => Some(Column::Name),
        "description" => Some(Column::Description),
        "createdAt" => Some(Column::CreatedAt),
        _ => None,
    }
}

#[async_trait]
impl<C> ProductQueries for BackendDatabase<C>
where
    C: ConnectionTrait + Send + Sync,
{
    #[instrument(skip(self))]
    async fn create_product(
        &self,
        organization_id: i32,
        name: &str,
        description: Option<String>,
    ) -> DbResult<DbProduct> {
        use entity::product;

        let org = self.sql_get_organization(organization_id).await?;

        if let Some(found) = self.sql_find_product_by_name(org.id, name).await? {
            info!(
                product = tracing::field::debug(&found),
                "Found existing product {} in org {}.", name, org.name
            );
            return Err(DatabaseError::AlreadyExists {
                error: AlreadyExistsError::Product {
                    organization_id,
                    name: name.to_owned(),
                },
            });
        }

        let model = product::ActiveModel {
            organization_id: Set(org.id),
            name: Set(name.to_owned()),
            description: Set(description),
            created_at: Set(self.date_time_provider.now()),
            ..Default::default()
        };

        let res = Product::insert(model).exec(&self.db).await?;
        self.get_product(res.last_insert_id).await
    }

    #[instrument(skip(self))]
    async fn get_product(&self, id: i32) -> DbResult<DbProduct> {
        Ok(self.sql_get_product(id).await?.into())
    }

    #[instrument(skip(self))]
    async fn list_products_for_organization(
        &self,
        organization_id: i32,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbProduct>> {
        use entity::product::Column;

        let org = self.sql_get_organization(organization_id).await?;
        let select = org.find_related(Product);

        let total_count = select.clone().count(&self.db).await?;
        let items = apply_list_query(select, query, Column::Id, sort_column)?
            .all(&self.db)
            .await?;

        Ok(ListResult {
            items: items.into_iter().map(DbProduct::from).collect(),
            total_count,
            query: query.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn update_product(
        &self,
        id: i32,
        name: OptionalValue<String>,
        description: OptionalValue<Option<String>>,
    ) -> DbResult<DbProduct> {
        let found = self.sql_get_product(id).await?;

        if let OptionalValue::Present(new_name) = &name {
            if let Some(other) = self
                .sql_find_product_by_name(found.organization_id, new_name)
                .await?
            {
                if other.id != id {
                    return Err(DatabaseError::AlreadyExists {
                        error: AlreadyExistsError::Product {
                            organization_id: found.organization_id,
                            name: new_name.clone(),
                        },
                    });
                }
            }
        }

        let mut model: entity::product::ActiveModel = found.clone().into();
        name.if_present(|value| model.name = Set(value));
        description.if_present(|value| model.description = Set(value));

        if !model.is_changed() {
            return Ok(found.into());
        }

        Ok(model.update(&self.db).await?.into())
    }

    #[instrument(skip(self))]
    async fn delete_product(&self, id: i32) -> DbResult<()> {
        let res = Product::delete_by_id(id).exec(&self.db).await?;

        if res.rows_affected == 0 {
            return Err(DatabaseError::not_found(NotFoundError::Product { id }));
        }

        Ok(())
    }

    async fn sql_get_product(&self, id: i32) -> DbResult<entity::product::Model> {
        match Product::find_by_id(id).one(&self.db).await? {
            Some(product) => Ok(product),
            None => Err(DatabaseError::not_found(NotFoundError::Product { id })),
        }
    }

    async fn sql_find_product_by_name(
        &self,
        organization_id: i32,
        name: &str,
    ) -> DbResult<Option<entity::product::Model>> {
        use entity::product::Column;

        let condition = Condition::all()
            .add(Column::Name.eq(name))
            .add(Column::OrganizationId.eq(organization_id));
        Ok(Product::find().filter(condition).one(&self.db).await?)
    }
}

#[cfg(test)]
mod integ_test {
    use super::*;
    use crate::models::OrderField;
    use crate::test_utils::*;
    use serial_test::serial;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_products() {
        let db = make_db().await;
        let org = db.create_organization("foo", None).await.unwrap();
        let other_org = db.create_organization("bar", None).await.unwrap();

        let product = db.create_product(org.id, "app", None).await.unwrap();
        assert_eq!(product.organization_id, org.id);
        assert_eq!(db.get_product(product.id).await.unwrap(), product);

        // Same name is fine in another organization.
        db.create_product(other_org.id, "app", None).await.unwrap();

        assert_eq!(
            db.create_product(org.id, "app", None)
                .await
                .unwrap_err()
                .to_string(),
            format!("Product app exists in organization {}", org.id)
        );
        assert!(matches!(
            db.create_product(org.id + 100, "app", None).await,
            Err(DatabaseError::NotFound {
                error: NotFoundError::Organization { .. }
            })
        ));

        db.create_product(org.id, "lib", Some("library".to_owned()))
            .await
            .unwrap();
        let listed = db
            .list_products_for_organization(
                org.id,
                &ListQueryParameters::new(vec![OrderField::ascending("name")], 20, 0),
            )
            .await
            .unwrap();
        assert_eq!(listed.total_count, 2);
        assert_eq!(
            listed.items.iter().map(|it| it.name.as_str()).collect::<Vec<_>>(),
            vec!["app", "lib"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_delete_org_cascades_to_products() {
        let db = make_db().await;
        let org = db.create_organization("foo", None).await.unwrap();
        let product = db.create_product(org.id, "app", None).await.unwrap();

        db.delete_organization(org.id).await.unwrap();
        assert!(matches!(
            db.get_product(product.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_update_product() {
        let db = make_db().await;
        let org = db.create_organization("foo", None).await.unwrap();
        let product = db
            .create_product(org.id, "app", Some("old".to_owned()))
            .await
            .unwrap();

        let updated = db
            .update_product(
                product.id,
                OptionalValue::Absent,
                OptionalValue::Present(Some("new".to_owned())),
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "app");
        assert_eq!(updated.description, Some("new".to_owned()));
    }
}
