use crate::database::{
    apply_list_query,
    entity::{self, prelude::*},
    AlreadyExistsError, BackendDatabase, DatabaseError, DbResult, NotFoundError,
};
use crate::models::{ListQueryParameters, ListResult, OptionalValue};
use async_trait::async_trait;
use sea_orm::{entity::*, query::*, ConnectionTrait};
use tracing::info;
use tracing_attributes::instrument;

pub mod models {
    use crate::database::entity;

    pub type DbOrganization = crate::models::Organization;

    impl From<entity::organization::Model> for DbOrganization {
        fn from(source: entity::organization::Model) -> Self {
            Self {
                id: source.id,
                name: source.name,
                description: source.description,
            }
        }
    }
}

pub use models::*;

/**
 * OrganizationQueries is the CRUD API for the root of the hierarchy. Deleting
 * an organization removes its products, repositories and runs through the
 * foreign key cascades.
 */
#[async_trait]
pub trait OrganizationQueries {
    async fn create_organization(
        &self,
        name: &str,
        description: Option<String>,
    ) -> DbResult<DbOrganization>;

    async fn get_organization(&self, id: i32) -> DbResult<DbOrganization>;

    async fn list_organizations(
        &self,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbOrganization>>;

    async fn update_organization(
        &self,
        id: i32,
        name: OptionalValue<String>,
        description: OptionalValue<Option<String>>,
    ) -> DbResult<DbOrganization>;

    async fn delete_organization(&self, id: i32) -> DbResult<()>;

    async fn sql_get_organization(&self, id: i32) -> DbResult<entity::organization::Model>;

    async fn sql_find_organization_by_name(
        &self,
        name: &str,
    ) -> DbResult<Option<entity::organization::Model>>;
}

fn sort_column(name: &str) -> Option<entity::organization::Column> {
    use entity::organization::Column;

    match name {
        "id" => Some(Column::Id),
        "name" => Some(Column::Name),
        "description" => Some(Column::Description),
        "createdAt" => Some(Column::CreatedAt),
        _ => None,
    }
}

#[async_trait]
impl<C> OrganizationQueries for BackendDatabase<C>
where
    C: ConnectionTrait + Send + Sync,
{
    #[instrument(skip(self))]
    async fn create_organization(
        &self,
        name: &str,
        description: Option<String>,
    ) -> DbResult<DbOrganization> {
        use entity::organization;

        if let Some(found_org) = self.sql_find_organization_by_name(name).await? {
            info!(
                org = tracing::field::debug(&found_org),
                "Found existing org with name {}.", name
            );
            return Err(DatabaseError::AlreadyExists {
                error: AlreadyExistsError::Organization {
                    name: name.to_owned(),
                },
            });
        }

        let model = organization::ActiveModel {
            name: Set(name.to_owned()),
            description: Set(description),
            created_at: Set(self.date_time_provider.now()),
            ..Default::default()
        };

        let res = Organization::insert(model).exec(&self.db).await?;
        self.get_organization(res.last_insert_id).await
    }

    #[instrument(skip(self))]
    async fn get_organization(&self, id: i32) -> DbResult<DbOrganization> {
        Ok(self.sql_get_organization(id).await?.into())
    }

    #[instrument(skip(self))]
    async fn list_organizations(
        &self,
        query: &ListQueryParameters,
    ) -> DbResult<ListResult<DbOrganization>> {
        use entity::organization::Column;

        let total_count = Organization::find().count(&self.db).await?;
        let items = apply_list_query(Organization::find(), query, Column::Id, sort_column)?
            .all(&self.db)
            .await?;

        Ok(ListResult {
            items: items.into_iter().map(DbOrganization::from).collect(),
            total_count,
            query: query.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn update_organization(
        &self,
        id: i32,
        name: OptionalValue<String>,
        description: OptionalValue<Option<String>>,
    ) -> DbResult<DbOrganization> {
        let found = self.sql_get_organization(id).await?;

        if let OptionalValue::Present(new_name) = &name {
            if let Some(other) = self.sql_find_organization_by_name(new_name).await? {
                if other.id != id {
                    return Err(DatabaseError::AlreadyExists {
                        error: AlreadyExistsError::Organization {
                            name: new_name.clone(),
                        },
                    });
                }
            }
        }

        let mut model: entity::organization::ActiveModel = found.clone().into();
        name.if_present(|value| model.name = Set(value));
        description.if_present(|value| model.description = Set(value));

        if !model.is_changed() {
            return Ok(found.into());
        }

        Ok(model.update(&self.db).await?.into())
    }

    #[instrument(skip(self))]
    async fn delete_organization(&self, id: i32) -> DbResult<()> {
        let res = Organization::delete_by_id(id).exec(&self.db).await?;

        if res.rows_affected == 0 {
            return Err(DatabaseError::not_found(NotFoundError::Organization { id }));
        }

        Ok(())
    }

    async fn sql_get_organization(&self, id: i32) -> DbResult<entity::organization::Model> {
        match Organization::find_by_id(id).one(&self.db).await? {
            Some(org) => Ok(org),
            None => Err(DatabaseError::not_found(NotFoundError::Organization { id })),
        }
    }

    async fn sql_find_organization_by_name(
        &self,
        name: &str,
    ) -> DbResult<Option<entity::organization::Model>> {
        use entity::organization::Column;

        Ok(Organization::find()
            .filter(Column::Name.eq(name))
            .one(&self.db)
            .await?)
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
    async fn test_orgs() {
        let db = make_db().await;

        let org = db
            .create_organization("foo", Some("the foo org".to_owned()))
            .await
            .unwrap();
        assert_eq!(org.name, "foo");
        assert_eq!(org.description, Some("the foo org".to_owned()));

        let found = db.get_organization(org.id).await.unwrap();
        assert_eq!(found, org);

        assert_eq!(
            db.create_organization("foo", None)
                .await
                .unwrap_err()
                .to_string(),
            "Organization foo exists"
        );
        assert_eq!(
            db.get_organization(org.id + 100)
                .await
                .unwrap_err()
                .to_string(),
            format!("Organization with id {} not found", org.id + 100)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_update_keeps_absent_fields() {
        let db = make_db().await;
        let org = db
            .create_organization("foo", Some("description".to_owned()))
            .await
            .unwrap();

        let updated = db
            .update_organization(org.id, OptionalValue::Absent, OptionalValue::Present(None))
            .await
            .unwrap();
        assert_eq!(updated.name, "foo");
        assert_eq!(updated.description, None);

        let updated = db
            .update_organization(
                org.id,
                OptionalValue::Present("bar".to_owned()),
                OptionalValue::Absent,
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "bar");
        assert_eq!(updated.description, None);

        let unchanged = db
            .update_organization(org.id, OptionalValue::Absent, OptionalValue::Absent)
            .await
            .unwrap();
        assert_eq!(unchanged, updated);
        assert_eq!(db.get_organization(org.id).await.unwrap(), updated);

        db.create_organization("other", None).await.unwrap();
        assert!(matches!(
            db.update_organization(
                org.id,
                OptionalValue::Present("other".to_owned()),
                OptionalValue::Absent
            )
            .await,
            Err(DatabaseError::AlreadyExists { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_org_pagination() {
        let db = make_db().await;

        for i in 0..25 {
            db.create_organization(&format!("org-{:02}", i), None)
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for page in 0..3 {
            let query = ListQueryParameters::new(vec![OrderField::descending("name")], 10, page * 10);
            let result = db.list_organizations(&query).await.unwrap();
            assert_eq!(result.total_count, 25);
            assert_eq!(result.has_more(), page < 2);
            seen.extend(result.items.into_iter().map(|it| it.name));
        }

        let expected: Vec<String> = (0..25).rev().map(|i| format!("org-{:02}", i)).collect();
        assert_eq!(seen, expected);

        let bad_sort = ListQueryParameters::new(vec![OrderField::ascending("password")], 10, 0);
        assert!(matches!(
            db.list_organizations(&bad_sort).await,
            Err(DatabaseError::InvalidArgument { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn test_delete_org() {
        let db = make_db().await;
        let org = db.create_organization("foo", None).await.unwrap();

        db.delete_organization(org.id).await.unwrap();
        assert!(matches!(
            db.get_organization(org.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
        assert!(matches!(
            db.delete_organization(org.id).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }
}
