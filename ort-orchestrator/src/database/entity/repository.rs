use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "repository")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub organization_id: i32,
    pub product_id: i32,
    pub repo_type: String,
    pub url: String,
    pub description: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub job_config_overrides: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Product,
    #[sea_orm(has_many = "super::ort_run::Entity")]
    OrtRun,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::ort_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrtRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
