use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ort_run_label")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub ort_run_id: i32,
    pub label_name: String,
    pub label_value: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ort_run::Entity",
        from = "Column::OrtRunId",
        to = "super::ort_run::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    OrtRun,
}

impl Related<super::ort_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrtRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
