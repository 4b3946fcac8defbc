use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "worker_job")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub ort_run_id: i32,
    pub job_type: String,
    pub created_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub finished_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text")]
    pub configuration: String,
    pub status: String,
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
