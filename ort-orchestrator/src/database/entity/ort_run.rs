use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ort_run")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub repository_id: i32,
    pub run_index: i32,
    pub revision: String,
    pub created_at: DateTimeUtc,
    pub finished_at: Option<DateTimeUtc>,
    pub status: String,
    #[sea_orm(column_type = "Text")]
    pub job_configs: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub resolved_job_configs: Option<String>,
    pub job_config_context: Option<String>,
    pub resolved_job_config_context: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub issues: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::repository::Entity",
        from = "Column::RepositoryId",
        to = "super::repository::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Repository,
    #[sea_orm(has_many = "super::ort_run_label::Entity")]
    OrtRunLabel,
    #[sea_orm(has_many = "super::worker_job::Entity")]
    WorkerJob,
}

impl Related<super::repository::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Repository.def()
    }
}

impl Related<super::ort_run_label::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrtRunLabel.def()
    }
}

impl Related<super::worker_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkerJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
