use crate::database::{
    entity::{self, prelude::*},
    BackendDatabase, DbResult,
};
use async_trait::async_trait;
use sea_orm::{entity::*, query::*, ConnectionTrait};
use std::collections::BTreeMap;
use tracing::debug;
use tracing_attributes::instrument;

pub mod models {
    use crate::database::entity;
    use std::collections::BTreeMap;

    pub type RunLabels = crate::models::GenericLabels;

    impl From<&[entity::ort_run_label::Model]> for RunLabels {
        fn from(source: &[entity::ort_run_label::Model]) -> Self {
            let mut labels: BTreeMap<String, String> = Default::default();
            for value in source.iter() {
                labels.insert(value.label_name.to_string(), value.label_value.to_string());
            }

            Self { labels }
        }
    }

    impl From<Vec<entity::ort_run_label::Model>> for RunLabels {
        fn from(source: Vec<entity::ort_run_label::Model>) -> Self {
            source.as_slice().into()
        }
    }
}

pub use models::*;

/**
 * RunLabelQueries stores the free-form labels of a run. They are written once
 * in the transaction that creates the run, so setting them replaces whatever
 * was there before.
 */
#[async_trait]
pub trait RunLabelQueries {
    async fn sql_set_run_labels(
        &self,
        ort_run_id: i32,
        labels: &BTreeMap<String, String>,
    ) -> DbResult<()>;

    async fn get_run_labels(&self, ort_run_id: i32) -> DbResult<RunLabels>;
}

#[async_trait]
impl<C> RunLabelQueries for BackendDatabase<C>
where
    C: ConnectionTrait + Send + Sync,
{
    #[instrument(skip(self))]
    async fn sql_set_run_labels(
        &self,
        ort_run_id: i32,
        labels: &BTreeMap<String, String>,
    ) -> DbResult<()> {
        let mut new_labels = Vec::default();

        for (key, value) in labels {
            new_labels.push(entity::ort_run_label::ActiveModel {
                ort_run_id: Set(ort_run_id),
                label_name: Set(key.to_string()),
                label_value: Set(value.to_string()),
                created_at: Set(self.date_time_provider.now()),
                ..Default::default()
            })
        }

        let new_label_count = new_labels.len();

        let del = OrtRunLabel::delete_many()
            .filter(entity::ort_run_label::Column::OrtRunId.eq(ort_run_id))
            .exec(&self.db)
            .await?;
        if !new_labels.is_empty() {
            OrtRunLabel::insert_many(new_labels).exec(&self.db).await?;
        }

        debug!(
            "Deleted {} rows, Inserted {} rows",
            del.rows_affected, new_label_count
        );
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_run_labels(&self, ort_run_id: i32) -> DbResult<RunLabels> {
        let labels = OrtRunLabel::find()
            .filter(entity::ort_run_label::Column::OrtRunId.eq(ort_run_id))
            .all(&self.db)
            .await?;
        Ok(labels.into())
    }
}

#[cfg(test)]
mod integ_test {
    use super::*;
    use crate::test_utils::*;
    use serial_test::serial;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    #[serial]
    async fn update_labels() {
        let db = make_db().await;
        let run = create_test_run(&db, vec![("owner", "bobby tables")]).await;

        let labels = db.get_run_labels(run.id).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("owner").unwrap(), "bobby tables");

        let mut labels = BTreeMap::new();
        labels.insert("trigger".to_owned(), "nightly".to_owned());
        db.sql_set_run_labels(run.id, &labels).await.unwrap();

        let labels = db.get_run_labels(run.id).await.unwrap();
        assert_eq!(labels.get("trigger"), Some(&"nightly".to_owned()));
        assert_eq!(labels.get("owner"), None);
    }
}
