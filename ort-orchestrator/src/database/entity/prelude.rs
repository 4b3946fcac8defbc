pub use super::organization::Entity as Organization;
pub use super::ort_run::Entity as OrtRun;
pub use super::ort_run_label::Entity as OrtRunLabel;
pub use super::product::Entity as Product;
pub use super::repository::Entity as Repository;
pub use super::worker_job::Entity as WorkerJob;
