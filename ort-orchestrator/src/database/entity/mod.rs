pub mod prelude;

pub mod organization;
pub mod ort_run;
pub mod ort_run_label;
pub mod product;
pub mod repository;
pub mod worker_job;
