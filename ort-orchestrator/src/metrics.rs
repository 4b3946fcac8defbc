use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref JOBS_DISPATCHED: IntCounterVec = counter_vec(
        "jobs_dispatched_total",
        "Jobs handed to the worker transport",
        &["job_type"]
    );
    pub static ref JOB_COMPLETIONS: IntCounterVec = counter_vec(
        "job_completions_total",
        "Job completions that changed the state of a job",
        &["job_type", "status"]
    );
    pub static ref DUPLICATE_JOB_COMPLETIONS: IntCounter = counter(
        "duplicate_job_completions_total",
        "Completions received for jobs that were already terminal"
    );
    pub static ref ORT_RUNS_FINALIZED: IntCounterVec = counter_vec(
        "ort_runs_finalized_total",
        "Runs that reached a terminal status",
        &["status"]
    );
    pub static ref AUTHORIZATION_PROVISIONING_FAILURES: IntCounterVec = counter_vec(
        "authorization_provisioning_failures_total",
        "Permission or role changes that failed and were left for reconciliation",
        &["entity", "action"]
    );
    pub static ref HTTP_RESPONSES: IntCounterVec = counter_vec(
        "http_responses_total",
        "Responses of the API by status code",
        &["status"]
    );
}

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric definition is valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric is only registered once");
    counter
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter =
        IntCounterVec::new(Opts::new(name, help), labels).expect("metric definition is valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric is only registered once");
    counter
}

#[test]
fn counters_are_registered() {
    DUPLICATE_JOB_COMPLETIONS.inc();
    JOBS_DISPATCHED.with_label_values(&["ANALYZER"]).inc();

    let names: Vec<String> = REGISTRY
        .gather()
        .iter()
        .map(|it| it.get_name().to_owned())
        .collect();
    assert!(names.contains(&"duplicate_job_completions_total".to_owned()));
    assert!(names.contains(&"jobs_dispatched_total".to_owned()));
}
