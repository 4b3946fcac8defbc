use crate::models::{JobStatus, JobType, OrtRunStatus};
use std::collections::{BTreeMap, BTreeSet};

/// What should happen to a run given the jobs it has so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunEvaluation {
    /// Stages whose dependencies all succeeded and that have no job yet.
    pub to_create: Vec<JobType>,
    /// Stages that will never run, mapped to the dependency that failed or was
    /// itself skipped.
    pub blocked: BTreeMap<JobType, JobType>,
    /// Set once nothing is left to create or wait for.
    pub final_status: Option<OrtRunStatus>,
}

/// The stages `stage` has to wait for, restricted to the configured ones.
pub fn dependencies(stage: JobType, configured: &BTreeSet<JobType>) -> Vec<JobType> {
    let configured_of = |candidates: &[JobType]| -> Vec<JobType> {
        candidates
            .iter()
            .filter(|it| configured.contains(it))
            .copied()
            .collect()
    };

    match stage {
        JobType::Analyzer => vec![],
        JobType::Advisor | JobType::Scanner => vec![JobType::Analyzer],
        JobType::Evaluator => configured_of(&[JobType::Analyzer, JobType::Advisor, JobType::Scanner]),
        JobType::Reporter => {
            if configured.contains(&JobType::Evaluator) {
                vec![JobType::Evaluator]
            } else {
                let analysis = configured_of(&[JobType::Advisor, JobType::Scanner]);
                if analysis.is_empty() {
                    vec![JobType::Analyzer]
                } else {
                    analysis
                }
            }
        }
    }
}

/// Computes the next step of a run. `jobs` holds the status of every job that
/// was created for the run, keyed by stage.
///
/// Stages are visited in execution order, so the dependencies of a stage are
/// always decided before the stage itself.
pub fn evaluate(
    configured: &BTreeSet<JobType>,
    jobs: &BTreeMap<JobType, JobStatus>,
) -> RunEvaluation {
    let mut evaluation = RunEvaluation::default();

    for stage in configured.iter().copied() {
        if jobs.contains_key(&stage) {
            continue;
        }

        let mut ready = true;
        for dependency in dependencies(stage, configured) {
            let failed = jobs.get(&dependency) == Some(&JobStatus::Failed);
            if failed || evaluation.blocked.contains_key(&dependency) {
                evaluation.blocked.insert(stage, dependency);
                ready = false;
                break;
            }

            if !jobs.get(&dependency).map_or(false, JobStatus::is_successful) {
                ready = false;
            }
        }

        if ready {
            evaluation.to_create.push(stage);
        }
    }

    let pending = jobs.values().any(|status| !status.is_terminal());
    let undecided = configured
        .iter()
        .any(|stage| !jobs.contains_key(stage) && !evaluation.blocked.contains_key(stage));

    if evaluation.to_create.is_empty() && !pending && !undecided {
        let any_failed = jobs.values().any(|status| *status == JobStatus::Failed);
        evaluation.final_status = if any_failed || !evaluation.blocked.is_empty() {
            Some(OrtRunStatus::Failed)
        } else {
            Some(OrtRunStatus::Finished)
        };
    }

    evaluation
}
