use super::ConstraintViolation;
use crate::models::JobConfigurations;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Checks a requested run before anything is written.
pub fn validate_run_request(
    revision: &str,
    job_configs: &JobConfigurations,
    labels: &BTreeMap<String, String>,
) -> Result<(), ConstraintViolation> {
    if revision.trim().is_empty() {
        return Err(ConstraintViolation::EmptyRevision);
    }

    if labels.keys().any(|key| key.trim().is_empty()) {
        return Err(ConstraintViolation::EmptyLabelKey);
    }

    validate_job_configs(job_configs)
}

pub fn validate_job_configs(job_configs: &JobConfigurations) -> Result<(), ConstraintViolation> {
    if let Some(reporter) = &job_configs.reporter {
        if reporter.formats.is_empty() {
            return Err(ConstraintViolation::EmptyReporterFormats);
        }
    }

    let services = job_configs
        .analyzer
        .environment_config
        .iter()
        .flat_map(|it| it.infrastructure_services.iter());

    let mut names = BTreeSet::new();
    for service in services {
        if !names.insert(service.name.as_str()) {
            return Err(ConstraintViolation::DuplicateInfrastructureService {
                name: service.name.clone(),
            });
        }

        let missing = if service.name.trim().is_empty() {
            Some("name is empty")
        } else if service.url.trim().is_empty() {
            Some("url is empty")
        } else if service.username_secret_ref.trim().is_empty() {
            Some("username secret is empty")
        } else if service.password_secret_ref.trim().is_empty() {
            Some("password secret is empty")
        } else {
            None
        };

        if let Some(reason) = missing {
            return Err(ConstraintViolation::InvalidInfrastructureService {
                name: service.name.clone(),
                reason: reason.to_owned(),
            });
        }
    }

    Ok(())
}

/// Applies repository level overrides to a requested configuration.
///
/// `overrides` is a partial `JobConfigurations` document. It is merged key by
/// key into the stages the request enables; stages the request leaves out stay
/// disabled even if the overrides mention them.
pub fn resolve_job_configs(
    requested: &JobConfigurations,
    overrides: Option<&Value>,
) -> Result<JobConfigurations, ConstraintViolation> {
    let overrides = match overrides {
        None | Some(Value::Null) => return Ok(requested.clone()),
        Some(Value::Object(overrides)) => overrides,
        Some(_) => {
            return Err(ConstraintViolation::InvalidOverrides {
                reason: "expected a JSON object".to_owned(),
            })
        }
    };

    let mut document = serde_json::to_value(requested).map_err(|e| {
        ConstraintViolation::InvalidOverrides {
            reason: e.to_string(),
        }
    })?;

    if let Value::Object(stages) = &mut document {
        for stage in requested.configured_stages() {
            // Overrides adjust stages, they cannot switch a requested stage off.
            if let Some(patch) = overrides.get(&stage.path_name()).filter(|it| !it.is_null()) {
                let target = stages.entry(stage.path_name()).or_insert(Value::Null);
                deep_merge(target, patch);
            }
        }
    }

    let resolved: JobConfigurations =
        serde_json::from_value(document).map_err(|e| ConstraintViolation::InvalidOverrides {
            reason: e.to_string(),
        })?;
    validate_job_configs(&resolved)?;

    Ok(resolved)
}

fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                deep_merge(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
