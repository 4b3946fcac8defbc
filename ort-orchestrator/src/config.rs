use crate::models::JobType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::IntoEnumIterator;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("Unable to parse config file: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// Optional settings file passed with `--config`. Every key has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub list: ListConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ListConfig {
    /// Page size used when a request does not set `limit`.
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TransportConfig {
    /// Stages that have workers attached. Jobs of other stages fail on dispatch.
    pub enabled_stages: BTreeSet<JobType>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled_stages: JobType::iter().collect(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.list.default_limit == 0 || self.list.default_limit > self.list.max_limit {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "default-limit {} must be between 1 and max-limit {}",
                    self.list.default_limit, self.list.max_limit
                ),
            });
        }

        Ok(())
    }
}
