use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
    pub description: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryType {
    Git,
    GitRepo,
    Mercurial,
    Subversion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i32,
    pub organization_id: i32,
    pub product_id: i32,
    #[serde(rename = "type")]
    pub repo_type: RepositoryType,
    pub url: String,
    pub description: Option<String>,
    /// Partial job configuration merged into every run of this repository.
    pub job_config_overrides: Option<serde_json::Value>,
}

#[test]
fn validate_repository_type_names() {
    use std::str::FromStr;

    assert_eq!(RepositoryType::GitRepo.to_string(), "GIT_REPO");
    assert_eq!(
        RepositoryType::from_str("SUBVERSION").unwrap(),
        RepositoryType::Subversion
    );
    assert_eq!(
        serde_json::to_string(&RepositoryType::Mercurial).unwrap(),
        "\"MERCURIAL\""
    );
}
