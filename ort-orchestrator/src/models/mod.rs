mod hierarchy;
mod jobs;
mod list_query;
mod optional_value;
mod runs;

pub use hierarchy::*;
pub use jobs::*;
pub use list_query::*;
pub use optional_value::*;
pub use runs::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Deref;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericLabels {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl From<BTreeMap<String, String>> for GenericLabels {
    fn from(source: BTreeMap<String, String>) -> Self {
        Self { labels: source }
    }
}

impl Deref for GenericLabels {
    type Target = BTreeMap<String, String>;
    fn deref(&self) -> &Self::Target {
        &self.labels
    }
}
