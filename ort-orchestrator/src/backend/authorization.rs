use crate::metrics::AUTHORIZATION_PROVISIONING_FAILURES;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

/// A node of the organization / product / repository hierarchy that owns its
/// own permissions and roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HierarchyScope {
    Organization(i32),
    Product(i32),
    Repository(i32),
}

impl HierarchyScope {
    pub fn entity(&self) -> &'static str {
        match self {
            HierarchyScope::Organization(_) => "organization",
            HierarchyScope::Product(_) => "product",
            HierarchyScope::Repository(_) => "repository",
        }
    }
}

impl fmt::Display for HierarchyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            HierarchyScope::Organization(id)
            | HierarchyScope::Product(id)
            | HierarchyScope::Repository(id) => id,
        };
        write!(f, "{} '{}'", self.entity(), id)
    }
}

#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("Authorization service is unavailable: {reason}")]
    Unavailable { reason: String },
}

/// The external system holding permission groups and roles.
#[async_trait]
pub trait AuthorizationService: Send + Sync {
    async fn create_permissions(&self, scope: HierarchyScope) -> Result<(), AuthorizationError>;
    async fn create_roles(&self, scope: HierarchyScope) -> Result<(), AuthorizationError>;
    async fn delete_permissions(&self, scope: HierarchyScope) -> Result<(), AuthorizationError>;
    async fn delete_roles(&self, scope: HierarchyScope) -> Result<(), AuthorizationError>;
}

/// Creates the permissions and roles of `scope`.
///
/// Runs after the entity was committed. A failure is logged and counted but
/// never returned, the permissions have to be reconciled out of band.
pub async fn provision_best_effort(service: &dyn AuthorizationService, scope: HierarchyScope) {
    let result = async {
        service.create_permissions(scope).await?;
        service.create_roles(scope).await
    }
    .await;

    if let Err(e) = result {
        AUTHORIZATION_PROVISIONING_FAILURES
            .with_label_values(&[scope.entity(), "create"])
            .inc();
        error!("Error while creating roles for {}: {}", scope, e);
    }
}

/// Removes the permissions and roles of `scope`, same rules as
/// [`provision_best_effort`].
pub async fn cleanup_best_effort(service: &dyn AuthorizationService, scope: HierarchyScope) {
    let result = async {
        service.delete_permissions(scope).await?;
        service.delete_roles(scope).await
    }
    .await;

    if let Err(e) = result {
        AUTHORIZATION_PROVISIONING_FAILURES
            .with_label_values(&[scope.entity(), "delete"])
            .inc();
        error!("Error while deleting roles for {}: {}", scope, e);
    }
}

const PERMISSIONS: [&str; 3] = ["READ", "WRITE", "DELETE"];
const ROLES: [&str; 3] = ["READER", "WRITER", "ADMIN"];

/// Keeps permission groups and roles in memory. Used when no external
/// authorization server is configured.
#[derive(Debug, Default)]
pub struct InMemoryAuthorizationService {
    groups: Mutex<BTreeMap<HierarchyScope, BTreeSet<String>>>,
}

impl InMemoryAuthorizationService {
    pub async fn groups(&self, scope: HierarchyScope) -> BTreeSet<String> {
        let groups = self.groups.lock().await;
        groups.get(&scope).cloned().unwrap_or_default()
    }

    async fn add(&self, scope: HierarchyScope, kind: &str, names: &[&str]) {
        let mut groups = self.groups.lock().await;
        let entry = groups.entry(scope).or_default();
        for name in names {
            entry.insert(format!("{}_{}", kind, name));
        }
        info!("Created {} groups for {}", kind.to_lowercase(), scope);
    }

    async fn remove(&self, scope: HierarchyScope, kind: &str) {
        let mut groups = self.groups.lock().await;
        if let Some(entry) = groups.get_mut(&scope) {
            let prefix = format!("{}_", kind);
            entry.retain(|it| !it.starts_with(&prefix));
            if entry.is_empty() {
                groups.remove(&scope);
            }
        }
    }
}

#[async_trait]
impl AuthorizationService for InMemoryAuthorizationService {
    async fn create_permissions(&self, scope: HierarchyScope) -> Result<(), AuthorizationError> {
        self.add(scope, "PERMISSION", &PERMISSIONS).await;
        Ok(())
    }

    async fn create_roles(&self, scope: HierarchyScope) -> Result<(), AuthorizationError> {
        self.add(scope, "ROLE", &ROLES).await;
        Ok(())
    }

    async fn delete_permissions(&self, scope: HierarchyScope) -> Result<(), AuthorizationError> {
        self.remove(scope, "PERMISSION").await;
        Ok(())
    }

    async fn delete_roles(&self, scope: HierarchyScope) -> Result<(), AuthorizationError> {
        self.remove(scope, "ROLE").await;
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::test_support::FailingAuthorizationService;
    use super::*;

    #[tokio::test]
    async fn provision_and_cleanup() {
        let service = InMemoryAuthorizationService::default();
        let scope = HierarchyScope::Product(3);

        provision_best_effort(&service, scope).await;
        let groups = service.groups(scope).await;
        assert!(groups.contains("PERMISSION_READ"));
        assert!(groups.contains("ROLE_ADMIN"));
        assert_eq!(groups.len(), 6);
        assert!(service.groups(HierarchyScope::Product(4)).await.is_empty());

        cleanup_best_effort(&service, scope).await;
        assert!(service.groups(scope).await.is_empty());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let scope = HierarchyScope::Organization(1);
        let before = AUTHORIZATION_PROVISIONING_FAILURES
            .with_label_values(&["organization", "create"])
            .get();

        provision_best_effort(&FailingAuthorizationService, scope).await;
        cleanup_best_effort(&FailingAuthorizationService, scope).await;

        assert!(
            AUTHORIZATION_PROVISIONING_FAILURES
                .with_label_values(&["organization", "create"])
                .get()
                > before
        );
        assert_eq!(scope.to_string(), "organization '1'");
    }
}
