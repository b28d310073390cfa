use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dmarq_core::{AppError, AppResult, DomainId, GroupId, Principal, Role};
use dmarq_domain::{Permission, permissions_for};

/// One domain a principal may access, resolved from grant data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibleDomain {
    /// Stable domain identifier.
    pub id: DomainId,
    /// Lowercased domain name.
    pub name: String,
}

/// The resolved set of domains bounding every query for one request.
///
/// Computed once per request and never mutated. An empty set is a meaningful
/// "sees nothing" state and must short-circuit callers to empty results, never
/// to an unrestricted query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    /// App-admin sentinel: no domain predicate is applied at all.
    Unrestricted,
    /// Every other role: the exact id-to-name set of visible domains.
    Domains(BTreeMap<DomainId, String>),
}

impl AccessScope {
    /// Returns whether this scope bypasses domain filtering.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Self::Unrestricted)
    }

    /// Returns whether this scope denies all visibility.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Unrestricted => false,
            Self::Domains(domains) => domains.is_empty(),
        }
    }

    /// Returns whether a domain id is visible under this scope.
    #[must_use]
    pub fn contains_id(&self, domain_id: DomainId) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Domains(domains) => domains.contains_key(&domain_id),
        }
    }

    /// Returns whether a lowercased domain name is visible under this scope.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Domains(domains) => domains.values().any(|value| value == name),
        }
    }

    /// Returns the visible domain ids, or `None` when unrestricted.
    #[must_use]
    pub fn domain_ids(&self) -> Option<Vec<DomainId>> {
        match self {
            Self::Unrestricted => None,
            Self::Domains(domains) => Some(domains.keys().copied().collect()),
        }
    }
}

/// Repository port for access-grant lookups.
#[async_trait]
pub trait AccessGrantRepository: Send + Sync {
    /// Lists the domains a subject may access: the union of direct grants and
    /// the domains of every granted group.
    async fn list_accessible_domains(&self, subject: &str) -> AppResult<Vec<AccessibleDomain>>;

    /// Returns whether the subject holds a grant for the group itself.
    async fn is_group_granted(&self, subject: &str, group_id: GroupId) -> AppResult<bool>;
}

/// Per-request authorization decisions.
///
/// This is the only component permitted to decide whether a domain or group is
/// visible; everything downstream consumes the [`AccessScope`] it resolves.
#[derive(Clone)]
pub struct AccessPolicy {
    grants: Arc<dyn AccessGrantRepository>,
}

impl AccessPolicy {
    /// Creates a policy from a grant repository implementation.
    #[must_use]
    pub fn new(grants: Arc<dyn AccessGrantRepository>) -> Self {
        Self { grants }
    }

    /// Returns the principal's role.
    #[must_use]
    pub fn current_role(&self, principal: &Principal) -> Role {
        principal.role()
    }

    /// Returns whether the principal's role carries a permission.
    #[must_use]
    pub fn has_permission(&self, principal: &Principal, permission: Permission) -> bool {
        permissions_for(principal.role()).contains(&permission)
    }

    /// Ensures the principal's role carries a permission.
    pub fn require_permission(
        &self,
        principal: &Principal,
        permission: Permission,
    ) -> AppResult<()> {
        if self.has_permission(principal, permission) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "subject '{}' with role '{}' is missing permission '{}'",
            principal.subject(),
            principal.role().as_str(),
            permission.as_str()
        )))
    }

    /// Resolves the set of domains the principal may see.
    pub async fn accessible_domains(&self, principal: &Principal) -> AppResult<AccessScope> {
        if principal.role() == Role::AppAdmin {
            return Ok(AccessScope::Unrestricted);
        }

        let domains = self
            .grants
            .list_accessible_domains(principal.subject())
            .await?;

        Ok(AccessScope::Domains(
            domains
                .into_iter()
                .map(|domain| (domain.id, domain.name))
                .collect(),
        ))
    }

    /// Returns whether the principal may access one domain.
    pub async fn can_access_domain(
        &self,
        principal: &Principal,
        domain_id: DomainId,
    ) -> AppResult<bool> {
        let scope = self.accessible_domains(principal).await?;
        Ok(scope.contains_id(domain_id))
    }

    /// Returns whether the principal may access one domain group.
    pub async fn can_access_group(
        &self,
        principal: &Principal,
        group_id: GroupId,
    ) -> AppResult<bool> {
        if principal.role() == Role::AppAdmin {
            return Ok(true);
        }

        self.grants
            .is_group_granted(principal.subject(), group_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use async_trait::async_trait;
    use dmarq_core::{AppError, AppResult, DomainId, GroupId, Principal, Role};
    use dmarq_domain::Permission;

    use super::{AccessGrantRepository, AccessPolicy, AccessScope, AccessibleDomain};

    #[derive(Default)]
    struct FakeAccessGrantRepository {
        domains: HashMap<String, Vec<AccessibleDomain>>,
        group_grants: HashSet<(String, GroupId)>,
    }

    #[async_trait]
    impl AccessGrantRepository for FakeAccessGrantRepository {
        async fn list_accessible_domains(
            &self,
            subject: &str,
        ) -> AppResult<Vec<AccessibleDomain>> {
            Ok(self.domains.get(subject).cloned().unwrap_or_default())
        }

        async fn is_group_granted(&self, subject: &str, group_id: GroupId) -> AppResult<bool> {
            Ok(self.group_grants.contains(&(subject.to_owned(), group_id)))
        }
    }

    fn viewer() -> Principal {
        Principal::new("alice", "Alice", None, Role::Viewer)
    }

    fn admin() -> Principal {
        Principal::new("root", "Root", None, Role::AppAdmin)
    }

    #[test]
    fn viewer_lacks_export_permission() {
        let policy = AccessPolicy::new(Arc::new(FakeAccessGrantRepository::default()));
        let denied = policy.require_permission(&viewer(), Permission::ReportsExport);
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
        assert!(policy.has_permission(&viewer(), Permission::ReportsView));
    }

    #[tokio::test]
    async fn app_admin_scope_is_unrestricted() {
        let policy = AccessPolicy::new(Arc::new(FakeAccessGrantRepository::default()));
        let scope = policy.accessible_domains(&admin()).await;
        assert_eq!(scope.ok(), Some(AccessScope::Unrestricted));
    }

    #[tokio::test]
    async fn granted_domains_form_the_scope() {
        let repository = FakeAccessGrantRepository {
            domains: HashMap::from([(
                "alice".to_owned(),
                vec![AccessibleDomain {
                    id: DomainId::new(7),
                    name: "a.com".to_owned(),
                }],
            )]),
            group_grants: HashSet::new(),
        };
        let policy = AccessPolicy::new(Arc::new(repository));

        let scope = policy.accessible_domains(&viewer()).await;
        assert!(scope.as_ref().is_ok_and(|s| s.contains_id(DomainId::new(7))));
        assert!(scope.as_ref().is_ok_and(|s| s.contains_name("a.com")));
        assert!(scope.is_ok_and(|s| !s.contains_name("b.com")));
    }

    #[tokio::test]
    async fn ungranted_subject_has_empty_scope() {
        let policy = AccessPolicy::new(Arc::new(FakeAccessGrantRepository::default()));
        let scope = policy.accessible_domains(&viewer()).await;
        assert!(scope.is_ok_and(|s| s.is_empty()));
    }

    #[tokio::test]
    async fn group_grant_checks_pass_through_the_repository() {
        let repository = FakeAccessGrantRepository {
            domains: HashMap::new(),
            group_grants: HashSet::from([("alice".to_owned(), GroupId::new(3))]),
        };
        let policy = AccessPolicy::new(Arc::new(repository));

        assert_eq!(
            policy.can_access_group(&viewer(), GroupId::new(3)).await.ok(),
            Some(true)
        );
        assert_eq!(
            policy.can_access_group(&viewer(), GroupId::new(4)).await.ok(),
            Some(false)
        );
        assert_eq!(
            policy.can_access_group(&admin(), GroupId::new(4)).await.ok(),
            Some(true)
        );
    }
}
