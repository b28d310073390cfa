use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dmarq_application::{AccessGrantRepository, AccessibleDomain};
use dmarq_core::{AppResult, DomainId, GroupId};
use tokio::sync::Mutex;

/// In-memory grant store for tests and local development.
#[derive(Default)]
pub struct InMemoryAccessGrantRepository {
    domains: Mutex<HashMap<String, Vec<AccessibleDomain>>>,
    group_grants: Mutex<HashSet<(String, GroupId)>>,
}

impl InMemoryAccessGrantRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants a subject direct access to a domain.
    pub async fn grant_domain(&self, subject: &str, domain_id: DomainId, name: &str) {
        self.domains
            .lock()
            .await
            .entry(subject.to_owned())
            .or_default()
            .push(AccessibleDomain {
                id: domain_id,
                name: name.to_owned(),
            });
    }

    /// Grants a subject access to a group.
    pub async fn grant_group(&self, subject: &str, group_id: GroupId) {
        self.group_grants
            .lock()
            .await
            .insert((subject.to_owned(), group_id));
    }
}

#[async_trait]
impl AccessGrantRepository for InMemoryAccessGrantRepository {
    async fn list_accessible_domains(&self, subject: &str) -> AppResult<Vec<AccessibleDomain>> {
        Ok(self
            .domains
            .lock()
            .await
            .get(subject)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_group_granted(&self, subject: &str, group_id: GroupId) -> AppResult<bool> {
        Ok(self
            .group_grants
            .lock()
            .await
            .contains(&(subject.to_owned(), group_id)))
    }
}
