use std::sync::Arc;

use async_trait::async_trait;
use dmarq_core::{AppError, AppResult, Principal};
use dmarq_domain::{Permission, ReportFilter, SavedFilter};
use uuid::Uuid;

use crate::access_policy::AccessPolicy;

/// Repository port for saved-filter persistence.
#[async_trait]
pub trait SavedFilterRepository: Send + Sync {
    /// Persists a saved filter.
    async fn save(&self, saved_filter: SavedFilter) -> AppResult<()>;

    /// Lists an owner's saved filters.
    async fn list_for_owner(&self, owner_subject: &str) -> AppResult<Vec<SavedFilter>>;

    /// Finds one saved filter by id, owner-scoped.
    async fn find(&self, id: Uuid, owner_subject: &str) -> AppResult<Option<SavedFilter>>;

    /// Deletes one saved filter by id, owner-scoped.
    async fn delete(&self, id: Uuid, owner_subject: &str) -> AppResult<bool>;
}

/// Thin persistence collaborator for named report filters.
///
/// Filters are stored as opaque JSON and re-normalized on load, so a stored
/// blob always yields the canonical [`ReportFilter`] shape.
#[derive(Clone)]
pub struct SavedFilterService {
    access_policy: AccessPolicy,
    repository: Arc<dyn SavedFilterRepository>,
}

impl SavedFilterService {
    /// Creates a service from an access policy and a repository.
    #[must_use]
    pub fn new(access_policy: AccessPolicy, repository: Arc<dyn SavedFilterRepository>) -> Self {
        Self {
            access_policy,
            repository,
        }
    }

    /// Saves a filter under the principal's ownership.
    pub async fn save_filter(
        &self,
        principal: &Principal,
        name: &str,
        filter: ReportFilter,
    ) -> AppResult<SavedFilter> {
        self.access_policy
            .require_permission(principal, Permission::ReportsView)?;

        let saved_filter = SavedFilter::new(
            Uuid::new_v4(),
            principal.subject(),
            name,
            filter.renormalized(),
        )?;
        self.repository.save(saved_filter.clone()).await?;
        Ok(saved_filter)
    }

    /// Lists the principal's saved filters, re-normalized.
    pub async fn list_filters(&self, principal: &Principal) -> AppResult<Vec<SavedFilter>> {
        self.access_policy
            .require_permission(principal, Permission::ReportsView)?;

        let stored = self.repository.list_for_owner(principal.subject()).await?;
        stored
            .into_iter()
            .map(|saved| {
                SavedFilter::new(
                    saved.id(),
                    saved.owner_subject().as_str(),
                    saved.name().as_str(),
                    saved.filter().renormalized(),
                )
            })
            .collect()
    }

    /// Loads one saved filter, re-normalized.
    pub async fn load_filter(&self, principal: &Principal, id: Uuid) -> AppResult<ReportFilter> {
        self.access_policy
            .require_permission(principal, Permission::ReportsView)?;

        let saved = self
            .repository
            .find(id, principal.subject())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("saved filter '{id}' does not exist")))?;

        Ok(saved.filter().renormalized())
    }

    /// Deletes one saved filter owned by the principal.
    pub async fn delete_filter(&self, principal: &Principal, id: Uuid) -> AppResult<()> {
        self.access_policy
            .require_permission(principal, Permission::ReportsView)?;

        if !self.repository.delete(id, principal.subject()).await? {
            return Err(AppError::NotFound(format!(
                "saved filter '{id}' does not exist"
            )));
        }

        Ok(())
    }
}
