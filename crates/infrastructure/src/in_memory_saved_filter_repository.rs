use std::collections::HashMap;

use async_trait::async_trait;
use dmarq_application::SavedFilterRepository;
use dmarq_core::AppResult;
use dmarq_domain::SavedFilter;
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory saved-filter store for tests and local development.
#[derive(Default)]
pub struct InMemorySavedFilterRepository {
    filters: Mutex<HashMap<Uuid, SavedFilter>>,
}

impl InMemorySavedFilterRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SavedFilterRepository for InMemorySavedFilterRepository {
    async fn save(&self, saved_filter: SavedFilter) -> AppResult<()> {
        self.filters
            .lock()
            .await
            .insert(saved_filter.id(), saved_filter);
        Ok(())
    }

    async fn list_for_owner(&self, owner_subject: &str) -> AppResult<Vec<SavedFilter>> {
        let mut filters = self
            .filters
            .lock()
            .await
            .values()
            .filter(|saved| saved.owner_subject().as_str() == owner_subject)
            .cloned()
            .collect::<Vec<_>>();
        filters.sort_by(|a, b| a.name().as_str().cmp(b.name().as_str()));
        Ok(filters)
    }

    async fn find(&self, id: Uuid, owner_subject: &str) -> AppResult<Option<SavedFilter>> {
        Ok(self
            .filters
            .lock()
            .await
            .get(&id)
            .filter(|saved| saved.owner_subject().as_str() == owner_subject)
            .cloned())
    }

    async fn delete(&self, id: Uuid, owner_subject: &str) -> AppResult<bool> {
        let mut filters = self.filters.lock().await;
        let owned = filters
            .get(&id)
            .is_some_and(|saved| saved.owner_subject().as_str() == owner_subject);
        if owned {
            filters.remove(&id);
        }
        Ok(owned)
    }
}
