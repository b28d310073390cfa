use async_trait::async_trait;
use dmarq_application::SavedFilterRepository;
use dmarq_core::{AppError, AppResult};
use dmarq_domain::{ReportFilter, SavedFilter};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed repository for saved filters.
///
/// The filter itself is stored as an opaque JSONB blob; the service layer
/// re-normalizes it on load.
#[derive(Clone)]
pub struct PostgresSavedFilterRepository {
    pool: PgPool,
}

impl PostgresSavedFilterRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SavedFilterRow {
    id: Uuid,
    owner_subject: String,
    name: String,
    filter: Value,
}

fn saved_filter_from_row(row: SavedFilterRow) -> AppResult<SavedFilter> {
    let filter = serde_json::from_value::<ReportFilter>(row.filter).map_err(|error| {
        AppError::Internal(format!(
            "failed to decode saved filter '{}': {error}",
            row.id
        ))
    })?;

    SavedFilter::new(row.id, row.owner_subject, row.name, filter)
}

#[async_trait]
impl SavedFilterRepository for PostgresSavedFilterRepository {
    async fn save(&self, saved_filter: SavedFilter) -> AppResult<()> {
        let filter = serde_json::to_value(saved_filter.filter()).map_err(|error| {
            AppError::Internal(format!("failed to encode saved filter: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO saved_filters (id, owner_subject, name, filter)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = $3, filter = $4
            "#,
        )
        .bind(saved_filter.id())
        .bind(saved_filter.owner_subject().as_str())
        .bind(saved_filter.name().as_str())
        .bind(filter)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save filter: {error}")))?;

        Ok(())
    }

    async fn list_for_owner(&self, owner_subject: &str) -> AppResult<Vec<SavedFilter>> {
        let rows = sqlx::query_as::<_, SavedFilterRow>(
            r#"
            SELECT id, owner_subject, name, filter
            FROM saved_filters
            WHERE owner_subject = $1
            ORDER BY name
            "#,
        )
        .bind(owner_subject)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list saved filters: {error}")))?;

        rows.into_iter().map(saved_filter_from_row).collect()
    }

    async fn find(&self, id: Uuid, owner_subject: &str) -> AppResult<Option<SavedFilter>> {
        let row = sqlx::query_as::<_, SavedFilterRow>(
            r#"
            SELECT id, owner_subject, name, filter
            FROM saved_filters
            WHERE id = $1 AND owner_subject = $2
            "#,
        )
        .bind(id)
        .bind(owner_subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load saved filter: {error}")))?;

        row.map(saved_filter_from_row).transpose()
    }

    async fn delete(&self, id: Uuid, owner_subject: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM saved_filters
            WHERE id = $1 AND owner_subject = $2
            "#,
        )
        .bind(id)
        .bind(owner_subject)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete saved filter: {error}")))?;

        Ok(result.rows_affected() > 0)
    }
}
