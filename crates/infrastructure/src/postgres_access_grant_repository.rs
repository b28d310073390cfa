use async_trait::async_trait;
use dmarq_application::{AccessGrantRepository, AccessibleDomain};
use dmarq_core::{AppResult, DomainId, GroupId};
use sqlx::{FromRow, PgPool};

use crate::postgres_report_repository::with_retry;

/// PostgreSQL-backed repository for access-grant lookups.
#[derive(Clone)]
pub struct PostgresAccessGrantRepository {
    pool: PgPool,
}

impl PostgresAccessGrantRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_accessible_domains_query(
        &self,
        subject: &str,
    ) -> Result<Vec<DomainRow>, sqlx::Error> {
        sqlx::query_as::<_, DomainRow>(
            r#"
            SELECT domains.id, domains.name
            FROM domains
            INNER JOIN user_domain_grants AS grants
                ON grants.domain_id = domains.id
            WHERE grants.user_subject = $1
            UNION
            SELECT domains.id, domains.name
            FROM domains
            INNER JOIN domain_group_members AS members
                ON members.domain_id = domains.id
            INNER JOIN user_group_grants AS grants
                ON grants.group_id = members.group_id
            WHERE grants.user_subject = $1
            ORDER BY id
            "#,
        )
        .bind(subject)
        .fetch_all(&self.pool)
        .await
    }

    async fn run_group_grant_query(
        &self,
        subject: &str,
        group_id: GroupId,
    ) -> Result<bool, sqlx::Error> {
        let (granted,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_group_grants
                WHERE user_subject = $1 AND group_id = $2
            )
            "#,
        )
        .bind(subject)
        .bind(group_id.as_i64())
        .fetch_one(&self.pool)
        .await?;

        Ok(granted)
    }
}

#[derive(Debug, FromRow)]
struct DomainRow {
    id: i64,
    name: String,
}

#[async_trait]
impl AccessGrantRepository for PostgresAccessGrantRepository {
    async fn list_accessible_domains(&self, subject: &str) -> AppResult<Vec<AccessibleDomain>> {
        let rows = with_retry("failed to load accessible domains", || {
            self.run_accessible_domains_query(subject)
        })
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AccessibleDomain {
                id: DomainId::new(row.id),
                name: row.name,
            })
            .collect())
    }

    async fn is_group_granted(&self, subject: &str, group_id: GroupId) -> AppResult<bool> {
        with_retry("failed to check group grant", || {
            self.run_group_grant_query(subject, group_id)
        })
        .await
    }
}
