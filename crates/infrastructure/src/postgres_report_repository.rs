use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dmarq_application::{ReportQueryExecutor, ReportRow, ReportSelection};
use dmarq_core::{AppError, AppResult};
use sqlx::{FromRow, PgPool};
use tracing::warn;

pub(crate) mod query;

#[cfg(test)]
mod tests;

/// PostgreSQL-backed executor for compiled report selections.
///
/// Runs the page query and the count query rendered by [`query`], with one
/// transparent retry when a lost connection is detected; the pool
/// re-establishes the connection underneath.
#[derive(Clone)]
pub struct PostgresReportRepository {
    pool: PgPool,
}

impl PostgresReportRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_page_query(
        &self,
        selection: &ReportSelection,
    ) -> Result<Vec<ReportRowRecord>, sqlx::Error> {
        let mut builder = query::build_page_query(selection);
        builder
            .build_query_as::<ReportRowRecord>()
            .fetch_all(&self.pool)
            .await
    }

    async fn run_count_query(&self, selection: &ReportSelection) -> Result<i64, sqlx::Error> {
        let mut builder = query::build_count_query(selection);
        let (total,): (i64,) = builder.build_query_as().fetch_one(&self.pool).await?;
        Ok(total)
    }
}

#[derive(Debug, FromRow)]
struct ReportRowRecord {
    domain_name: String,
    org_name: String,
    report_id: String,
    range_begin: DateTime<Utc>,
    range_end: DateTime<Utc>,
    received_at: DateTime<Utc>,
    record_count: i64,
    total_volume: i64,
    none_volume: i64,
    quarantine_volume: i64,
    reject_volume: i64,
    dkim_pass_volume: i64,
    spf_pass_volume: i64,
    failure_volume: i64,
}

impl From<ReportRowRecord> for ReportRow {
    fn from(value: ReportRowRecord) -> Self {
        Self {
            domain_name: value.domain_name,
            org_name: value.org_name,
            report_id: value.report_id,
            range_begin: value.range_begin,
            range_end: value.range_end,
            received_at: value.received_at,
            record_count: value.record_count,
            total_volume: value.total_volume,
            none_volume: value.none_volume,
            quarantine_volume: value.quarantine_volume,
            reject_volume: value.reject_volume,
            dkim_pass_volume: value.dkim_pass_volume,
            spf_pass_volume: value.spf_pass_volume,
            failure_volume: value.failure_volume,
        }
    }
}

fn is_connection_loss(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

/// Runs a read query, retrying exactly once on a detected lost connection.
///
/// Any other failure, and a failure of the retry itself, propagates as a
/// fault; it is never silently swallowed.
pub(crate) async fn with_retry<T, Fut>(
    context: &'static str,
    mut attempt: impl FnMut() -> Fut,
) -> AppResult<T>
where
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    match attempt().await {
        Ok(value) => Ok(value),
        Err(error) if is_connection_loss(&error) => {
            warn!(error = %error, context, "query lost its connection, retrying once");
            attempt()
                .await
                .map_err(|error| AppError::Internal(format!("{context}: {error}")))
        }
        Err(error) => Err(AppError::Internal(format!("{context}: {error}"))),
    }
}

#[async_trait]
impl ReportQueryExecutor for PostgresReportRepository {
    async fn fetch_rows(&self, selection: &ReportSelection) -> AppResult<Vec<ReportRow>> {
        let rows = with_retry("failed to query aggregate report page", || {
            self.run_page_query(selection)
        })
        .await?;

        Ok(rows.into_iter().map(ReportRow::from).collect())
    }

    async fn count_reports(&self, selection: &ReportSelection) -> AppResult<u64> {
        let total = with_retry("failed to count aggregate reports", || {
            self.run_count_query(selection)
        })
        .await?;

        Ok(u64::try_from(total).unwrap_or_default())
    }
}
