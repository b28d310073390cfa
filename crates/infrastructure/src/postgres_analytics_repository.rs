use async_trait::async_trait;
use chrono::NaiveDate;
use dmarq_application::{
    AnalyticsRepository, DateRange, DomainConstraint, DomainVolumeStat, ThreatSourceRow,
    TrendPoint, VolumeTotals,
};
use dmarq_core::AppResult;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::postgres_report_repository::query::{
    TOTAL_VOLUME_EXPR, push_domain_constraint, push_failure_volume,
};
use crate::postgres_report_repository::with_retry;

const THREAT_VOLUME_EXPR: &str = "COALESCE(SUM(records.message_count) \
     FILTER (WHERE records.disposition IN ('quarantine', 'reject')), 0)::BIGINT";

/// PostgreSQL-backed store for scoped trend, health, and threat aggregates.
///
/// The domain constraint is rendered by the same fragment builder as the
/// report path, applied here against `reports.domain_id`.
#[derive(Clone)]
pub struct PostgresAnalyticsRepository {
    pool: PgPool,
}

impl PostgresAnalyticsRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_trend_query(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> Result<Vec<TrendRow>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT date_trunc('day', reports.received_at)::date AS bucket, ",
        );
        builder.push(TOTAL_VOLUME_EXPR);
        builder.push(" AS total_volume, ");
        push_failure_volume(&mut builder);
        builder.push(" AS failure_volume");
        push_record_source(&mut builder, constraint, range);
        builder.push(" GROUP BY 1 ORDER BY 1");

        builder.build_query_as::<TrendRow>().fetch_all(&self.pool).await
    }

    async fn run_domain_stats_query(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> Result<Vec<DomainStatRow>, sqlx::Error> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT domains.name AS domain_name, ");
        builder.push(TOTAL_VOLUME_EXPR);
        builder.push(" AS total_volume, ");
        push_failure_volume(&mut builder);
        builder.push(" AS failure_volume");
        builder.push(
            " FROM aggregate_reports reports \
             INNER JOIN domains ON domains.id = reports.domain_id \
             LEFT JOIN aggregate_records records ON records.report_id = reports.id \
             WHERE reports.received_at >= ",
        );
        builder.push_bind(range.from);
        builder.push(" AND reports.received_at <= ");
        builder.push_bind(range.to);
        push_domain_constraint(&mut builder, "reports.domain_id", constraint);
        builder.push(" GROUP BY domains.id ORDER BY domains.name");

        builder
            .build_query_as::<DomainStatRow>()
            .fetch_all(&self.pool)
            .await
    }

    async fn run_threat_query(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
        limit: i64,
    ) -> Result<Vec<ThreatRow>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT records.source_ip, ");
        builder.push(TOTAL_VOLUME_EXPR);
        builder.push(" AS total_volume, ");
        builder.push(THREAT_VOLUME_EXPR);
        builder.push(" AS threat_volume");
        push_record_source(&mut builder, constraint, range);
        builder.push(" GROUP BY records.source_ip HAVING ");
        builder.push(THREAT_VOLUME_EXPR);
        builder.push(" > 0 ORDER BY ");
        builder.push(THREAT_VOLUME_EXPR);
        builder.push(" DESC LIMIT ");
        builder.push_bind(limit);

        builder.build_query_as::<ThreatRow>().fetch_all(&self.pool).await
    }

    async fn run_totals_query(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> Result<TotalsRow, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(TOTAL_VOLUME_EXPR);
        builder.push(" AS total_volume, ");
        push_failure_volume(&mut builder);
        builder.push(" AS failure_volume");
        push_record_source(&mut builder, constraint, range);

        builder.build_query_as::<TotalsRow>().fetch_one(&self.pool).await
    }
}

fn push_record_source(
    builder: &mut QueryBuilder<'_, Postgres>,
    constraint: &DomainConstraint,
    range: &DateRange,
) {
    builder.push(
        " FROM aggregate_reports reports \
         INNER JOIN aggregate_records records ON records.report_id = reports.id \
         WHERE reports.received_at >= ",
    );
    builder.push_bind(range.from);
    builder.push(" AND reports.received_at <= ");
    builder.push_bind(range.to);
    push_domain_constraint(builder, "reports.domain_id", constraint);
}

#[derive(Debug, FromRow)]
struct TrendRow {
    bucket: NaiveDate,
    total_volume: i64,
    failure_volume: i64,
}

#[derive(Debug, FromRow)]
struct DomainStatRow {
    domain_name: String,
    total_volume: i64,
    failure_volume: i64,
}

#[derive(Debug, FromRow)]
struct ThreatRow {
    source_ip: String,
    total_volume: i64,
    threat_volume: i64,
}

#[derive(Debug, FromRow)]
struct TotalsRow {
    total_volume: i64,
    failure_volume: i64,
}

#[async_trait]
impl AnalyticsRepository for PostgresAnalyticsRepository {
    async fn volume_trend(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> AppResult<Vec<TrendPoint>> {
        let rows = with_retry("failed to load volume trend", || {
            self.run_trend_query(constraint, range)
        })
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TrendPoint {
                bucket: row.bucket,
                total_volume: row.total_volume,
                passing_volume: row.total_volume - row.failure_volume,
                failure_volume: row.failure_volume,
            })
            .collect())
    }

    async fn domain_volume_stats(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> AppResult<Vec<DomainVolumeStat>> {
        let rows = with_retry("failed to load domain volume stats", || {
            self.run_domain_stats_query(constraint, range)
        })
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DomainVolumeStat {
                domain_name: row.domain_name,
                total_volume: row.total_volume,
                passing_volume: row.total_volume - row.failure_volume,
            })
            .collect())
    }

    async fn threat_sources(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
        limit: i64,
    ) -> AppResult<Vec<ThreatSourceRow>> {
        let rows = with_retry("failed to load threat sources", || {
            self.run_threat_query(constraint, range, limit)
        })
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ThreatSourceRow {
                source_ip: row.source_ip,
                total_volume: row.total_volume,
                threat_volume: row.threat_volume,
            })
            .collect())
    }

    async fn volume_totals(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> AppResult<VolumeTotals> {
        let totals = with_retry("failed to load volume totals", || {
            self.run_totals_query(constraint, range)
        })
        .await?;

        Ok(VolumeTotals {
            total_volume: totals.total_volume,
            failure_volume: totals.failure_volume,
        })
    }
}

#[cfg(test)]
mod tests {
    use dmarq_application::{AnalyticsRepository, DateRange, DomainConstraint};
    use dmarq_core::DomainId;
    use sqlx::PgPool;
    use sqlx::migrate::Migrator;
    use sqlx::postgres::PgPoolOptions;

    use super::PostgresAnalyticsRepository;

    static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

    async fn test_pool() -> Option<PgPool> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            return None;
        };

        let pool = match PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url.as_str())
            .await
        {
            Ok(pool) => pool,
            Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
        };

        if let Err(error) = MIGRATOR.run(&pool).await {
            panic!("failed to run migrations for postgres analytics tests: {error}");
        }

        Some(pool)
    }

    async fn seed(pool: &PgPool) {
        let statements = [
            "INSERT INTO domains (id, name, enforcement_level, ownership_contact)
             VALUES (9101, 'dmarq-trend-a.example', 'none', NULL),
                    (9102, 'dmarq-trend-b.example', 'reject', NULL)
             ON CONFLICT (id) DO NOTHING",
            "INSERT INTO aggregate_reports
                 (id, domain_id, org_name, reporter_email, external_report_id,
                  range_begin, range_end, received_at, is_processed)
             VALUES
                 (8101, 9101, 'org-a', NULL, 'trend-a-1',
                  '2024-04-01T00:00:00Z', '2024-04-01T23:59:59Z', '2024-04-02T04:00:00Z', TRUE),
                 (8102, 9102, 'org-b', NULL, 'trend-b-1',
                  '2024-04-01T00:00:00Z', '2024-04-01T23:59:59Z', '2024-04-02T05:00:00Z', TRUE)
             ON CONFLICT (id) DO NOTHING",
            "INSERT INTO aggregate_records
                 (id, report_id, source_ip, message_count, disposition,
                  dkim_result, spf_result, header_from, envelope_from, envelope_to)
             VALUES
                 (7101, 8101, '198.51.100.21', 30, 'none', 'pass', 'pass', NULL, NULL, NULL),
                 (7102, 8101, '198.51.100.22', 10, 'reject', 'fail', 'fail', NULL, NULL, NULL),
                 (7103, 8102, '198.51.100.22', 40, 'quarantine', 'fail', 'pass', NULL, NULL, NULL)
             ON CONFLICT (id) DO NOTHING",
        ];

        for statement in statements {
            let inserted = sqlx::query(statement).execute(pool).await;
            assert!(inserted.is_ok(), "seed statement failed: {inserted:?}");
        }
    }

    fn april() -> Option<DateRange> {
        let from = "2024-04-01T00:00:00Z".parse().ok()?;
        let to = "2024-04-30T23:59:59Z".parse().ok()?;
        DateRange::new(from, to).ok()
    }

    #[tokio::test]
    async fn totals_honor_the_domain_constraint() {
        let Some(pool) = test_pool().await else {
            return;
        };
        seed(&pool).await;
        let Some(range) = april() else {
            return;
        };

        let repository = PostgresAnalyticsRepository::new(pool);
        let constraint = DomainConstraint::DomainIds(vec![DomainId::new(9101)]);

        let totals = repository.volume_totals(&constraint, &range).await;
        assert!(totals.is_ok_and(|t| t.total_volume == 40 && t.failure_volume == 10));
    }

    #[tokio::test]
    async fn threat_sources_exclude_compliant_senders() {
        let Some(pool) = test_pool().await else {
            return;
        };
        seed(&pool).await;
        let Some(range) = april() else {
            return;
        };

        let repository = PostgresAnalyticsRepository::new(pool);
        let constraint =
            DomainConstraint::DomainIds(vec![DomainId::new(9101), DomainId::new(9102)]);

        let rows = repository.threat_sources(&constraint, &range, 10).await;
        assert!(rows.is_ok_and(|rows| {
            rows.len() == 1
                && rows.first().is_some_and(|row| {
                    row.source_ip == "198.51.100.22" && row.threat_volume == 50
                })
        }));
    }
}
