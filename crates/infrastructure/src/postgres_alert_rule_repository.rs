use std::str::FromStr;

use async_trait::async_trait;
use dmarq_application::AlertRuleRepository;
use dmarq_core::{AppError, AppResult, DomainId};
use dmarq_domain::{AlertComparison, AlertMetric, AlertRule};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed repository for alert rules.
#[derive(Clone)]
pub struct PostgresAlertRuleRepository {
    pool: PgPool,
}

impl PostgresAlertRuleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AlertRuleRow {
    id: Uuid,
    owner_subject: String,
    name: String,
    domain_id: Option<i64>,
    metric: String,
    comparison: String,
    threshold: f64,
    window_hours: i32,
    is_enabled: bool,
}

fn rule_from_row(row: AlertRuleRow) -> AppResult<AlertRule> {
    let metric = AlertMetric::from_str(row.metric.as_str()).map_err(|error| {
        AppError::Internal(format!("failed to decode alert rule '{}': {error}", row.id))
    })?;
    let comparison = AlertComparison::from_str(row.comparison.as_str()).map_err(|error| {
        AppError::Internal(format!("failed to decode alert rule '{}': {error}", row.id))
    })?;
    let window_hours = u32::try_from(row.window_hours).map_err(|error| {
        AppError::Internal(format!(
            "invalid window for alert rule '{}': {error}",
            row.id
        ))
    })?;

    AlertRule::new(
        row.id,
        row.owner_subject,
        row.name,
        row.domain_id.map(DomainId::new),
        metric,
        comparison,
        row.threshold,
        window_hours,
        row.is_enabled,
    )
}

#[async_trait]
impl AlertRuleRepository for PostgresAlertRuleRepository {
    async fn list_enabled(&self) -> AppResult<Vec<AlertRule>> {
        let rows = sqlx::query_as::<_, AlertRuleRow>(
            r#"
            SELECT id, owner_subject, name, domain_id, metric, comparison,
                   threshold, window_hours, is_enabled
            FROM alert_rules
            WHERE is_enabled = TRUE
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list alert rules: {error}")))?;

        rows.into_iter().map(rule_from_row).collect()
    }
}
