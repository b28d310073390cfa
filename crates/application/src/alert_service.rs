use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dmarq_core::AppResult;
use dmarq_domain::AlertRule;

use crate::analytics_service::{AnalyticsService, DateRange};
use crate::user_service::UserService;

/// Repository port for alert-rule lookups.
#[async_trait]
pub trait AlertRuleRepository: Send + Sync {
    /// Lists every enabled alert rule.
    async fn list_enabled(&self) -> AppResult<Vec<AlertRule>>;
}

/// Outcome of evaluating one alert rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvaluation {
    /// The evaluated rule.
    pub rule: AlertRule,
    /// Metric value, absent when the owner's scope no longer covers the rule.
    pub value: Option<f64>,
    /// Whether the value breaches the rule's threshold.
    pub breached: bool,
}

/// Scheduled evaluation of alert rules through the scoped analytics engine.
///
/// Each rule runs as its owner, so evaluation can never observe data outside
/// the owner's current authorization scope. Notification delivery is a
/// separate collaborator consuming the evaluations.
#[derive(Clone)]
pub struct AlertService {
    rules: Arc<dyn AlertRuleRepository>,
    users: UserService,
    analytics: AnalyticsService,
}

impl AlertService {
    /// Creates a service from its collaborators.
    #[must_use]
    pub fn new(
        rules: Arc<dyn AlertRuleRepository>,
        users: UserService,
        analytics: AnalyticsService,
    ) -> Self {
        Self {
            rules,
            users,
            analytics,
        }
    }

    /// Evaluates every enabled rule against its trailing window ending `now`.
    ///
    /// Rules whose owner account no longer exists are skipped; a rule whose
    /// owner lost access to the rule's domain evaluates to an absent value
    /// rather than leaking data.
    pub async fn evaluate_enabled_rules(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<AlertEvaluation>> {
        let rules = self.rules.list_enabled().await?;
        let mut evaluations = Vec::with_capacity(rules.len());

        for rule in rules {
            let Some(owner) = self
                .users
                .principal_for_subject(rule.owner_subject().as_str())
                .await?
            else {
                continue;
            };

            let range = DateRange::new(
                now - Duration::hours(i64::from(rule.window_hours())),
                now,
            )?;
            let value = self
                .analytics
                .metric_value(&owner, rule.metric(), rule.domain_id(), &range)
                .await?;

            let breached = value.is_some_and(|value| rule.is_breached_by(value));
            evaluations.push(AlertEvaluation {
                rule,
                value,
                breached,
            });
        }

        Ok(evaluations)
    }
}
