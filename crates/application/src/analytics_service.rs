use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dmarq_core::{AppError, AppResult, DomainId, Principal};
use dmarq_domain::{AlertMetric, Permission};

use crate::access_policy::AccessPolicy;
use crate::report_query::DomainConstraint;

/// Closed UTC time range for analytics queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    /// Inclusive range start.
    pub from: DateTime<Utc>,
    /// Inclusive range end.
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Creates a validated range.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> AppResult<Self> {
        if to < from {
            return Err(AppError::Validation(
                "range end must not precede range start".to_owned(),
            ));
        }

        Ok(Self { from, to })
    }
}

/// One day-bucketed point in a volume trend series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendPoint {
    /// Bucket day.
    pub bucket: NaiveDate,
    /// Summed message volume received that day.
    pub total_volume: i64,
    /// Compliant share of the volume.
    pub passing_volume: i64,
    /// Non-compliant share of the volume.
    pub failure_volume: i64,
}

/// Per-domain volume aggregate used for health scoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainVolumeStat {
    /// Monitored domain name.
    pub domain_name: String,
    /// Summed message volume over the range.
    pub total_volume: i64,
    /// Compliant share of the volume.
    pub passing_volume: i64,
}

/// Health category derived from a domain's pass rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLevel {
    /// Pass rate at or above 95 percent.
    Excellent,
    /// Pass rate at or above 85 percent.
    Good,
    /// Pass rate at or above 70 percent.
    NeedsAttention,
    /// Anything below 70 percent.
    Critical,
}

impl HealthLevel {
    /// Categorizes a pass-rate percentage.
    ///
    /// The threshold table is a design constant, not user-configurable.
    #[must_use]
    pub fn from_pass_rate(percentage: f64) -> Self {
        if percentage >= 95.0 {
            Self::Excellent
        } else if percentage >= 85.0 {
            Self::Good
        } else if percentage >= 70.0 {
            Self::NeedsAttention
        } else {
            Self::Critical
        }
    }

    /// Returns a stable transport value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::NeedsAttention => "needs_attention",
            Self::Critical => "critical",
        }
    }
}

/// Health score for one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainHealth {
    /// Monitored domain name.
    pub domain_name: String,
    /// Summed message volume over the range.
    pub total_volume: i64,
    /// Pass rate percentage (0 when the domain saw no mail).
    pub pass_rate: f64,
    /// Categorized level.
    pub level: HealthLevel,
}

/// Per-source-IP aggregate as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatSourceRow {
    /// Sending IP address.
    pub source_ip: String,
    /// Summed message volume from this source.
    pub total_volume: i64,
    /// Quarantined-plus-rejected volume from this source.
    pub threat_volume: i64,
}

/// Ranked threat entry returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatSource {
    /// Sending IP address.
    pub source_ip: String,
    /// Quarantined-plus-rejected volume from this source.
    pub threat_volume: i64,
    /// Summed message volume from this source.
    pub total_volume: i64,
    /// Threat volume divided by total volume.
    pub threat_rate: f64,
}

/// Scoped volume totals used for alert-metric evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeTotals {
    /// Summed message volume.
    pub total_volume: i64,
    /// Non-compliant share of the volume.
    pub failure_volume: i64,
}

/// Store port for time-bucketed and grouped aggregates.
///
/// Every method takes the shared [`DomainConstraint`] so analytics can never
/// diverge from the report path's authorization fragment.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Day-bucketed volume series over the range.
    async fn volume_trend(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> AppResult<Vec<TrendPoint>>;

    /// Per-domain volume aggregates over the range.
    async fn domain_volume_stats(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> AppResult<Vec<DomainVolumeStat>>;

    /// Per-source-IP aggregates over the range, bounded by `limit`.
    async fn threat_sources(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
        limit: i64,
    ) -> AppResult<Vec<ThreatSourceRow>>;

    /// Scoped volume totals over the range.
    async fn volume_totals(
        &self,
        constraint: &DomainConstraint,
        range: &DateRange,
    ) -> AppResult<VolumeTotals>;
}

/// Application service for scoped trend, health, and threat analytics.
#[derive(Clone)]
pub struct AnalyticsService {
    access_policy: AccessPolicy,
    repository: Arc<dyn AnalyticsRepository>,
}

impl AnalyticsService {
    /// Creates a service from an access policy and a store adapter.
    #[must_use]
    pub fn new(access_policy: AccessPolicy, repository: Arc<dyn AnalyticsRepository>) -> Self {
        Self {
            access_policy,
            repository,
        }
    }

    /// Returns the day-bucketed volume trend visible to the principal.
    pub async fn volume_trend(
        &self,
        principal: &Principal,
        range: &DateRange,
    ) -> AppResult<Vec<TrendPoint>> {
        self.access_policy
            .require_permission(principal, Permission::AnalyticsView)?;
        let Some(constraint) = self.constraint_for(principal).await? else {
            return Ok(Vec::new());
        };

        self.repository.volume_trend(&constraint, range).await
    }

    /// Returns health scores for every domain visible to the principal.
    ///
    /// Sorted worst-first so dashboards surface problem domains immediately.
    pub async fn domain_health(
        &self,
        principal: &Principal,
        range: &DateRange,
    ) -> AppResult<Vec<DomainHealth>> {
        self.access_policy
            .require_permission(principal, Permission::AnalyticsView)?;
        let Some(constraint) = self.constraint_for(principal).await? else {
            return Ok(Vec::new());
        };

        let stats = self
            .repository
            .domain_volume_stats(&constraint, range)
            .await?;

        let mut health = stats.into_iter().map(score_domain).collect::<Vec<_>>();
        health.sort_by(|a, b| a.pass_rate.total_cmp(&b.pass_rate));
        Ok(health)
    }

    /// Returns the top threat sources visible to the principal.
    pub async fn top_threats(
        &self,
        principal: &Principal,
        range: &DateRange,
        limit: usize,
    ) -> AppResult<Vec<ThreatSource>> {
        self.access_policy
            .require_permission(principal, Permission::AnalyticsView)?;
        let Some(constraint) = self.constraint_for(principal).await? else {
            return Ok(Vec::new());
        };

        let rows = self
            .repository
            .threat_sources(&constraint, range, i64::try_from(limit).unwrap_or(i64::MAX))
            .await?;

        Ok(rank_threats(rows, limit))
    }

    /// Evaluates a raw metric over the range, optionally narrowed to one
    /// domain.
    ///
    /// Returns `None` when the principal's scope is empty or the requested
    /// domain falls outside it; used by alert evaluation, which runs with no
    /// HTTP session.
    pub async fn metric_value(
        &self,
        principal: &Principal,
        metric: AlertMetric,
        domain_id: Option<DomainId>,
        range: &DateRange,
    ) -> AppResult<Option<f64>> {
        self.access_policy
            .require_permission(principal, Permission::AnalyticsView)?;
        let scope = self.access_policy.accessible_domains(principal).await?;

        let constraint = match domain_id {
            Some(domain_id) if !scope.contains_id(domain_id) => return Ok(None),
            Some(domain_id) => DomainConstraint::DomainIds(vec![domain_id]),
            None => match DomainConstraint::from_scope(&scope) {
                Some(constraint) => constraint,
                None => return Ok(None),
            },
        };

        let totals = self.repository.volume_totals(&constraint, range).await?;
        Ok(Some(metric_from_totals(metric, totals)))
    }

    async fn constraint_for(&self, principal: &Principal) -> AppResult<Option<DomainConstraint>> {
        let scope = self.access_policy.accessible_domains(principal).await?;
        Ok(DomainConstraint::from_scope(&scope))
    }
}

fn score_domain(stat: DomainVolumeStat) -> DomainHealth {
    let pass_rate = if stat.total_volume > 0 {
        stat.passing_volume as f64 / stat.total_volume as f64 * 100.0
    } else {
        0.0
    };

    DomainHealth {
        domain_name: stat.domain_name,
        total_volume: stat.total_volume,
        pass_rate,
        level: HealthLevel::from_pass_rate(pass_rate),
    }
}

/// Ranks threat rows by threat volume, then threat rate, capped at `limit`.
fn rank_threats(rows: Vec<ThreatSourceRow>, limit: usize) -> Vec<ThreatSource> {
    let mut threats = rows
        .into_iter()
        .filter(|row| row.threat_volume > 0)
        .map(|row| {
            let threat_rate = if row.total_volume > 0 {
                row.threat_volume as f64 / row.total_volume as f64
            } else {
                0.0
            };
            ThreatSource {
                source_ip: row.source_ip,
                threat_volume: row.threat_volume,
                total_volume: row.total_volume,
                threat_rate,
            }
        })
        .collect::<Vec<_>>();

    threats.sort_by(|a, b| {
        b.threat_volume
            .cmp(&a.threat_volume)
            .then_with(|| b.threat_rate.total_cmp(&a.threat_rate))
    });
    threats.truncate(limit);
    threats
}

fn metric_from_totals(metric: AlertMetric, totals: VolumeTotals) -> f64 {
    match metric {
        AlertMetric::TotalVolume => totals.total_volume as f64,
        AlertMetric::FailureVolume => totals.failure_volume as f64,
        AlertMetric::FailureRate => {
            if totals.total_volume > 0 {
                totals.failure_volume as f64 / totals.total_volume as f64
            } else {
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use dmarq_core::{AppResult, DomainId, GroupId, Principal, Role};
    use dmarq_domain::AlertMetric;

    use crate::access_policy::{
        AccessGrantRepository, AccessPolicy, AccessibleDomain,
    };
    use crate::report_query::DomainConstraint;

    use super::{
        AnalyticsRepository, AnalyticsService, DateRange, DomainVolumeStat, HealthLevel,
        ThreatSourceRow, TrendPoint, VolumeTotals, rank_threats,
    };

    struct FakeGrants {
        domains: HashMap<String, Vec<AccessibleDomain>>,
    }

    #[async_trait]
    impl AccessGrantRepository for FakeGrants {
        async fn list_accessible_domains(
            &self,
            subject: &str,
        ) -> AppResult<Vec<AccessibleDomain>> {
            Ok(self.domains.get(subject).cloned().unwrap_or_default())
        }

        async fn is_group_granted(&self, _subject: &str, _group_id: GroupId) -> AppResult<bool> {
            Ok(false)
        }
    }

    struct FakeAnalyticsRepository {
        totals: VolumeTotals,
    }

    #[async_trait]
    impl AnalyticsRepository for FakeAnalyticsRepository {
        async fn volume_trend(
            &self,
            _constraint: &DomainConstraint,
            _range: &DateRange,
        ) -> AppResult<Vec<TrendPoint>> {
            Ok(Vec::new())
        }

        async fn domain_volume_stats(
            &self,
            _constraint: &DomainConstraint,
            _range: &DateRange,
        ) -> AppResult<Vec<DomainVolumeStat>> {
            Ok(Vec::new())
        }

        async fn threat_sources(
            &self,
            _constraint: &DomainConstraint,
            _range: &DateRange,
            _limit: i64,
        ) -> AppResult<Vec<ThreatSourceRow>> {
            Ok(Vec::new())
        }

        async fn volume_totals(
            &self,
            _constraint: &DomainConstraint,
            _range: &DateRange,
        ) -> AppResult<VolumeTotals> {
            Ok(self.totals)
        }
    }

    fn range() -> DateRange {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
        let to = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).single();
        match (from, to) {
            (Some(from), Some(to)) => DateRange { from, to },
            _ => unreachable!("static test range"),
        }
    }

    fn service(totals: VolumeTotals, grants: &[(&str, i64, &str)]) -> AnalyticsService {
        let mut map: HashMap<String, Vec<AccessibleDomain>> = HashMap::new();
        for (subject, id, name) in grants {
            map.entry((*subject).to_owned()).or_default().push(
                AccessibleDomain {
                    id: DomainId::new(*id),
                    name: (*name).to_owned(),
                },
            );
        }
        AnalyticsService::new(
            AccessPolicy::new(Arc::new(FakeGrants { domains: map })),
            Arc::new(FakeAnalyticsRepository { totals }),
        )
    }

    #[test]
    fn health_levels_follow_the_threshold_table() {
        assert_eq!(HealthLevel::from_pass_rate(100.0), HealthLevel::Excellent);
        assert_eq!(HealthLevel::from_pass_rate(95.0), HealthLevel::Excellent);
        assert_eq!(HealthLevel::from_pass_rate(94.9), HealthLevel::Good);
        assert_eq!(HealthLevel::from_pass_rate(85.0), HealthLevel::Good);
        assert_eq!(HealthLevel::from_pass_rate(84.9), HealthLevel::NeedsAttention);
        assert_eq!(HealthLevel::from_pass_rate(70.0), HealthLevel::NeedsAttention);
        assert_eq!(HealthLevel::from_pass_rate(69.9), HealthLevel::Critical);
        assert_eq!(HealthLevel::from_pass_rate(0.0), HealthLevel::Critical);
    }

    #[test]
    fn threats_rank_by_volume_then_rate_and_are_capped() {
        let rows = vec![
            ThreatSourceRow {
                source_ip: "198.51.100.1".to_owned(),
                total_volume: 1000,
                threat_volume: 50,
            },
            ThreatSourceRow {
                source_ip: "198.51.100.2".to_owned(),
                total_volume: 100,
                threat_volume: 50,
            },
            ThreatSourceRow {
                source_ip: "198.51.100.3".to_owned(),
                total_volume: 10,
                threat_volume: 9,
            },
            ThreatSourceRow {
                source_ip: "198.51.100.4".to_owned(),
                total_volume: 500,
                threat_volume: 0,
            },
        ];

        let ranked = rank_threats(rows, 2);
        let order = ranked
            .iter()
            .map(|threat| threat.source_ip.as_str())
            .collect::<Vec<_>>();
        // Equal volumes tie-break on rate; zero-threat sources never rank.
        assert_eq!(order, vec!["198.51.100.2", "198.51.100.1"]);
    }

    #[tokio::test]
    async fn empty_scope_yields_empty_series() {
        let service = service(
            VolumeTotals {
                total_volume: 10,
                failure_volume: 1,
            },
            &[],
        );
        let viewer = Principal::new("alice", "Alice", None, Role::Viewer);

        let trend = service.volume_trend(&viewer, &range()).await;
        assert!(trend.is_ok_and(|series| series.is_empty()));

        let value = service
            .metric_value(&viewer, AlertMetric::TotalVolume, None, &range())
            .await;
        assert_eq!(value.ok(), Some(None));
    }

    #[tokio::test]
    async fn metric_value_rejects_out_of_scope_domains() {
        let service = service(
            VolumeTotals {
                total_volume: 200,
                failure_volume: 50,
            },
            &[("alice", 1, "a.com")],
        );
        let viewer = Principal::new("alice", "Alice", None, Role::Viewer);

        let outside = service
            .metric_value(
                &viewer,
                AlertMetric::FailureVolume,
                Some(DomainId::new(9)),
                &range(),
            )
            .await;
        assert_eq!(outside.ok(), Some(None));

        let inside = service
            .metric_value(
                &viewer,
                AlertMetric::FailureRate,
                Some(DomainId::new(1)),
                &range(),
            )
            .await;
        assert_eq!(inside.ok(), Some(Some(0.25)));
    }
}
