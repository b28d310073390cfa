use std::str::FromStr;

use dmarq_core::{AppError, AppResult, DomainId, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metric an alert rule evaluates against the scoped report store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    /// Summed message volume over the evaluation window.
    TotalVolume,
    /// Summed non-compliant message volume over the window.
    FailureVolume,
    /// Failure volume divided by total volume (0 when there is no mail).
    FailureRate,
}

impl AlertMetric {
    /// Returns a stable storage value for this metric.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalVolume => "total_volume",
            Self::FailureVolume => "failure_volume",
            Self::FailureRate => "failure_rate",
        }
    }
}

impl FromStr for AlertMetric {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "total_volume" => Ok(Self::TotalVolume),
            "failure_volume" => Ok(Self::FailureVolume),
            "failure_rate" => Ok(Self::FailureRate),
            _ => Err(AppError::Validation(format!(
                "unknown alert metric '{value}'"
            ))),
        }
    }
}

/// Direction of the threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertComparison {
    /// Breach when the metric exceeds the threshold.
    Above,
    /// Breach when the metric drops below the threshold.
    Below,
}

impl AlertComparison {
    /// Returns a stable storage value for this comparison.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

impl FromStr for AlertComparison {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "above" => Ok(Self::Above),
            "below" => Ok(Self::Below),
            _ => Err(AppError::Validation(format!(
                "unknown alert comparison '{value}'"
            ))),
        }
    }
}

/// A user-owned alert rule evaluated on a schedule.
///
/// Evaluation runs as the owner, so a rule can never observe data outside the
/// owner's authorization scope. Notification fan-out is a separate
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    id: Uuid,
    owner_subject: NonEmptyString,
    name: NonEmptyString,
    domain_id: Option<DomainId>,
    metric: AlertMetric,
    comparison: AlertComparison,
    threshold: f64,
    window_hours: u32,
    is_enabled: bool,
}

impl AlertRule {
    /// Creates a validated alert rule.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        owner_subject: impl Into<String>,
        name: impl Into<String>,
        domain_id: Option<DomainId>,
        metric: AlertMetric,
        comparison: AlertComparison,
        threshold: f64,
        window_hours: u32,
        is_enabled: bool,
    ) -> AppResult<Self> {
        if window_hours == 0 {
            return Err(AppError::Validation(
                "alert evaluation window must be at least one hour".to_owned(),
            ));
        }
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(AppError::Validation(
                "alert threshold must be a non-negative number".to_owned(),
            ));
        }

        Ok(Self {
            id,
            owner_subject: NonEmptyString::new(owner_subject)?,
            name: NonEmptyString::new(name)?,
            domain_id,
            metric,
            comparison,
            threshold,
            window_hours,
            is_enabled,
        })
    }

    /// Returns the stable identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the owning subject.
    #[must_use]
    pub fn owner_subject(&self) -> &NonEmptyString {
        &self.owner_subject
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the optional single-domain scope.
    #[must_use]
    pub fn domain_id(&self) -> Option<DomainId> {
        self.domain_id
    }

    /// Returns the evaluated metric.
    #[must_use]
    pub fn metric(&self) -> AlertMetric {
        self.metric
    }

    /// Returns the threshold comparison direction.
    #[must_use]
    pub fn comparison(&self) -> AlertComparison {
        self.comparison
    }

    /// Returns the threshold value.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns the evaluation window in hours.
    #[must_use]
    pub fn window_hours(&self) -> u32 {
        self.window_hours
    }

    /// Returns whether the rule is currently evaluated.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    /// Returns whether a metric value breaches this rule's threshold.
    #[must_use]
    pub fn is_breached_by(&self, value: f64) -> bool {
        match self.comparison {
            AlertComparison::Above => value > self.threshold,
            AlertComparison::Below => value < self.threshold,
        }
    }
}
