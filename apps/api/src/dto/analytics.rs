use chrono::NaiveDate;
use dmarq_application::{DomainHealth, ThreatSource, TrendPoint};
use serde::Serialize;

/// API representation of one trend bucket.
#[derive(Debug, Serialize)]
pub struct TrendPointResponse {
    pub bucket: NaiveDate,
    pub total_volume: i64,
    pub passing_volume: i64,
    pub failure_volume: i64,
}

impl From<TrendPoint> for TrendPointResponse {
    fn from(value: TrendPoint) -> Self {
        Self {
            bucket: value.bucket,
            total_volume: value.total_volume,
            passing_volume: value.passing_volume,
            failure_volume: value.failure_volume,
        }
    }
}

/// API representation of one domain health score.
#[derive(Debug, Serialize)]
pub struct DomainHealthResponse {
    pub domain: String,
    pub total_volume: i64,
    pub pass_rate: f64,
    pub level: String,
}

impl From<DomainHealth> for DomainHealthResponse {
    fn from(value: DomainHealth) -> Self {
        Self {
            domain: value.domain_name,
            total_volume: value.total_volume,
            pass_rate: value.pass_rate,
            level: value.level.as_str().to_owned(),
        }
    }
}

/// API representation of one ranked threat source.
#[derive(Debug, Serialize)]
pub struct ThreatSourceResponse {
    pub source_ip: String,
    pub threat_volume: i64,
    pub total_volume: i64,
    pub threat_rate: f64,
}

impl From<ThreatSource> for ThreatSourceResponse {
    fn from(value: ThreatSource) -> Self {
        Self {
            source_ip: value.source_ip,
            threat_volume: value.threat_volume,
            total_volume: value.total_volume,
            threat_rate: value.threat_rate,
        }
    }
}
