use axum::Json;
use axum::extract::{Extension, Query, State};
use chrono::{Duration, Utc};
use dmarq_application::DateRange;
use dmarq_core::Principal;
use serde::Deserialize;

use crate::dto::{DomainHealthResponse, ThreatSourceResponse, TrendPointResponse};
use crate::error::ApiResult;
use crate::state::AppState;

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 365;
const DEFAULT_THREAT_LIMIT: usize = 10;
const MAX_THREAT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ThreatsQuery {
    pub days: Option<i64>,
    pub limit: Option<usize>,
}

fn trailing_range(days: Option<i64>) -> ApiResult<DateRange> {
    let days = days
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_WINDOW_DAYS)
        .min(MAX_WINDOW_DAYS);
    let to = Utc::now();

    Ok(DateRange::new(to - Duration::days(days), to)?)
}

pub async fn trend_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<Vec<TrendPointResponse>>> {
    let range = trailing_range(query.days)?;
    let series = state
        .analytics_service
        .volume_trend(&principal, &range)
        .await?
        .into_iter()
        .map(TrendPointResponse::from)
        .collect();

    Ok(Json(series))
}

pub async fn domain_health_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<Vec<DomainHealthResponse>>> {
    let range = trailing_range(query.days)?;
    let health = state
        .analytics_service
        .domain_health(&principal, &range)
        .await?
        .into_iter()
        .map(DomainHealthResponse::from)
        .collect();

    Ok(Json(health))
}

pub async fn top_threats_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ThreatsQuery>,
) -> ApiResult<Json<Vec<ThreatSourceResponse>>> {
    let range = trailing_range(query.days)?;
    let limit = query
        .limit
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_THREAT_LIMIT)
        .min(MAX_THREAT_LIMIT);

    let threats = state
        .analytics_service
        .top_threats(&principal, &range, limit)
        .await?
        .into_iter()
        .map(ThreatSourceResponse::from)
        .collect();

    Ok(Json(threats))
}
