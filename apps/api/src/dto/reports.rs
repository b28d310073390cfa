use chrono::{DateTime, Utc};
use dmarq_application::{ReportPage, ReportRow};
use serde::Serialize;

/// API representation of one aggregated report row.
#[derive(Debug, Serialize)]
pub struct ReportRowResponse {
    pub domain: String,
    pub org_name: String,
    pub report_id: String,
    pub range_begin: DateTime<Utc>,
    pub range_end: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub record_count: i64,
    pub total_volume: i64,
    pub none_volume: i64,
    pub quarantine_volume: i64,
    pub reject_volume: i64,
    pub dkim_pass_volume: i64,
    pub spf_pass_volume: i64,
    pub failure_volume: i64,
}

impl From<ReportRow> for ReportRowResponse {
    fn from(value: ReportRow) -> Self {
        Self {
            domain: value.domain_name,
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

/// Pagination metadata returned alongside every page.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub total_pages: u32,
    pub total_count: u64,
    pub per_page: Option<u32>,
}

/// API representation of one report page.
#[derive(Debug, Serialize)]
pub struct ReportPageResponse {
    pub rows: Vec<ReportRowResponse>,
    pub pagination: PaginationMeta,
}

impl From<ReportPage> for ReportPageResponse {
    fn from(value: ReportPage) -> Self {
        Self {
            pagination: PaginationMeta {
                page: value.page,
                total_pages: value.total_pages,
                total_count: value.total_count,
                per_page: value.per_page,
            },
            rows: value.rows.into_iter().map(ReportRowResponse::from).collect(),
        }
    }
}
