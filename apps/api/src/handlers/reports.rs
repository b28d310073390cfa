use axum::Json;
use axum::extract::{Extension, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use dmarq_application::ReportRow;
use dmarq_core::{AppError, AppResult, Principal};
use dmarq_domain::ReportFilter;
use serde_json::{Map, Value};

use crate::dto::ReportPageResponse;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn query_reports_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<Map<String, Value>>,
) -> ApiResult<Json<ReportPageResponse>> {
    let filter = ReportFilter::normalize(&payload);
    let page = state.report_service.fetch_page(&principal, &filter).await?;

    Ok(Json(ReportPageResponse::from(page)))
}

pub async fn export_reports_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<Map<String, Value>>,
) -> ApiResult<Response> {
    let filter = ReportFilter::normalize(&payload);
    let rows = state.report_service.export_rows(&principal, &filter).await?;
    let body = render_csv(&rows)?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
        (
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"dmarc-reports.csv\"",
        ),
    ];

    Ok((headers, body).into_response())
}

fn render_csv(rows: &[ReportRow]) -> AppResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "domain",
            "org_name",
            "report_id",
            "range_begin",
            "range_end",
            "received_at",
            "record_count",
            "total_volume",
            "none_volume",
            "quarantine_volume",
            "reject_volume",
            "dkim_pass_volume",
            "spf_pass_volume",
            "failure_volume",
        ])
        .map_err(csv_error)?;

    for row in rows {
        writer
            .write_record([
                row.domain_name.clone(),
                row.org_name.clone(),
                row.report_id.clone(),
                row.range_begin.to_rfc3339(),
                row.range_end.to_rfc3339(),
                row.received_at.to_rfc3339(),
                row.record_count.to_string(),
                row.total_volume.to_string(),
                row.none_volume.to_string(),
                row.quarantine_volume.to_string(),
                row.reject_volume.to_string(),
                row.dkim_pass_volume.to_string(),
                row.spf_pass_volume.to_string(),
                row.failure_volume.to_string(),
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| AppError::Internal(format!("failed to finish export: {error}")))?;

    String::from_utf8(bytes)
        .map_err(|error| AppError::Internal(format!("export produced invalid UTF-8: {error}")))
}

fn csv_error(error: csv::Error) -> AppError {
    AppError::Internal(format!("failed to render export row: {error}"))
}
