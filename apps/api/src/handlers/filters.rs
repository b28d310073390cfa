use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use dmarq_core::Principal;
use dmarq_domain::ReportFilter;
use uuid::Uuid;

use crate::dto::{SaveFilterRequest, SavedFilterResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_filters_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<SavedFilterResponse>>> {
    let filters = state
        .saved_filter_service
        .list_filters(&principal)
        .await?
        .into_iter()
        .map(SavedFilterResponse::from)
        .collect();

    Ok(Json(filters))
}

pub async fn save_filter_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<SaveFilterRequest>,
) -> ApiResult<(StatusCode, Json<SavedFilterResponse>)> {
    let filter = ReportFilter::normalize(&payload.filter);
    let saved = state
        .saved_filter_service
        .save_filter(&principal, payload.name.as_str(), filter)
        .await?;

    Ok((StatusCode::CREATED, Json(SavedFilterResponse::from(saved))))
}

pub async fn delete_filter_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(filter_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .saved_filter_service
        .delete_filter(&principal, filter_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
