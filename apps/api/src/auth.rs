use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use dmarq_core::{AppError, Principal};
use tower_sessions::Session;

use crate::dto::{LoginRequest, PrincipalResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// Session key holding the signed-in principal.
pub const SESSION_PRINCIPAL_KEY: &str = "dmarq.principal";

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<PrincipalResponse>> {
    let principal = state
        .user_service
        .login(payload.email.as_str(), payload.password.as_str())
        .await?;

    session
        .insert(SESSION_PRINCIPAL_KEY, principal.clone())
        .await
        .map_err(|error| AppError::Internal(format!("failed to persist session: {error}")))?;

    Ok(Json(PrincipalResponse::from(principal)))
}

pub async fn logout_handler(session: Session) -> ApiResult<StatusCode> {
    session
        .flush()
        .await
        .map_err(|error| AppError::Internal(format!("failed to clear session: {error}")))?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn me_handler(
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<PrincipalResponse>> {
    Ok(Json(PrincipalResponse::from(principal)))
}
