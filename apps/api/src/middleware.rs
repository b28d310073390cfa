use axum::extract::{Request, State};
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::Response;
use dmarq_core::{AppError, Principal};
use tower_sessions::Session;

use crate::auth::SESSION_PRINCIPAL_KEY;
use crate::error::ApiResult;
use crate::state::AppState;

/// Resolves the session into a [`Principal`] request extension.
///
/// Everything behind this layer receives the principal explicitly; no handler
/// reads ambient session state.
pub async fn require_auth(
    session: Session,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let principal = session
        .get::<Principal>(SESSION_PRINCIPAL_KEY)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read session principal: {error}")))?
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Rejects state-changing requests that do not originate from the frontend.
pub async fn require_same_origin_for_mutations(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let mutating = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );

    if mutating {
        let headers = request.headers();

        let cross_site = headers
            .get("sec-fetch-site")
            .is_some_and(|value| value.as_bytes() == b"cross-site");
        if cross_site {
            return Err(AppError::Unauthorized("cross-site request blocked".to_owned()).into());
        }

        let origin_allowed = headers
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|origin| origin == state.frontend_url);
        let referer_allowed = headers
            .get(header::REFERER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|referer| referer.starts_with(&state.frontend_url));

        if !origin_allowed && !referer_allowed {
            return Err(AppError::Unauthorized("origin validation failed".to_owned()).into());
        }
    }

    Ok(next.run(request).await)
}
