use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::{adapters::http::app_state::AppState, app_error::AppError};

/// Requires `Authorization: Bearer <INTERNAL_API_TOKEN>`.
///
/// End-user identity is checked upstream; this only proves the caller is one of
/// our own services.
pub async fn require_service_token(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    let expected = app_state.config.internal_api_token.expose_secret();
    if expected.is_empty() || !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
