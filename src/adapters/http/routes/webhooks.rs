//! Payment provider webhook endpoint.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppError,
    use_cases::webhook_ingest::RejectReason,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/payments", post(handle_payment_webhook))
}

/// POST /api/webhooks/payments
///
/// 200 tells the provider to stop redelivering, 500 asks it to retry later.
async fn handle_payment_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match app_state.webhooks.ingest(&body, signature).await {
        Ok(ack) => (
            StatusCode::OK,
            Json(json!({ "received": true, "outcome": ack })),
        )
            .into_response(),
        Err(RejectReason::BadSignature) => AppError::BadSignature.into_response(),
        Err(RejectReason::Retryable(reason)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "received": false, "retry": true, "reason": reason })),
        )
            .into_response(),
    }
}
