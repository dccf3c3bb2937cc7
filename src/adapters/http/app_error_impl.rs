use crate::app_error::{AppError, ErrorCode};
use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the error before it gets converted into a status response.
        if self.is_retryable() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }

        match self {
            AppError::Database(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DatabaseError, None)
            }
            AppError::Timeout(_) => {
                error_resp(StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Timeout, None)
            }
            AppError::InvalidInput(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::InvalidInput, Some(msg))
            }
            AppError::NotFound => error_resp(StatusCode::NOT_FOUND, ErrorCode::NotFound, None),
            AppError::Conflict(msg) => {
                error_resp(StatusCode::CONFLICT, ErrorCode::Conflict, Some(msg))
            }
            AppError::InsufficientFunds {
                required,
                available,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                Json(serde_json::json!({
                    "code": ErrorCode::InsufficientFunds.as_str(),
                    "required": required,
                    "available": available,
                })),
            )
                .into_response(),
            AppError::BadSignature => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::BadSignature, None)
            }
            AppError::MalformedEvent(msg) => {
                error_resp(StatusCode::BAD_REQUEST, ErrorCode::MalformedEvent, Some(msg))
            }
            AppError::Unauthorized => {
                error_resp(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized, None)
            }
            AppError::Internal(_) => {
                error_resp(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError, None)
            }
        }
    }
}

fn error_resp(status: StatusCode, code: ErrorCode, message: Option<String>) -> Response {
    let body = match message {
        Some(msg) => serde_json::json!({ "code": code.as_str(), "message": msg }),
        None => serde_json::json!({ "code": code.as_str() }),
    };
    (status, Json(body)).into_response()
}
