use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Invalid webhook signature")]
    BadSignature,

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a retry of the same request may succeed.
    ///
    /// Webhook ingestion returns 5xx for these so the provider redelivers;
    /// everything else is acknowledged and logged.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Transient errors - retry may succeed
            AppError::Database(_) => true,
            AppError::Timeout(_) => true,
            AppError::Internal(_) => true,

            // Expected conditions - won't change with retry
            AppError::InvalidInput(_) => false,
            AppError::NotFound => false,
            AppError::Conflict(_) => false,
            AppError::InsufficientFunds { .. } => false,
            AppError::BadSignature => false,
            AppError::MalformedEvent(_) => false,
            AppError::Unauthorized => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    Timeout,
    InvalidInput,
    NotFound,
    Conflict,
    InsufficientFunds,
    BadSignature,
    MalformedEvent,
    Unauthorized,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorCode::BadSignature => "BAD_SIGNATURE",
            ErrorCode::MalformedEvent => "MALFORMED_EVENT",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
