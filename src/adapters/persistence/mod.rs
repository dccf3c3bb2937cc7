use sqlx::PgPool;

use crate::app_error::AppError;

pub mod accounts;
pub mod ledger;
pub mod processed_events;

/// Postgres implementation of every repository trait.
///
/// Writes that touch an account's balance or status open a transaction and
/// take `SELECT ... FOR UPDATE` on the `accounts` row first, so they are
/// serialized per account by the database.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// How a failed statement should be reported, by SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlStateClass {
    /// Connection loss, serialization failure, deadlock, resource exhaustion.
    Transient,
    /// Constraint or data error: the same statement fails again.
    Rejected,
    Other,
}

fn classify_sqlstate(code: Option<&str>) -> SqlStateClass {
    let Some(code) = code else {
        return SqlStateClass::Other;
    };
    match code.get(..2) {
        Some("08" | "40" | "53" | "57" | "58") => SqlStateClass::Transient,
        _ if code == "55P03" => SqlStateClass::Transient,
        Some("22" | "23") => SqlStateClass::Rejected,
        _ => SqlStateClass::Other,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::Conflict("A record with this reference already exists".into())
                } else if db_err.is_foreign_key_violation() {
                    AppError::NotFound
                } else {
                    let code = db_err.code();
                    let class = classify_sqlstate(code.as_deref());
                    // Log the actual error for debugging, but don't expose details
                    tracing::error!(error = ?err, code = ?code, class = ?class, "Database error");
                    match class {
                        SqlStateClass::Rejected => {
                            AppError::InvalidInput("Rejected by a database constraint".into())
                        }
                        SqlStateClass::Transient | SqlStateClass::Other => {
                            AppError::Database("Database operation failed".into())
                        }
                    }
                }
            }
            sqlx::Error::PoolTimedOut => {
                tracing::error!(error = ?err, "Database pool exhausted");
                AppError::Timeout("Timed out waiting for a database connection".into())
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
