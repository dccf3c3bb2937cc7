use thiserror::Error;

/// Infrastructure errors that can occur during application startup.
///
/// Display messages are safe for logs. Debug output includes the `#[source]`
/// chain, which may contain the connection string.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("Database connection failed. Check DATABASE_URL and ensure the database is running.")]
    DatabaseConnection(#[source] sqlx::Error),

    #[error("Database migration failed")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Package catalog could not be read from {path}")]
    CatalogRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Package catalog at {path} is not valid JSON")]
    CatalogParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Package catalog is invalid: {0}")]
    CatalogInvalid(String),
}

impl From<sqlx::Error> for InfraError {
    fn from(e: sqlx::Error) -> Self {
        InfraError::DatabaseConnection(e)
    }
}

impl From<sqlx::migrate::MigrateError> for InfraError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        InfraError::Migration(e)
    }
}
