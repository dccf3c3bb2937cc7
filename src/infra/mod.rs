use crate::{
    adapters::persistence::PostgresPersistence,
    infra::{
        db::{init_db, run_migrations},
        error::InfraError,
    },
};

pub mod app;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod setup;
pub mod webhook_signature;

pub async fn postgres_persistence(
    database_url: &str,
    max_connections: u32,
) -> Result<PostgresPersistence, InfraError> {
    let pool = init_db(database_url, max_connections).await?;
    run_migrations(&pool).await?;
    let persistence = PostgresPersistence::new(pool);
    Ok(persistence)
}
