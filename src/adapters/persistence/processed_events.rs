use async_trait::async_trait;
use sqlx::{PgConnection, Row};

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::idempotency::ProcessedEventRepoTrait,
    domain::entities::processed_event::{EventClaim, EventOutcome, ProcessedEvent},
};

const SELECT_COLS: &str = "event_id, event_type, event_created_at, outcome, processed_at";

fn row_to_event(row: sqlx::postgres::PgRow) -> ProcessedEvent {
    ProcessedEvent {
        event_id: row.get("event_id"),
        event_type: row.get("event_type"),
        event_created_at: row.get("event_created_at"),
        outcome: row.get("outcome"),
        processed_at: row.get("processed_at"),
    }
}

/// Insert a claim row on `conn`. Returns false if the event id is already claimed.
///
/// Called inside the transaction that applies the event's effect, so the claim
/// and the effect commit or roll back together.
pub(crate) async fn insert_claim(
    conn: &mut PgConnection,
    claim: &EventClaim,
    outcome: EventOutcome,
) -> AppResult<bool> {
    let row = sqlx::query(
        r#"
        INSERT INTO processed_events (event_id, event_type, event_created_at, outcome)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (event_id) DO NOTHING
        RETURNING event_id
        "#,
    )
    .bind(&claim.event_id)
    .bind(&claim.event_type)
    .bind(claim.event_created_at)
    .bind(outcome)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)?;

    Ok(row.is_some())
}

#[async_trait]
impl ProcessedEventRepoTrait for PostgresPersistence {
    async fn claim(&self, claim: &EventClaim, outcome: EventOutcome) -> AppResult<bool> {
        let mut conn = self.pool().acquire().await.map_err(AppError::from)?;
        insert_claim(&mut conn, claim, outcome).await
    }

    async fn release(&self, event_id: &str, outcome: EventOutcome) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE processed_events
            SET outcome = $2, processed_at = now()
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .bind(outcome)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(())
    }

    async fn get(&self, event_id: &str) -> AppResult<Option<ProcessedEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM processed_events WHERE event_id = $1",
            SELECT_COLS
        ))
        .bind(event_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_event))
    }
}
