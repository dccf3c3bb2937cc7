use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, processed_events::insert_claim},
    app_error::{AppError, AppResult},
    application::use_cases::{
        ledger::Claimed,
        subscription::{AccountRepoTrait, StatusChange, StatusUpdate},
    },
    domain::entities::{
        account::{Account, AccountStatus, PlanTag},
        processed_event::{EventClaim, EventOutcome},
    },
};

pub(crate) const ACCOUNT_COLS: &str = "id, plan, status, expires_at, status_event_at, \
    external_customer_ref, external_subscription_ref, created_at, updated_at";

fn row_to_account(row: sqlx::postgres::PgRow) -> Account {
    Account {
        id: row.get("id"),
        plan: row.get("plan"),
        status: row.get("status"),
        expires_at: row.get("expires_at"),
        status_event_at: row.get("status_event_at"),
        external_customer_ref: row.get("external_customer_ref"),
        external_subscription_ref: row.get("external_subscription_ref"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Take the per-account write lock inside an open transaction.
pub(crate) async fn lock_account(conn: &mut PgConnection, id: Uuid) -> AppResult<Option<Account>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
        ACCOUNT_COLS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)?;

    Ok(row.map(row_to_account))
}

#[async_trait]
impl AccountRepoTrait for PostgresPersistence {
    async fn get(&self, id: Uuid) -> AppResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLS))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.map(row_to_account))
    }

    async fn create_if_absent(&self, id: Uuid, trial_ends_at: DateTime<Utc>) -> AppResult<Account> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, plan, status, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(PlanTag::Trial)
        .bind(AccountStatus::Trial)
        .bind(trial_ends_at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLS))
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row_to_account(row))
    }

    async fn find_by_customer_ref(&self, customer_ref: &str) -> AppResult<Option<Account>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM accounts
            WHERE external_customer_ref = $1
            ORDER BY created_at
            LIMIT 1
            "#,
            ACCOUNT_COLS
        ))
        .bind(customer_ref)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_account))
    }

    async fn apply_status(
        &self,
        update: &StatusUpdate,
        claim: Option<&EventClaim>,
    ) -> AppResult<Claimed<StatusChange>> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let account = lock_account(&mut tx, update.account_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let stale = account.is_stale(update.event_at);

        if let Some(claim) = claim {
            let outcome = if stale {
                EventOutcome::Stale
            } else {
                EventOutcome::StatusUpdated
            };
            if !insert_claim(&mut tx, claim, outcome).await? {
                // Dropping the transaction rolls back the row lock
                return Ok(Claimed::AlreadyProcessed);
            }
        }

        if stale {
            tx.commit().await.map_err(AppError::from)?;
            return Ok(Claimed::Applied(StatusChange::Stale(account)));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET status = $2,
                expires_at = COALESCE($3, expires_at),
                status_event_at = $4,
                plan = COALESCE($5, plan),
                external_customer_ref = COALESCE(external_customer_ref, $6),
                external_subscription_ref = COALESCE($7, external_subscription_ref),
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLS
        ))
        .bind(update.account_id)
        .bind(update.status)
        .bind(update.expires_at)
        .bind(update.event_at)
        .bind(update.plan)
        .bind(update.customer_ref.as_deref())
        .bind(update.subscription_ref.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;

        Ok(Claimed::Applied(StatusChange::Updated(row_to_account(row))))
    }

    async fn attach_customer_ref(&self, id: Uuid, customer_ref: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET external_customer_ref = $2, updated_at = now()
            WHERE id = $1 AND external_customer_ref IS NULL
            "#,
        )
        .bind(id)
        .bind(customer_ref)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(())
    }
}
