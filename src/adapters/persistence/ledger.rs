use async_trait::async_trait;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::{
        PostgresPersistence, accounts::lock_account, processed_events::insert_claim,
    },
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{
        Claimed, DebitOutcome, HistoryPage, LedgerRepoTrait, LedgerSnapshot,
    },
    domain::entities::{
        processed_event::{EventClaim, EventOutcome},
        transaction::{Transaction, TransactionDraft},
    },
};

const SELECT_COLS: &str = "id, account_id, amount, kind, description, external_ref, created_at";

fn row_to_transaction(row: sqlx::postgres::PgRow) -> Transaction {
    Transaction {
        id: row.get("id"),
        account_id: row.get("account_id"),
        amount: row.get("amount"),
        kind: row.get("kind"),
        description: row.get("description"),
        external_ref: row.get("external_ref"),
        created_at: row.get("created_at"),
    }
}

async fn insert_transaction(
    conn: &mut PgConnection,
    draft: &TransactionDraft,
) -> AppResult<Transaction> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO transactions (id, account_id, amount, kind, description, external_ref)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        SELECT_COLS
    ))
    .bind(Uuid::new_v4())
    .bind(draft.account_id)
    .bind(draft.amount)
    .bind(draft.kind)
    .bind(&draft.description)
    .bind(draft.external_ref.as_deref())
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::from)?;

    Ok(row_to_transaction(row))
}

async fn sum_amounts(conn: &mut PgConnection, account_id: Uuid) -> AppResult<i64> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(amount), 0)::BIGINT AS balance FROM transactions WHERE account_id = $1",
    )
    .bind(account_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(AppError::from)?;

    Ok(row.get("balance"))
}

/// `None` when the account does not exist.
async fn select_balance(conn: &mut PgConnection, account_id: Uuid) -> AppResult<Option<i64>> {
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(t.amount), 0)::BIGINT AS balance
        FROM accounts a
        LEFT JOIN transactions t ON t.account_id = a.id
        WHERE a.id = $1
        GROUP BY a.id
        "#,
    )
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)?;

    Ok(row.map(|row| row.get("balance")))
}

async fn select_page(
    conn: &mut PgConnection,
    account_id: Uuid,
    page: &HistoryPage,
) -> AppResult<Vec<Transaction>> {
    // Keyset on (created_at, id); an unknown cursor yields an empty page
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM transactions
        WHERE account_id = $1
          AND ($2::uuid IS NULL OR (created_at, id) < (
                SELECT created_at, id FROM transactions
                WHERE id = $2 AND account_id = $1
              ))
        ORDER BY created_at DESC, id DESC
        LIMIT $3
        "#,
        SELECT_COLS
    ))
    .bind(account_id)
    .bind(page.before)
    .bind(page.limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(AppError::from)?;

    Ok(rows.into_iter().map(row_to_transaction).collect())
}

async fn select_by_reference(
    conn: &mut PgConnection,
    account_id: Uuid,
    external_ref: &str,
) -> AppResult<Option<Transaction>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM transactions WHERE account_id = $1 AND external_ref = $2",
        SELECT_COLS
    ))
    .bind(account_id)
    .bind(external_ref)
    .fetch_optional(&mut *conn)
    .await
    .map_err(AppError::from)?;

    Ok(row.map(row_to_transaction))
}

#[async_trait]
impl LedgerRepoTrait for PostgresPersistence {
    async fn append(
        &self,
        draft: &TransactionDraft,
        claim: Option<&EventClaim>,
    ) -> AppResult<Claimed<Transaction>> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        lock_account(&mut tx, draft.account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if let Some(claim) = claim {
            if !insert_claim(&mut tx, claim, EventOutcome::Credited).await? {
                return Ok(Claimed::AlreadyProcessed);
            }
        }

        // A duplicate external_ref fails the unique index and rolls back the claim too
        let transaction = insert_transaction(&mut tx, draft).await?;
        tx.commit().await.map_err(AppError::from)?;

        Ok(Claimed::Applied(transaction))
    }

    async fn debit(&self, draft: &TransactionDraft) -> AppResult<DebitOutcome> {
        let key = draft
            .external_ref
            .as_deref()
            .ok_or_else(|| AppError::InvalidInput("Debit requires an idempotency key".into()))?;

        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        lock_account(&mut tx, draft.account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if let Some(existing) = select_by_reference(&mut tx, draft.account_id, key).await? {
            return Ok(DebitOutcome::Replayed(existing));
        }

        let available = sum_amounts(&mut tx, draft.account_id).await?;
        if available + draft.amount < 0 {
            return Ok(DebitOutcome::Insufficient { available });
        }

        let transaction = insert_transaction(&mut tx, draft).await?;
        tx.commit().await.map_err(AppError::from)?;

        Ok(DebitOutcome::Debited(transaction))
    }

    async fn balance_of(&self, account_id: Uuid) -> AppResult<i64> {
        let mut conn = self.pool().acquire().await.map_err(AppError::from)?;
        select_balance(&mut conn, account_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn history(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<Vec<Transaction>> {
        let mut conn = self.pool().acquire().await.map_err(AppError::from)?;
        select_page(&mut conn, account_id, page).await
    }

    async fn snapshot(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<LedgerSnapshot> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;

        let balance = select_balance(&mut tx, account_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let transactions = select_page(&mut tx, account_id, page).await?;
        tx.commit().await.map_err(AppError::from)?;

        Ok(LedgerSnapshot {
            balance,
            transactions,
        })
    }

    async fn find_by_reference(
        &self,
        account_id: Uuid,
        external_ref: &str,
    ) -> AppResult<Option<Transaction>> {
        let mut conn = self.pool().acquire().await.map_err(AppError::from)?;
        select_by_reference(&mut conn, account_id, external_ref).await
    }
}
