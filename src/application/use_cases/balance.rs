use std::sync::Arc;
use std::time::Duration;

use tokio_retry::{
    RetryIf,
    strategy::{ExponentialBackoff, jitter},
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{
        Claimed, DebitOutcome, HistoryPage, LedgerRepoTrait, LedgerSnapshot, Statement,
    },
    domain::entities::{
        processed_event::EventClaim,
        transaction::{Transaction, TransactionDraft, TransactionKind},
    },
};

// ============================================================================
// Constants
// ============================================================================

pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;
const MAX_RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreditInput {
    pub account_id: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub external_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DebitInput {
    pub account_id: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub idempotency_key: String,
}

/// Bounded retry of transient store failures for client debit requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total store calls, the first one included.
    pub attempts: usize,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 10,
        }
    }
}

// ============================================================================
// Use Cases
// ============================================================================

/// The only path by which ledger rows are created.
#[derive(Clone)]
pub struct BalanceAuthority {
    ledger: Arc<dyn LedgerRepoTrait>,
    retry: RetryPolicy,
}

impl BalanceAuthority {
    pub fn new(ledger: Arc<dyn LedgerRepoTrait>, retry: RetryPolicy) -> Self {
        Self { ledger, retry }
    }

    /// Add points. No balance check; a duplicate external reference is a
    /// `Conflict`.
    #[instrument(skip(self, input), fields(account_id = %input.account_id, amount = input.amount))]
    pub async fn credit(&self, input: &CreditInput) -> AppResult<Transaction> {
        let draft = validate_credit(input)?;
        match self.ledger.append(&draft, None).await? {
            Claimed::Applied(tx) => {
                tracing::info!(transaction_id = %tx.id, kind = %tx.kind, "Points credited");
                Ok(tx)
            }
            // Unreachable without a claim, but keep the contract total
            Claimed::AlreadyProcessed => Err(AppError::Conflict("credit already applied".into())),
        }
    }

    /// Add points as the effect of a provider event; the claim commits with the
    /// ledger row.
    #[instrument(skip(self, input, claim), fields(account_id = %input.account_id, event_id = %claim.event_id))]
    pub async fn credit_for_event(
        &self,
        input: &CreditInput,
        claim: &EventClaim,
    ) -> AppResult<Claimed<Transaction>> {
        let draft = validate_credit(input)?;
        let result = self.ledger.append(&draft, Some(claim)).await?;
        if let Claimed::Applied(tx) = &result {
            tracing::info!(
                transaction_id = %tx.id,
                amount = tx.amount,
                external_ref = ?tx.external_ref,
                "Points credited from provider event"
            );
        }
        Ok(result)
    }

    /// Remove points for a billable action, or refuse with `InsufficientFunds`.
    ///
    /// Idempotent on `idempotency_key`: a retry returns the original row. A
    /// reused key with a different amount or kind is a `Conflict`.
    #[instrument(skip(self, input), fields(account_id = %input.account_id, amount = input.amount, key = %input.idempotency_key))]
    pub async fn debit(&self, input: &DebitInput) -> AppResult<Transaction> {
        let draft = validate_debit(input)?;

        let ledger = &self.ledger;
        let draft_ref = &draft;
        let strategy = ExponentialBackoff::from_millis(self.retry.base_delay_ms.max(1))
            .max_delay(Duration::from_millis(MAX_RETRY_DELAY_MS))
            .map(jitter)
            .take(self.retry.attempts.saturating_sub(1));

        let outcome = RetryIf::spawn(
            strategy,
            move || ledger.debit(draft_ref),
            |e: &AppError| {
                let retry = e.is_retryable();
                if retry {
                    tracing::warn!(error = %e, "Transient failure on debit, retrying");
                }
                retry
            },
        )
        .await?;

        match outcome {
            DebitOutcome::Debited(tx) => {
                tracing::info!(transaction_id = %tx.id, "Points debited");
                Ok(tx)
            }
            DebitOutcome::Replayed(existing) if draft.matches(&existing) => {
                tracing::info!(transaction_id = %existing.id, "Debit replayed");
                Ok(existing)
            }
            DebitOutcome::Replayed(existing) => {
                tracing::warn!(
                    transaction_id = %existing.id,
                    existing_amount = existing.amount,
                    "Idempotency key reused with different parameters"
                );
                Err(AppError::Conflict(
                    "idempotency key already used for a different debit".into(),
                ))
            }
            DebitOutcome::Insufficient { available } => {
                tracing::info!(available, "Debit refused: insufficient funds");
                Err(AppError::InsufficientFunds {
                    required: input.amount,
                    available,
                })
            }
        }
    }

    pub async fn balance_of(&self, account_id: Uuid) -> AppResult<i64> {
        self.ledger.balance_of(account_id).await
    }

    pub async fn history(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<Vec<Transaction>> {
        self.ledger.history(account_id, page).await
    }

    /// Look up the row written under `external_ref`, e.g. to check whether a
    /// debit with a given idempotency key went through.
    pub async fn find_by_reference(
        &self,
        account_id: Uuid,
        external_ref: &str,
    ) -> AppResult<Transaction> {
        self.ledger
            .find_by_reference(account_id, external_ref)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Balance plus one page of history.
    #[instrument(skip(self))]
    pub async fn statement(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<Statement> {
        let LedgerSnapshot {
            balance,
            transactions,
        } = self.ledger.snapshot(account_id, page).await?;
        let next_cursor = if transactions.len() as i64 == page.limit {
            transactions.last().map(|tx| tx.id)
        } else {
            None
        };

        Ok(Statement {
            account_id,
            balance,
            transactions,
            next_cursor,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_description(description: &str) -> AppResult<String> {
    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::InvalidInput("Description is required".into()));
    }
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(AppError::InvalidInput(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(description.to_string())
}

fn validate_credit(input: &CreditInput) -> AppResult<TransactionDraft> {
    if input.amount <= 0 {
        return Err(AppError::InvalidInput("Credit amount must be positive".into()));
    }
    if !input.kind.is_credit() {
        return Err(AppError::InvalidInput(format!(
            "{} is not a credit kind",
            input.kind
        )));
    }
    let description = validate_description(&input.description)?;
    let external_ref = input
        .external_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    Ok(TransactionDraft::credit(
        input.account_id,
        input.amount,
        input.kind,
        &description,
        external_ref,
    ))
}

fn validate_debit(input: &DebitInput) -> AppResult<TransactionDraft> {
    if input.amount <= 0 {
        return Err(AppError::InvalidInput("Debit amount must be positive".into()));
    }
    if !input.kind.is_debit() {
        return Err(AppError::InvalidInput(format!(
            "{} is not a debit kind",
            input.kind
        )));
    }
    let key = input.idempotency_key.trim();
    if key.is_empty() {
        return Err(AppError::InvalidInput("Idempotency key is required".into()));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::InvalidInput(format!(
            "Idempotency key must be at most {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    let description = validate_description(&input.description)?;

    Ok(TransactionDraft::debit(
        input.account_id,
        input.amount,
        input.kind,
        &description,
        key,
    ))
}
