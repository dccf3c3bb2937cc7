use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        processed_event::EventClaim,
        transaction::{Transaction, TransactionDraft},
    },
};

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

// ============================================================================
// Repository Traits
// ============================================================================

/// Append-only ledger storage.
///
/// Every write runs in one store transaction holding the account row lock, so
/// writes for the same account are serialized and a balance read inside the
/// write sees every previously committed row.
#[async_trait]
pub trait LedgerRepoTrait: Send + Sync {
    /// Append a row. When `claim` is given, the claim is inserted in the same
    /// transaction; if the event was already claimed nothing is written.
    ///
    /// Fails with `Conflict` if `(account_id, external_ref)` already exists and
    /// with `NotFound` if the account does not exist.
    async fn append(
        &self,
        draft: &TransactionDraft,
        claim: Option<&EventClaim>,
    ) -> AppResult<Claimed<Transaction>>;

    /// Check-then-append for a debit draft (negative amount, keyed).
    async fn debit(&self, draft: &TransactionDraft) -> AppResult<DebitOutcome>;

    async fn balance_of(&self, account_id: Uuid) -> AppResult<i64>;

    /// Newest first, keyset-paginated.
    async fn history(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<Vec<Transaction>>;

    /// Balance and one history page read from the same snapshot, so the page
    /// never shows rows the balance does not include or the reverse.
    async fn snapshot(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<LedgerSnapshot>;

    async fn find_by_reference(
        &self,
        account_id: Uuid,
        external_ref: &str,
    ) -> AppResult<Option<Transaction>>;
}

// ============================================================================
// Types
// ============================================================================

/// Result of a write that carried a provider event claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claimed<T> {
    Applied(T),
    /// The event was claimed by an earlier delivery; nothing was written.
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub balance: i64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebitOutcome {
    Debited(Transaction),
    /// A transaction already exists under the idempotency key.
    Replayed(Transaction),
    Insufficient { available: i64 },
}

/// Keyset page: rows strictly older than `before` (a transaction id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    pub limit: i64,
    pub before: Option<Uuid>,
}

impl HistoryPage {
    pub fn new(limit: Option<i64>, before: Option<Uuid>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            before,
        }
    }
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub account_id: Uuid,
    pub balance: i64,
    pub transactions: Vec<Transaction>,
    /// Pass as `before` to fetch the next page; `None` on the last page.
    pub next_cursor: Option<Uuid>,
}
