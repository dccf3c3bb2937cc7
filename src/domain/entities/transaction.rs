use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TransactionKind {
    Purchase,
    Bonus,
    Refund,
    Screening,
    VoiceInterview,
}

impl TransactionKind {
    /// Credit kinds add points, debit kinds (billable actions) remove them.
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionKind::Purchase | TransactionKind::Bonus | TransactionKind::Refund
        )
    }

    pub fn is_debit(&self) -> bool {
        !self.is_credit()
    }
}

/// An immutable ledger row. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Positive for credits, negative for debits.
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    /// Checkout session id for purchases, caller idempotency key for debits.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A transaction that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub account_id: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    pub description: String,
    pub external_ref: Option<String>,
}

impl TransactionDraft {
    pub fn credit(
        account_id: Uuid,
        points: i64,
        kind: TransactionKind,
        description: &str,
        external_ref: Option<&str>,
    ) -> Self {
        Self {
            account_id,
            amount: points,
            kind,
            description: description.to_string(),
            external_ref: external_ref.map(str::to_string),
        }
    }

    pub fn debit(
        account_id: Uuid,
        points: i64,
        kind: TransactionKind,
        description: &str,
        idempotency_key: &str,
    ) -> Self {
        Self {
            account_id,
            amount: -points,
            kind,
            description: description.to_string(),
            external_ref: Some(idempotency_key.to_string()),
        }
    }

    /// Whether `existing` was written for the same request as this draft.
    ///
    /// Used on idempotent replay: a reused key with a different amount or kind
    /// is a caller bug, not a replay.
    pub fn matches(&self, existing: &Transaction) -> bool {
        existing.account_id == self.account_id
            && existing.amount == self.amount
            && existing.kind == self.kind
    }
}
