use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Subscription status of a billing account.
///
/// The stored value is what the last applied provider event (or reconciliation)
/// said. Readers should use [`AccountStatus::effective`], which folds in the
/// expiry date so no background job is needed to flip accounts to `expired`.
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
#[sqlx(type_name = "account_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AccountStatus {
    Trial,
    Active,
    PastDue,
    Cancelled,
    Expired,
}

impl AccountStatus {
    /// Status as seen at `now`.
    ///
    /// `trial` and `active` lapse to `expired` once `expires_at` has passed.
    /// `past_due` and `cancelled` are left alone: the provider decides when
    /// those end.
    pub fn effective(self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match (self, expires_at) {
            (AccountStatus::Trial | AccountStatus::Active, Some(end)) if end <= now => {
                AccountStatus::Expired
            }
            (status, _) => status,
        }
    }

    /// Map a provider subscription status string. `None` for values we do
    /// not recognise; those events are dropped rather than guessed at.
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "active" | "trialing" => Some(AccountStatus::Active),
            "past_due" | "unpaid" | "incomplete" | "paused" => Some(AccountStatus::PastDue),
            "canceled" | "cancelled" | "incomplete_expired" => Some(AccountStatus::Cancelled),
            _ => None,
        }
    }

    /// Returns true if the account may use paid features.
    ///
    /// `past_due` keeps access as a grace period until the provider cancels.
    pub fn has_access(&self) -> bool {
        matches!(
            self,
            AccountStatus::Trial | AccountStatus::Active | AccountStatus::PastDue
        )
    }
}

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
#[sqlx(type_name = "plan_tag", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PlanTag {
    Trial,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub plan: PlanTag,
    pub status: AccountStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider timestamp of the event that last set `status`.
    pub status_event_at: Option<DateTime<Utc>>,
    pub external_customer_ref: Option<String>,
    pub external_subscription_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn effective_status(&self, now: DateTime<Utc>) -> AccountStatus {
        self.status.effective(self.expires_at, now)
    }

    /// Whether an update stamped `event_at` is older than what was already applied.
    pub fn is_stale(&self, event_at: DateTime<Utc>) -> bool {
        matches!(self.status_event_at, Some(applied) if applied > event_at)
    }
}
