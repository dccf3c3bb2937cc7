use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::ledger::Claimed,
    domain::entities::{
        account::{Account, AccountStatus, PlanTag},
        processed_event::EventClaim,
    },
};

pub const DEFAULT_TRIAL_DAYS: i64 = 14;

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait AccountRepoTrait: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<Account>>;

    /// Insert a trial account unless one exists. Returns the stored row either way.
    async fn create_if_absent(&self, id: Uuid, trial_ends_at: DateTime<Utc>) -> AppResult<Account>;

    async fn find_by_customer_ref(&self, customer_ref: &str) -> AppResult<Option<Account>>;

    /// Apply a status update under the account row lock.
    ///
    /// An update older than the stored `status_event_at` leaves the account
    /// unchanged and comes back as [`StatusChange::Stale`]. When `claim` is given
    /// it is inserted in the same transaction with the matching outcome.
    async fn apply_status(
        &self,
        update: &StatusUpdate,
        claim: Option<&EventClaim>,
    ) -> AppResult<Claimed<StatusChange>>;

    /// Set the customer reference if the account has none yet.
    async fn attach_customer_ref(&self, id: Uuid, customer_ref: &str) -> AppResult<()>;
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub account_id: Uuid,
    pub status: AccountStatus,
    /// `None` keeps the stored expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider event timestamp; decides last-writer-wins.
    pub event_at: DateTime<Utc>,
    pub plan: Option<PlanTag>,
    pub customer_ref: Option<String>,
    pub subscription_ref: Option<String>,
}

impl StatusUpdate {
    pub fn new(account_id: Uuid, status: AccountStatus, event_at: DateTime<Utc>) -> Self {
        // Any provider-driven activation means the account is paying
        let plan = (status == AccountStatus::Active).then_some(PlanTag::Paid);
        Self {
            account_id,
            status,
            expires_at: None,
            event_at,
            plan,
            customer_ref: None,
            subscription_ref: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_refs(mut self, customer_ref: Option<String>, subscription_ref: Option<String>) -> Self {
        self.customer_ref = customer_ref;
        self.subscription_ref = subscription_ref;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Updated(Account),
    /// The stored status came from a newer event; nothing changed.
    Stale(Account),
}

impl StatusChange {
    pub fn account(&self) -> &Account {
        match self {
            StatusChange::Updated(account) | StatusChange::Stale(account) => account,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub account_id: Uuid,
    pub stored: AccountStatus,
    pub effective: AccountStatus,
    pub plan: PlanTag,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_access: bool,
}

impl StatusView {
    pub fn of(account: &Account, now: DateTime<Utc>) -> Self {
        let effective = account.effective_status(now);
        Self {
            account_id: account.id,
            stored: account.status,
            effective,
            plan: account.plan,
            expires_at: account.expires_at,
            has_access: effective.has_access(),
        }
    }
}

// ============================================================================
// Use Cases
// ============================================================================

/// Derives each account's subscription status from provider events.
///
/// Independent of the point balance: the two share only the account id.
#[derive(Clone)]
pub struct SubscriptionStateMachine {
    accounts: Arc<dyn AccountRepoTrait>,
    trial_days: i64,
}

impl SubscriptionStateMachine {
    pub fn new(accounts: Arc<dyn AccountRepoTrait>, trial_days: i64) -> Self {
        Self {
            accounts,
            trial_days,
        }
    }

    /// Create the account in `trial`. An existing account is returned as-is.
    #[instrument(skip(self))]
    pub async fn open_account(&self, account_id: Uuid, now: DateTime<Utc>) -> AppResult<Account> {
        let trial_ends_at = now + Duration::days(self.trial_days);
        let account = self
            .accounts
            .create_if_absent(account_id, trial_ends_at)
            .await?;
        tracing::info!(status = %account.status, expires_at = ?account.expires_at, "Account opened");
        Ok(account)
    }

    pub async fn get_account(&self, account_id: Uuid) -> AppResult<Account> {
        self.accounts
            .get(account_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    #[instrument(skip(self))]
    pub async fn status_of(&self, account_id: Uuid, now: DateTime<Utc>) -> AppResult<StatusView> {
        let account = self.get_account(account_id).await?;
        Ok(StatusView::of(&account, now))
    }

    /// Find the account a provider event refers to.
    ///
    /// Metadata account id wins; the customer reference is the fallback for
    /// events created outside our checkout flow. An unparseable id resolves to
    /// nothing rather than an error.
    pub async fn resolve_account(
        &self,
        account_id: Option<&str>,
        customer_ref: Option<&str>,
    ) -> AppResult<Option<Account>> {
        if let Some(raw) = account_id {
            return match Uuid::parse_str(raw) {
                Ok(id) => self.accounts.get(id).await,
                Err(_) => {
                    tracing::warn!(account_id = %raw, "Provider metadata carries invalid account id");
                    Ok(None)
                }
            };
        }
        match customer_ref {
            Some(customer_ref) => self.accounts.find_by_customer_ref(customer_ref).await,
            None => Ok(None),
        }
    }

    /// Apply a provider-driven status update, last writer (by event time) wins.
    #[instrument(skip(self, update, claim), fields(account_id = %update.account_id, status = %update.status))]
    pub async fn apply_provider_update(
        &self,
        update: &StatusUpdate,
        claim: &EventClaim,
    ) -> AppResult<Claimed<StatusChange>> {
        let result = self.accounts.apply_status(update, Some(claim)).await?;
        match &result {
            Claimed::Applied(StatusChange::Updated(account)) => {
                tracing::info!(
                    event_id = %claim.event_id,
                    expires_at = ?account.expires_at,
                    "Subscription status updated"
                );
            }
            Claimed::Applied(StatusChange::Stale(account)) => {
                tracing::info!(
                    event_id = %claim.event_id,
                    stored = %account.status,
                    stored_event_at = ?account.status_event_at,
                    event_at = %update.event_at,
                    "Ignoring out-of-order status update"
                );
            }
            Claimed::AlreadyProcessed => {}
        }
        Ok(result)
    }

    /// Operator override: force a status, stamped with `now` so later provider
    /// events still win.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        account_id: Uuid,
        status: AccountStatus,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<Account> {
        let update = StatusUpdate {
            plan: None,
            ..StatusUpdate::new(account_id, status, now).with_expiry(expires_at)
        };
        match self.accounts.apply_status(&update, None).await? {
            Claimed::Applied(change) => {
                let account = change.account().clone();
                tracing::info!(status = %account.status, "Account status reconciled");
                Ok(account)
            }
            Claimed::AlreadyProcessed => Err(AppError::Internal(
                "reconciliation without claim reported as processed".into(),
            )),
        }
    }

    pub async fn attach_customer_ref(&self, account_id: Uuid, customer_ref: &str) -> AppResult<()> {
        self.accounts
            .attach_customer_ref(account_id, customer_ref)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryBillingStore, create_test_account, test_claim, test_time};

    fn machine(store: &Arc<InMemoryBillingStore>) -> SubscriptionStateMachine {
        SubscriptionStateMachine::new(store.clone(), DEFAULT_TRIAL_DAYS)
    }

    #[tokio::test]
    async fn open_account_starts_trial_window() {
        let store = Arc::new(InMemoryBillingStore::new());
        let id = Uuid::new_v4();

        let account = machine(&store).open_account(id, test_time()).await.unwrap();

        assert_eq!(account.status, AccountStatus::Trial);
        assert_eq!(account.plan, PlanTag::Trial);
        assert_eq!(account.expires_at, Some(test_time() + Duration::days(14)));
    }

    #[tokio::test]
    async fn open_account_is_idempotent() {
        let store = Arc::new(InMemoryBillingStore::new());
        let machine = machine(&store);
        let id = Uuid::new_v4();

        let first = machine.open_account(id, test_time()).await.unwrap();
        let second = machine
            .open_account(id, test_time() + Duration::days(3))
            .await
            .unwrap();

        assert_eq!(first.expires_at, second.expires_at);
    }

    #[tokio::test]
    async fn trial_reads_as_expired_after_window() {
        let store = Arc::new(InMemoryBillingStore::new());
        let machine = machine(&store);
        let id = Uuid::new_v4();
        machine.open_account(id, test_time()).await.unwrap();

        let during = machine
            .status_of(id, test_time() + Duration::days(13))
            .await
            .unwrap();
        let after = machine
            .status_of(id, test_time() + Duration::days(15))
            .await
            .unwrap();

        assert_eq!(during.effective, AccountStatus::Trial);
        assert!(during.has_access);
        assert_eq!(after.stored, AccountStatus::Trial);
        assert_eq!(after.effective, AccountStatus::Expired);
        assert!(!after.has_access);
    }

    #[tokio::test]
    async fn status_of_unknown_account_is_not_found() {
        let store = Arc::new(InMemoryBillingStore::new());
        let err = machine(&store)
            .status_of(Uuid::new_v4(), test_time())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn older_past_due_does_not_override_newer_active() {
        let account = create_test_account(|_| {});
        let id = account.id;
        let store = Arc::new(InMemoryBillingStore::with_accounts(vec![account]));
        let machine = machine(&store);
        let t1 = test_time();
        let t2 = t1 + Duration::minutes(5);

        // t2 arrives first
        let active = StatusUpdate::new(id, AccountStatus::Active, t2)
            .with_expiry(Some(t2 + Duration::days(30)));
        machine
            .apply_provider_update(&active, &test_claim("evt_t2"))
            .await
            .unwrap();

        let late = StatusUpdate::new(id, AccountStatus::PastDue, t1);
        let result = machine
            .apply_provider_update(&late, &test_claim("evt_t1"))
            .await
            .unwrap();

        assert!(matches!(result, Claimed::Applied(StatusChange::Stale(_))));
        let view = machine.status_of(id, t2).await.unwrap();
        assert_eq!(view.stored, AccountStatus::Active);
        assert_eq!(view.plan, PlanTag::Paid);
    }

    #[tokio::test]
    async fn replayed_status_event_is_already_processed() {
        let account = create_test_account(|_| {});
        let id = account.id;
        let store = Arc::new(InMemoryBillingStore::with_accounts(vec![account]));
        let machine = machine(&store);
        let claim = test_claim("evt_1");
        let update = StatusUpdate::new(id, AccountStatus::PastDue, test_time());

        let first = machine.apply_provider_update(&update, &claim).await.unwrap();
        let second = machine.apply_provider_update(&update, &claim).await.unwrap();

        assert!(matches!(first, Claimed::Applied(StatusChange::Updated(_))));
        assert_eq!(second, Claimed::AlreadyProcessed);
    }

    #[tokio::test]
    async fn cancelled_account_can_resubscribe() {
        let account = create_test_account(|a| {
            a.status = AccountStatus::Cancelled;
            a.plan = PlanTag::Paid;
            a.status_event_at = Some(test_time());
        });
        let id = account.id;
        let store = Arc::new(InMemoryBillingStore::with_accounts(vec![account]));
        let machine = machine(&store);
        let later = test_time() + Duration::days(2);

        let update = StatusUpdate::new(id, AccountStatus::Active, later)
            .with_expiry(Some(later + Duration::days(30)))
            .with_refs(Some("cus_1".into()), Some("sub_new".into()));
        machine
            .apply_provider_update(&update, &test_claim("evt_resub"))
            .await
            .unwrap();

        let account = machine.get_account(id).await.unwrap();
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.external_subscription_ref.as_deref(), Some("sub_new"));
        assert_eq!(account.effective_status(later), AccountStatus::Active);
    }

    #[tokio::test]
    async fn reconcile_forces_status_and_keeps_plan() {
        let account = create_test_account(|a| a.status = AccountStatus::PastDue);
        let id = account.id;
        let store = Arc::new(InMemoryBillingStore::with_accounts(vec![account]));
        let machine = machine(&store);

        let account = machine
            .reconcile(id, AccountStatus::Cancelled, None, test_time())
            .await
            .unwrap();

        assert_eq!(account.status, AccountStatus::Cancelled);
        assert_eq!(account.plan, PlanTag::Trial);
        assert_eq!(account.status_event_at, Some(test_time()));
    }

    #[tokio::test]
    async fn resolve_prefers_metadata_then_customer_ref() {
        let account = create_test_account(|a| a.external_customer_ref = Some("cus_42".into()));
        let id = account.id;
        let store = Arc::new(InMemoryBillingStore::with_accounts(vec![account]));
        let machine = machine(&store);

        let by_id = machine
            .resolve_account(Some(&id.to_string()), None)
            .await
            .unwrap();
        let by_customer = machine.resolve_account(None, Some("cus_42")).await.unwrap();
        let invalid = machine
            .resolve_account(Some("not-a-uuid"), Some("cus_42"))
            .await
            .unwrap();

        assert_eq!(by_id.map(|a| a.id), Some(id));
        assert_eq!(by_customer.map(|a| a.id), Some(id));
        assert!(invalid.is_none());
    }

    #[tokio::test]
    async fn customer_ref_is_attached_only_once() {
        let account = create_test_account(|_| {});
        let id = account.id;
        let store = Arc::new(InMemoryBillingStore::with_accounts(vec![account]));
        let machine = machine(&store);

        machine.attach_customer_ref(id, "cus_first").await.unwrap();
        machine.attach_customer_ref(id, "cus_second").await.unwrap();

        let account = machine.get_account(id).await.unwrap();
        assert_eq!(account.external_customer_ref.as_deref(), Some("cus_first"));
    }
}
