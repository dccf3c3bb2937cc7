//! In-memory implementation of the repository traits.
//!
//! One mutex guards all state, so every write is atomic with respect to every
//! other write. That is the same guarantee the Postgres adapter gets from the
//! account row lock, which lets concurrency tests run against this store.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        idempotency::ProcessedEventRepoTrait,
        ledger::{Claimed, DebitOutcome, HistoryPage, LedgerRepoTrait, LedgerSnapshot},
        subscription::{AccountRepoTrait, StatusChange, StatusUpdate},
    },
    domain::entities::{
        account::{Account, AccountStatus, PlanTag},
        processed_event::{EventClaim, EventOutcome, ProcessedEvent},
        transaction::{Transaction, TransactionDraft},
    },
};

#[derive(Default)]
struct StoreState {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    events: HashMap<String, ProcessedEvent>,
    ticks: i64,
}

impl StoreState {
    /// Strictly increasing timestamps so history ordering is deterministic.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        Utc::now() + ChronoDuration::microseconds(self.ticks)
    }

    fn push_transaction(&mut self, draft: &TransactionDraft) -> Transaction {
        let tx = Transaction {
            id: Uuid::new_v4(),
            account_id: draft.account_id,
            amount: draft.amount,
            kind: draft.kind,
            description: draft.description.clone(),
            external_ref: draft.external_ref.clone(),
            created_at: self.next_timestamp(),
        };
        self.transactions.push(tx.clone());
        tx
    }

    fn find_by_ref(&self, account_id: Uuid, external_ref: &str) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|t| t.account_id == account_id && t.external_ref.as_deref() == Some(external_ref))
    }

    fn sum(&self, account_id: Uuid) -> i64 {
        self.transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .map(|t| t.amount)
            .sum()
    }

    /// Newest first; an unknown cursor yields an empty page, as in Postgres.
    fn page(&self, account_id: Uuid, page: &HistoryPage) -> Vec<Transaction> {
        let mut rows: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let cursor_key = page.before.map(|cursor| {
            rows.iter()
                .find(|t| t.id == cursor)
                .map(|c| (c.created_at, c.id))
        });
        let rows: Vec<Transaction> = match cursor_key {
            None => rows,
            Some(None) => Vec::new(),
            Some(Some(key)) => rows
                .into_iter()
                .filter(|t| (t.created_at, t.id) < key)
                .collect(),
        };

        rows.into_iter().take(page.limit as usize).collect()
    }

    fn insert_claim(&mut self, claim: &EventClaim, outcome: EventOutcome) -> bool {
        if self.events.contains_key(&claim.event_id) {
            return false;
        }
        self.events.insert(
            claim.event_id.clone(),
            ProcessedEvent {
                event_id: claim.event_id.clone(),
                event_type: claim.event_type.clone(),
                event_created_at: claim.event_created_at,
                outcome,
                processed_at: Utc::now(),
            },
        );
        true
    }
}

#[derive(Default)]
pub struct InMemoryBillingStore {
    state: Mutex<StoreState>,
    failing_writes: AtomicUsize,
    write_latency: Mutex<Option<Duration>>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            for account in accounts {
                state.accounts.insert(account.id, account);
            }
        }
        store
    }

    pub fn insert_account(&self, account: Account) {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(account.id, account);
    }

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.state.lock().unwrap().transactions.push(transaction);
    }

    /// Make the next `n` writes fail with a transient `Database` error.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Injected failures not yet consumed by a write.
    pub fn pending_failures(&self) -> usize {
        self.failing_writes.load(Ordering::SeqCst)
    }

    /// Delay every write before it touches state.
    pub fn set_write_latency(&self, latency: Duration) {
        *self.write_latency.lock().unwrap() = Some(latency);
    }

    pub fn account(&self, id: Uuid) -> Option<Account> {
        self.state.lock().unwrap().accounts.get(&id).cloned()
    }

    pub fn ledger_sum(&self, account_id: Uuid) -> i64 {
        self.state.lock().unwrap().sum(account_id)
    }

    pub fn transaction_count(&self, account_id: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .count()
    }

    pub fn total_transactions(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    pub fn outcome_of(&self, event_id: &str) -> Option<EventOutcome> {
        self.state
            .lock()
            .unwrap()
            .events
            .get(event_id)
            .map(|e| e.outcome)
    }

    async fn before_write(&self) -> AppResult<()> {
        let latency = *self.write_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AppError::Database("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerRepoTrait for InMemoryBillingStore {
    async fn append(
        &self,
        draft: &TransactionDraft,
        claim: Option<&EventClaim>,
    ) -> AppResult<Claimed<Transaction>> {
        self.before_write().await?;
        let mut state = self.state.lock().unwrap();

        if !state.accounts.contains_key(&draft.account_id) {
            return Err(AppError::NotFound);
        }
        if let Some(claim) = claim {
            if state.events.contains_key(&claim.event_id) {
                return Ok(Claimed::AlreadyProcessed);
            }
        }
        if let Some(external_ref) = draft.external_ref.as_deref() {
            if state.find_by_ref(draft.account_id, external_ref).is_some() {
                return Err(AppError::Conflict(
                    "A record with this reference already exists".into(),
                ));
            }
        }

        let tx = state.push_transaction(draft);
        if let Some(claim) = claim {
            state.insert_claim(claim, EventOutcome::Credited);
        }
        Ok(Claimed::Applied(tx))
    }

    async fn debit(&self, draft: &TransactionDraft) -> AppResult<DebitOutcome> {
        self.before_write().await?;
        let mut state = self.state.lock().unwrap();

        if !state.accounts.contains_key(&draft.account_id) {
            return Err(AppError::NotFound);
        }
        let key = draft
            .external_ref
            .as_deref()
            .ok_or_else(|| AppError::InvalidInput("Debit requires an idempotency key".into()))?;
        if let Some(existing) = state.find_by_ref(draft.account_id, key) {
            return Ok(DebitOutcome::Replayed(existing.clone()));
        }

        let available = state.sum(draft.account_id);
        if available + draft.amount < 0 {
            return Ok(DebitOutcome::Insufficient { available });
        }
        Ok(DebitOutcome::Debited(state.push_transaction(draft)))
    }

    async fn balance_of(&self, account_id: Uuid) -> AppResult<i64> {
        let state = self.state.lock().unwrap();
        if !state.accounts.contains_key(&account_id) {
            return Err(AppError::NotFound);
        }
        Ok(state.sum(account_id))
    }

    async fn history(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<Vec<Transaction>> {
        Ok(self.state.lock().unwrap().page(account_id, page))
    }

    async fn snapshot(&self, account_id: Uuid, page: &HistoryPage) -> AppResult<LedgerSnapshot> {
        let state = self.state.lock().unwrap();
        if !state.accounts.contains_key(&account_id) {
            return Err(AppError::NotFound);
        }
        Ok(LedgerSnapshot {
            balance: state.sum(account_id),
            transactions: state.page(account_id, page),
        })
    }

    async fn find_by_reference(
        &self,
        account_id: Uuid,
        external_ref: &str,
    ) -> AppResult<Option<Transaction>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .find_by_ref(account_id, external_ref)
            .cloned())
    }
}

#[async_trait]
impl AccountRepoTrait for InMemoryBillingStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<Account>> {
        Ok(self.account(id))
    }

    async fn create_if_absent(&self, id: Uuid, trial_ends_at: DateTime<Utc>) -> AppResult<Account> {
        self.before_write().await?;
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let account = state.accounts.entry(id).or_insert_with(|| Account {
            id,
            plan: PlanTag::Trial,
            status: AccountStatus::Trial,
            expires_at: Some(trial_ends_at),
            status_event_at: None,
            external_customer_ref: None,
            external_subscription_ref: None,
            created_at: now,
            updated_at: now,
        });
        Ok(account.clone())
    }

    async fn find_by_customer_ref(&self, customer_ref: &str) -> AppResult<Option<Account>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .values()
            .filter(|a| a.external_customer_ref.as_deref() == Some(customer_ref))
            .min_by_key(|a| a.created_at)
            .cloned())
    }

    async fn apply_status(
        &self,
        update: &StatusUpdate,
        claim: Option<&EventClaim>,
    ) -> AppResult<Claimed<StatusChange>> {
        self.before_write().await?;
        let mut state = self.state.lock().unwrap();

        let account = state
            .accounts
            .get(&update.account_id)
            .cloned()
            .ok_or(AppError::NotFound)?;
        let stale = account.is_stale(update.event_at);

        if let Some(claim) = claim {
            let outcome = if stale {
                EventOutcome::Stale
            } else {
                EventOutcome::StatusUpdated
            };
            if !state.insert_claim(claim, outcome) {
                return Ok(Claimed::AlreadyProcessed);
            }
        }
        if stale {
            return Ok(Claimed::Applied(StatusChange::Stale(account)));
        }

        let mut updated = account;
        updated.status = update.status;
        if let Some(expires_at) = update.expires_at {
            updated.expires_at = Some(expires_at);
        }
        updated.status_event_at = Some(update.event_at);
        if let Some(plan) = update.plan {
            updated.plan = plan;
        }
        if updated.external_customer_ref.is_none() {
            updated.external_customer_ref = update.customer_ref.clone();
        }
        if update.subscription_ref.is_some() {
            updated.external_subscription_ref = update.subscription_ref.clone();
        }
        updated.updated_at = Utc::now();

        state.accounts.insert(updated.id, updated.clone());
        Ok(Claimed::Applied(StatusChange::Updated(updated)))
    }

    async fn attach_customer_ref(&self, id: Uuid, customer_ref: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(account) = state.accounts.get_mut(&id) {
            if account.external_customer_ref.is_none() {
                account.external_customer_ref = Some(customer_ref.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessedEventRepoTrait for InMemoryBillingStore {
    async fn claim(&self, claim: &EventClaim, outcome: EventOutcome) -> AppResult<bool> {
        self.before_write().await?;
        Ok(self.state.lock().unwrap().insert_claim(claim, outcome))
    }

    async fn release(&self, event_id: &str, outcome: EventOutcome) -> AppResult<()> {
        if let Some(event) = self.state.lock().unwrap().events.get_mut(event_id) {
            event.outcome = outcome;
            event.processed_at = Utc::now();
        }
        Ok(())
    }

    async fn get(&self, event_id: &str) -> AppResult<Option<ProcessedEvent>> {
        Ok(self.state.lock().unwrap().events.get(event_id).cloned())
    }
}
