//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` wires the real use cases to one `InMemoryBillingStore`
//! so handler tests exercise the same code paths as production.

use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::SecretString;

use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        balance::{BalanceAuthority, RetryPolicy},
        idempotency::IdempotencyGuard,
        subscription::{DEFAULT_TRIAL_DAYS, SubscriptionStateMachine},
        webhook_ingest::{DEFAULT_WEBHOOK_TIMEOUT, WebhookIngestion},
    },
    domain::entities::{account::Account, package::PackageCatalog, transaction::Transaction},
    infra::{config::AppConfig, webhook_signature::DEFAULT_TOLERANCE_SECS},
    test_utils::{InMemoryBillingStore, TEST_WEBHOOK_SECRET, test_verifier},
};

pub const TEST_API_TOKEN: &str = "test-internal-token";

pub fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url: "postgres://localhost/points_ledger_test".to_string(),
        db_max_connections: 1,
        webhook_secret: SecretString::from(TEST_WEBHOOK_SECRET),
        webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
        webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        internal_api_token: SecretString::from(TEST_API_TOKEN),
        trial_days: DEFAULT_TRIAL_DAYS,
        package_catalog_path: None,
        log_json: false,
        debit_retry: RetryPolicy {
            attempts: 2,
            base_delay_ms: 1,
        },
    }
}

pub struct TestAppStateBuilder {
    store: Arc<InMemoryBillingStore>,
    catalog: PackageCatalog,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryBillingStore::new()),
            catalog: PackageCatalog::builtin(),
        }
    }

    pub fn with_account(self, account: Account) -> Self {
        self.store.insert_account(account);
        self
    }

    pub fn with_transaction(self, transaction: Transaction) -> Self {
        self.store.insert_transaction(transaction);
        self
    }

    pub fn with_catalog(mut self, catalog: PackageCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Handle on the backing store for assertions after requests.
    pub fn store(&self) -> Arc<InMemoryBillingStore> {
        self.store.clone()
    }

    pub fn build(self) -> AppState {
        let config = test_config();
        let catalog = Arc::new(self.catalog);
        let balance = Arc::new(BalanceAuthority::new(
            self.store.clone(),
            config.debit_retry,
        ));
        let subscriptions = Arc::new(SubscriptionStateMachine::new(
            self.store.clone(),
            config.trial_days,
        ));
        let webhooks = Arc::new(WebhookIngestion::new(
            Arc::new(test_verifier()),
            IdempotencyGuard::new(self.store.clone()),
            balance.clone(),
            subscriptions.clone(),
            catalog.clone(),
            config.webhook_timeout,
        ));

        AppState {
            config: Arc::new(config),
            balance,
            subscriptions,
            webhooks,
            catalog,
        }
    }
}
