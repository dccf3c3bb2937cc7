use std::net::SocketAddr;
use std::time::Duration;

use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;

use crate::application::use_cases::{
    balance::RetryPolicy, subscription::DEFAULT_TRIAL_DAYS,
    webhook_ingest::DEFAULT_WEBHOOK_TIMEOUT,
};
use crate::infra::webhook_signature::DEFAULT_TOLERANCE_SECS;

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Shared secret the payment provider signs webhooks with.
    pub webhook_secret: SecretString,
    pub webhook_tolerance_secs: i64,
    /// Upper bound on one webhook delivery; past it the provider is asked to retry.
    pub webhook_timeout: Duration,
    /// Bearer token internal services present on `/api/accounts/**`.
    pub internal_api_token: SecretString,
    pub trial_days: i64,
    /// JSON package catalog. The built-in catalog is used when unset.
    pub package_catalog_path: Option<String>,
    /// Emit JSON logs instead of the pretty console format.
    pub log_json: bool,
    pub debit_retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let database_url: String = get_env("DATABASE_URL");
        let db_max_connections: u32 = get_env_default("DB_MAX_CONNECTIONS", 10);

        let webhook_secret = SecretString::from(get_env::<String>("PAYMENT_WEBHOOK_SECRET"));
        let webhook_tolerance_secs: i64 =
            get_env_default("WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS);
        let webhook_timeout_ms: u64 = get_env_default(
            "WEBHOOK_TIMEOUT_MS",
            DEFAULT_WEBHOOK_TIMEOUT.as_millis() as u64,
        );

        let internal_api_token = SecretString::from(get_env::<String>("INTERNAL_API_TOKEN"));
        let trial_days: i64 = get_env_default("TRIAL_DAYS", DEFAULT_TRIAL_DAYS);
        let package_catalog_path: Option<String> = std::env::var("PACKAGE_CATALOG_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let log_json: bool = get_env_default("LOG_JSON", false);

        let defaults = RetryPolicy::default();
        let debit_retry = RetryPolicy {
            attempts: get_env_default("DEBIT_RETRY_ATTEMPTS", defaults.attempts),
            base_delay_ms: get_env_default("DEBIT_RETRY_BASE_MS", defaults.base_delay_ms),
        };

        Self {
            bind_addr,
            database_url,
            db_max_connections,
            webhook_secret,
            webhook_tolerance_secs,
            webhook_timeout: Duration::from_millis(webhook_timeout_ms),
            internal_api_token,
            trial_days,
            package_catalog_path,
            log_json,
            debit_retry,
        }
    }
}
