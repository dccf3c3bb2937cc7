use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        balance::BalanceAuthority, idempotency::IdempotencyGuard,
        subscription::SubscriptionStateMachine, webhook_ingest::WebhookIngestion,
    },
    infra::{
        catalog::load_catalog, config::AppConfig, postgres_persistence,
        webhook_signature::HmacSignatureVerifier,
    },
};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let catalog = Arc::new(load_catalog(config.package_catalog_path.as_deref())?);
    let postgres_arc =
        Arc::new(postgres_persistence(&config.database_url, config.db_max_connections).await?);

    let balance = Arc::new(BalanceAuthority::new(
        postgres_arc.clone(),
        config.debit_retry,
    ));
    let subscriptions = Arc::new(SubscriptionStateMachine::new(
        postgres_arc.clone(),
        config.trial_days,
    ));
    let verifier = Arc::new(HmacSignatureVerifier::new(
        config.webhook_secret.clone(),
        config.webhook_tolerance_secs,
    ));
    let webhooks = Arc::new(WebhookIngestion::new(
        verifier,
        IdempotencyGuard::new(postgres_arc.clone()),
        balance.clone(),
        subscriptions.clone(),
        catalog.clone(),
        config.webhook_timeout,
    ));

    Ok(AppState {
        config: Arc::new(config),
        balance,
        subscriptions,
        webhooks,
        catalog,
    })
}

pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "points_ledger=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_level(true)
            .pretty()
    });

    // Structured JSON logs for log shippers
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
