use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    domain::entities::package::PackageCatalog,
    infra::config::AppConfig,
    use_cases::{
        balance::BalanceAuthority, subscription::SubscriptionStateMachine,
        webhook_ingest::WebhookIngestion,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub balance: Arc<BalanceAuthority>,
    pub subscriptions: Arc<SubscriptionStateMachine>,
    pub webhooks: Arc<WebhookIngestion>,
    pub catalog: Arc<PackageCatalog>,
}

impl FromRef<AppState> for Arc<BalanceAuthority> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.balance.clone()
    }
}

impl FromRef<AppState> for Arc<SubscriptionStateMachine> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.subscriptions.clone()
    }
}
