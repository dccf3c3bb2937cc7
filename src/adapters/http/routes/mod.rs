pub mod accounts;
pub mod packages;
pub mod webhooks;

use axum::{Router, middleware};

use crate::adapters::http::{app_state::AppState, middleware::require_service_token};

pub fn router(app_state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/webhooks", webhooks::router())
        .merge(packages::router())
        .merge(accounts::router().route_layer(middleware::from_fn_with_state(
            app_state,
            require_service_token,
        )))
}
