use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::{adapters::http::app_state::AppState, domain::entities::package::Package};

#[derive(Serialize)]
struct PackagesResponse<'a> {
    packages: &'a [Package],
}

pub fn router() -> Router<AppState> {
    Router::new().route("/packages", get(list_packages))
}

/// GET /api/packages
async fn list_packages(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(PackagesResponse {
        packages: app_state.catalog.packages(),
    })
    .into_response()
}
