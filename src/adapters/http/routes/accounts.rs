use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    domain::entities::{account::AccountStatus, transaction::TransactionKind},
    use_cases::{balance::DebitInput, ledger::HistoryPage, subscription::StatusView},
};

#[derive(Deserialize)]
struct OpenAccountPayload {
    account_id: Uuid,
}

#[derive(Deserialize)]
struct ReconcilePayload {
    status: AccountStatus,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct DebitPayload {
    amount: i64,
    kind: TransactionKind,
    description: String,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct PointsQuery {
    limit: Option<i64>,
    before: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(open_account))
        .route("/accounts/{id}/status", get(account_status))
        .route("/accounts/{id}/reconcile", post(reconcile))
        .route("/accounts/{id}/debits", post(debit))
        .route("/accounts/{id}/debits/{key}", get(get_debit))
        .route("/accounts/{id}/points", get(points))
}

/// POST /api/accounts
async fn open_account(
    State(app_state): State<AppState>,
    Json(payload): Json<OpenAccountPayload>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let account = app_state
        .subscriptions
        .open_account(payload.account_id, now)
        .await?;
    Ok((StatusCode::CREATED, Json(StatusView::of(&account, now))))
}

/// GET /api/accounts/{id}/status
async fn account_status(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let view = app_state.subscriptions.status_of(id, Utc::now()).await?;
    Ok(Json(view))
}

/// POST /api/accounts/{id}/reconcile
async fn reconcile(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReconcilePayload>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let account = app_state
        .subscriptions
        .reconcile(id, payload.status, payload.expires_at, now)
        .await?;
    Ok(Json(StatusView::of(&account, now)))
}

/// POST /api/accounts/{id}/debits
async fn debit(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DebitPayload>,
) -> AppResult<impl IntoResponse> {
    let transaction = app_state
        .balance
        .debit(&DebitInput {
            account_id: id,
            amount: payload.amount,
            kind: payload.kind,
            description: payload.description,
            idempotency_key: payload.idempotency_key,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /api/accounts/{id}/debits/{key}
async fn get_debit(
    State(app_state): State<AppState>,
    Path((id, key)): Path<(Uuid, String)>,
) -> AppResult<impl IntoResponse> {
    let transaction = app_state.balance.find_by_reference(id, &key).await?;
    Ok(Json(transaction))
}

/// GET /api/accounts/{id}/points?limit=&before=
async fn points(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PointsQuery>,
) -> AppResult<impl IntoResponse> {
    let page = HistoryPage::new(query.limit, query.before);
    let statement = app_state.balance.statement(id, &page).await?;
    Ok(Json(statement))
}
