//! Test data factories.
//!
//! Each factory creates a complete, valid object with sensible defaults. Use
//! the closure parameter to override specific fields as needed. The event
//! builders return raw provider payloads ready to be signed and ingested.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use serde_json::json;
use uuid::Uuid;

use crate::{
    domain::entities::{
        account::{Account, AccountStatus, PlanTag},
        processed_event::EventClaim,
        transaction::{Transaction, TransactionKind},
    },
    infra::webhook_signature::{
        DEFAULT_TOLERANCE_SECS, HmacSignatureVerifier, sign_webhook_payload,
    },
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
const PERIOD_SECS: i64 = 30 * 24 * 60 * 60;

/// Fixed reference instant for tests that reason about time.
pub fn test_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_760_000_000, 0).unwrap()
}

/// Create a test account in an open trial.
pub fn create_test_account(overrides: impl FnOnce(&mut Account)) -> Account {
    let mut account = Account {
        id: Uuid::new_v4(),
        plan: PlanTag::Trial,
        status: AccountStatus::Trial,
        expires_at: Some(Utc::now() + Duration::days(14)),
        status_event_at: None,
        external_customer_ref: None,
        external_subscription_ref: None,
        created_at: test_time(),
        updated_at: test_time(),
    };
    overrides(&mut account);
    account
}

/// Create a test purchase credit of 100 points.
pub fn create_test_transaction(
    account_id: Uuid,
    overrides: impl FnOnce(&mut Transaction),
) -> Transaction {
    let mut transaction = Transaction {
        id: Uuid::new_v4(),
        account_id,
        amount: 100,
        kind: TransactionKind::Purchase,
        description: "Test purchase".to_string(),
        external_ref: None,
        created_at: Utc::now(),
    };
    overrides(&mut transaction);
    transaction
}

pub fn test_claim(event_id: &str) -> EventClaim {
    EventClaim {
        event_id: event_id.to_string(),
        event_type: "test.event".to_string(),
        event_created_at: test_time(),
    }
}

pub fn test_verifier() -> HmacSignatureVerifier {
    HmacSignatureVerifier::new(
        SecretString::from(TEST_WEBHOOK_SECRET),
        DEFAULT_TOLERANCE_SECS,
    )
}

/// Signature header for `payload`, timestamped now.
pub fn sign_test_payload(payload: &str) -> String {
    sign_webhook_payload(TEST_WEBHOOK_SECRET, Utc::now().timestamp(), payload).unwrap()
}

pub fn checkout_event(event_id: &str, account_id: &str, package_id: &str, session_id: &str) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": 1_760_000_000,
        "data": {"object": {
            "id": session_id,
            "object": "checkout.session",
            "mode": "payment",
            "customer": "cus_test",
            "payment_status": "paid",
            "metadata": {"account_id": account_id, "package_id": package_id}
        }}
    })
    .to_string()
}

pub fn subscription_event(
    event_id: &str,
    event_type: &str,
    account_id: &str,
    status: &str,
    created: i64,
) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "created": created,
        "data": {"object": {
            "id": "sub_test",
            "object": "subscription",
            "customer": "cus_test",
            "status": status,
            "current_period_end": created + PERIOD_SECS,
            "metadata": {"account_id": account_id}
        }}
    })
    .to_string()
}

pub fn invoice_event(event_id: &str, event_type: &str, account_id: &str, created: i64) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "created": created,
        "data": {"object": {
            "id": format!("in_{}", event_id),
            "object": "invoice",
            "customer": "cus_test",
            "subscription": "sub_test",
            "subscription_details": {"metadata": {"account_id": account_id}},
            "lines": {"data": [{"period": {"start": created, "end": created + PERIOD_SECS}}]}
        }}
    })
    .to_string()
}

pub fn unknown_event(event_id: &str) -> String {
    json!({
        "id": event_id,
        "type": "charge.dispute.created",
        "created": 1_760_000_000,
        "data": {"object": {"id": "dp_1"}}
    })
    .to_string()
}
