//! Payment provider webhook events.
//!
//! The provider envelope is `{id, type, created, data: {object}}`. Only the fields
//! the engine acts on are extracted; everything else in the payload is ignored so
//! new provider fields never break ingestion.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::app_error::AppError;
use crate::domain::entities::processed_event::EventClaim;

/// Convert a Unix timestamp to a UTC datetime
fn timestamp_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

fn opt_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Reads an id that may be either a plain string or an expanded object.
fn opt_id(value: &Value) -> Option<String> {
    opt_str(value).or_else(|| opt_str(&value["id"]))
}

/// Integers sometimes arrive as strings inside provider metadata.
fn opt_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    pub id: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub kind: ProviderEventKind,
}

/// Closed set of event categories the engine acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEventKind {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionChanged(SubscriptionSnapshot),
    SubscriptionDeleted(SubscriptionSnapshot),
    InvoicePaid(InvoiceSnapshot),
    InvoicePaymentFailed(InvoiceSnapshot),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub session_id: String,
    pub account_id: Option<String>,
    pub package_id: Option<String>,
    pub points: Option<i64>,
    pub customer_ref: Option<String>,
    pub subscription_ref: Option<String>,
    pub payment_status: Option<String>,
}

impl CheckoutCompleted {
    /// Whether funds were actually captured for this session.
    pub fn is_paid(&self) -> bool {
        match self.payment_status.as_deref() {
            None => true,
            Some(status) => matches!(status, "paid" | "no_payment_required"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub subscription_ref: String,
    pub customer_ref: Option<String>,
    pub account_id: Option<String>,
    pub status: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSnapshot {
    pub invoice_ref: String,
    pub subscription_ref: Option<String>,
    pub customer_ref: Option<String>,
    pub account_id: Option<String>,
    pub period_end: Option<DateTime<Utc>>,
}

impl ProviderEvent {
    /// Parse a raw (already signature-verified) webhook body.
    ///
    /// Fails with `MalformedEvent` only when the envelope itself is unusable.
    /// Missing category metadata is left as `None` for the pipeline to judge.
    pub fn parse(payload: &str) -> Result<Self, AppError> {
        let event: Value = serde_json::from_str(payload)
            .map_err(|e| AppError::MalformedEvent(format!("invalid JSON: {}", e)))?;

        let id = opt_str(&event["id"])
            .ok_or_else(|| AppError::MalformedEvent("missing event id".into()))?;
        let event_type = opt_str(&event["type"])
            .ok_or_else(|| AppError::MalformedEvent("missing event type".into()))?;
        let created_at = event["created"]
            .as_i64()
            .and_then(timestamp_to_utc)
            .ok_or_else(|| AppError::MalformedEvent("missing event timestamp".into()))?;

        let object = &event["data"]["object"];
        let kind = match event_type.as_str() {
            "checkout.session.completed" => {
                ProviderEventKind::CheckoutCompleted(parse_checkout(object)?)
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                ProviderEventKind::SubscriptionChanged(parse_subscription(object)?)
            }
            "customer.subscription.deleted" => {
                ProviderEventKind::SubscriptionDeleted(parse_subscription(object)?)
            }
            "invoice.paid" | "invoice.payment_succeeded" => {
                ProviderEventKind::InvoicePaid(parse_invoice(object)?)
            }
            "invoice.payment_failed" => {
                ProviderEventKind::InvoicePaymentFailed(parse_invoice(object)?)
            }
            _ => ProviderEventKind::Unknown,
        };

        Ok(Self {
            id,
            event_type,
            created_at,
            kind,
        })
    }

    pub fn claim(&self) -> EventClaim {
        EventClaim {
            event_id: self.id.clone(),
            event_type: self.event_type.clone(),
            event_created_at: self.created_at,
        }
    }
}

fn parse_checkout(session: &Value) -> Result<CheckoutCompleted, AppError> {
    let session_id = opt_str(&session["id"])
        .ok_or_else(|| AppError::MalformedEvent("checkout session without id".into()))?;
    let metadata = &session["metadata"];

    Ok(CheckoutCompleted {
        session_id,
        account_id: opt_str(&metadata["account_id"])
            .or_else(|| opt_str(&session["client_reference_id"])),
        package_id: opt_str(&metadata["package_id"]),
        points: opt_i64(&metadata["points"]),
        customer_ref: opt_id(&session["customer"]),
        subscription_ref: opt_id(&session["subscription"]),
        payment_status: opt_str(&session["payment_status"]),
    })
}

fn parse_subscription(subscription: &Value) -> Result<SubscriptionSnapshot, AppError> {
    let subscription_ref = opt_str(&subscription["id"])
        .ok_or_else(|| AppError::MalformedEvent("subscription without id".into()))?;

    // Newer API versions moved the period onto the subscription items
    let current_period_end = subscription["current_period_end"]
        .as_i64()
        .or_else(|| {
            subscription["items"]["data"]
                .as_array()
                .and_then(|items| items.first())
                .and_then(|item| item["current_period_end"].as_i64())
        })
        .and_then(timestamp_to_utc);

    Ok(SubscriptionSnapshot {
        subscription_ref,
        customer_ref: opt_id(&subscription["customer"]),
        account_id: opt_str(&subscription["metadata"]["account_id"]),
        status: opt_str(&subscription["status"]),
        current_period_end,
    })
}

fn parse_invoice(invoice: &Value) -> Result<InvoiceSnapshot, AppError> {
    let invoice_ref = opt_str(&invoice["id"])
        .ok_or_else(|| AppError::MalformedEvent("invoice without id".into()))?;

    let account_id = opt_str(&invoice["subscription_details"]["metadata"]["account_id"])
        .or_else(|| {
            opt_str(&invoice["parent"]["subscription_details"]["metadata"]["account_id"])
        })
        .or_else(|| opt_str(&invoice["metadata"]["account_id"]));

    let subscription_ref = opt_id(&invoice["subscription"])
        .or_else(|| opt_id(&invoice["parent"]["subscription_details"]["subscription"]));

    let period_end = invoice["lines"]["data"]
        .as_array()
        .and_then(|lines| lines.first())
        .and_then(|line| line["period"]["end"].as_i64())
        .and_then(timestamp_to_utc);

    Ok(InvoiceSnapshot {
        invoice_ref,
        subscription_ref,
        customer_ref: opt_id(&invoice["customer"]),
        account_id,
        period_end,
    })
}
