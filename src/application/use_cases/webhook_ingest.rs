//! Provider webhook ingestion.
//!
//! Deliveries are at-least-once and unordered. Every effect is committed in the
//! same store transaction as the event's claim, so a redelivery either finds
//! the claim and stops, or finds nothing and starts over from scratch.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display};
use tracing::{error, info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::webhook_verifier::WebhookSignatureVerifier,
        use_cases::{
            balance::{BalanceAuthority, CreditInput},
            idempotency::IdempotencyGuard,
            ledger::Claimed,
            subscription::{StatusChange, StatusUpdate, SubscriptionStateMachine},
        },
    },
    domain::entities::{
        account::AccountStatus,
        package::PackageCatalog,
        processed_event::{EventClaim, EventOutcome},
        provider_event::{
            CheckoutCompleted, InvoiceSnapshot, ProviderEvent, ProviderEventKind,
            SubscriptionSnapshot,
        },
        transaction::TransactionKind,
    },
};

pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Acknowledgement returned to the provider (HTTP 200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Ack {
    Processed,
    Duplicate,
    Ignored,
    Dropped,
}

impl Ack {
    fn for_outcome(outcome: EventOutcome) -> Self {
        match outcome {
            EventOutcome::Credited | EventOutcome::StatusUpdated => Ack::Processed,
            EventOutcome::Stale | EventOutcome::Ignored => Ack::Ignored,
            EventOutcome::Dropped => Ack::Dropped,
            EventOutcome::Claimed | EventOutcome::DuplicateReference => Ack::Duplicate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Terminal: the delivery is not from the provider (HTTP 400).
    BadSignature,
    /// Nothing was committed; the provider should redeliver (HTTP 500).
    Retryable(String),
}

/// A status transition derived from a provider event.
struct ProviderStatus<'a> {
    account_id: Option<&'a str>,
    customer_ref: Option<&'a str>,
    subscription_ref: Option<&'a str>,
    status: AccountStatus,
    expires_at: Option<DateTime<Utc>>,
}

impl<'a> ProviderStatus<'a> {
    fn from_subscription(sub: &'a SubscriptionSnapshot, status: AccountStatus) -> Self {
        Self {
            account_id: sub.account_id.as_deref(),
            customer_ref: sub.customer_ref.as_deref(),
            subscription_ref: Some(sub.subscription_ref.as_str()),
            status,
            expires_at: sub.current_period_end,
        }
    }

    fn from_invoice(invoice: &'a InvoiceSnapshot, status: AccountStatus) -> Self {
        Self {
            account_id: invoice.account_id.as_deref(),
            customer_ref: invoice.customer_ref.as_deref(),
            subscription_ref: invoice.subscription_ref.as_deref(),
            status,
            expires_at: invoice.period_end,
        }
    }
}

#[derive(Clone)]
pub struct WebhookIngestion {
    verifier: Arc<dyn WebhookSignatureVerifier>,
    guard: IdempotencyGuard,
    balance: Arc<BalanceAuthority>,
    subscriptions: Arc<SubscriptionStateMachine>,
    catalog: Arc<PackageCatalog>,
    timeout: Duration,
}

impl WebhookIngestion {
    pub fn new(
        verifier: Arc<dyn WebhookSignatureVerifier>,
        guard: IdempotencyGuard,
        balance: Arc<BalanceAuthority>,
        subscriptions: Arc<SubscriptionStateMachine>,
        catalog: Arc<PackageCatalog>,
        timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            guard,
            balance,
            subscriptions,
            catalog,
            timeout,
        }
    }

    /// Verify, deduplicate and apply one webhook delivery.
    ///
    /// `Ok` means the provider may stop redelivering. Only transient failures
    /// after verification (including the overall timeout) ask for a retry.
    pub async fn ingest(
        &self,
        payload: &str,
        signature_header: Option<&str>,
    ) -> Result<Ack, RejectReason> {
        let Some(signature_header) = signature_header else {
            warn!("Webhook delivery without signature header");
            return Err(RejectReason::BadSignature);
        };
        if let Err(e) = self.verifier.verify(payload, signature_header) {
            warn!(error = %e, "Webhook signature verification failed");
            return Err(RejectReason::BadSignature);
        }

        match tokio::time::timeout(self.timeout, self.process(payload)).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(e)) => {
                error!(error = %e, retryable = true, "Webhook processing failed, asking provider to retry");
                Err(RejectReason::Retryable(e.to_string()))
            }
            Err(_) => {
                error!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    retryable = true,
                    "Webhook processing timed out, asking provider to retry"
                );
                Err(RejectReason::Retryable("webhook processing timed out".into()))
            }
        }
    }

    /// Returns `Err` only for retryable failures.
    async fn process(&self, payload: &str) -> AppResult<Ack> {
        let event = match ProviderEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                // Nothing to claim without an id; redelivery cannot fix it either
                error!(error = %e, retryable = false, "Dropping unparseable webhook event");
                return Ok(Ack::Dropped);
            }
        };

        if self.guard.is_processed(&event.id).await? {
            info!(event_id = %event.id, event_type = %event.event_type, "Webhook event already processed");
            return Ok(Ack::Duplicate);
        }

        match self.dispatch(&event).await {
            Ok(ack) => Ok(ack),
            Err(e) if e.is_retryable() => Err(e),
            Err(e) => {
                error!(
                    error = %e,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    retryable = false,
                    "Webhook event could not be applied, dropping"
                );
                self.settle(&event.claim(), EventOutcome::Dropped).await
            }
        }
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    async fn dispatch(&self, event: &ProviderEvent) -> AppResult<Ack> {
        let claim = event.claim();
        match &event.kind {
            ProviderEventKind::CheckoutCompleted(checkout) => {
                self.on_checkout_completed(checkout, &claim).await
            }
            ProviderEventKind::SubscriptionChanged(sub) => {
                let Some(status) = sub.status.as_deref().and_then(AccountStatus::from_provider)
                else {
                    warn!(
                        subscription_ref = %sub.subscription_ref,
                        provider_status = ?sub.status,
                        "Subscription event without a recognised status"
                    );
                    return self
                        .drop_event(&claim, "missing or unrecognised subscription status")
                        .await;
                };
                self.on_status(ProviderStatus::from_subscription(sub, status), &claim)
                    .await
            }
            ProviderEventKind::SubscriptionDeleted(sub) => {
                let change = ProviderStatus {
                    expires_at: None,
                    ..ProviderStatus::from_subscription(sub, AccountStatus::Cancelled)
                };
                self.on_status(change, &claim).await
            }
            ProviderEventKind::InvoicePaid(invoice) | ProviderEventKind::InvoicePaymentFailed(invoice)
                if invoice.subscription_ref.is_none() =>
            {
                // One-off invoices (point purchases) never touch subscription status
                info!(invoice_ref = %invoice.invoice_ref, "Ignoring invoice without a subscription");
                self.settle(&claim, EventOutcome::Ignored).await
            }
            ProviderEventKind::InvoicePaid(invoice) => {
                self.on_status(
                    ProviderStatus::from_invoice(invoice, AccountStatus::Active),
                    &claim,
                )
                .await
            }
            ProviderEventKind::InvoicePaymentFailed(invoice) => {
                // Grace period: the provider cancels through a subscription event
                let change = ProviderStatus {
                    expires_at: None,
                    ..ProviderStatus::from_invoice(invoice, AccountStatus::PastDue)
                };
                self.on_status(change, &claim).await
            }
            ProviderEventKind::Unknown => {
                info!("Ignoring unhandled webhook event type");
                self.settle(&claim, EventOutcome::Ignored).await
            }
        }
    }

    async fn on_checkout_completed(
        &self,
        checkout: &CheckoutCompleted,
        claim: &EventClaim,
    ) -> AppResult<Ack> {
        if !checkout.is_paid() {
            info!(
                session_id = %checkout.session_id,
                payment_status = ?checkout.payment_status,
                "Checkout completed without captured payment, ignoring"
            );
            return self.settle(claim, EventOutcome::Ignored).await;
        }

        let Some(package_id) = checkout.package_id.as_deref() else {
            if checkout.subscription_ref.is_some() {
                // Subscription checkouts are driven by subscription and invoice events
                return self.settle(claim, EventOutcome::Ignored).await;
            }
            return self.drop_event(claim, "checkout session without package_id").await;
        };
        let Some(package) = self.catalog.get(package_id) else {
            error!(package_id, "Checkout references unknown package");
            return self.drop_event(claim, "unknown package").await;
        };
        if let Some(points) = checkout.points.filter(|p| *p != package.points) {
            warn!(
                package_id,
                metadata_points = points,
                catalog_points = package.points,
                "Checkout metadata points disagree with catalog, using catalog"
            );
        }

        let Some(account) = self
            .subscriptions
            .resolve_account(
                checkout.account_id.as_deref(),
                checkout.customer_ref.as_deref(),
            )
            .await?
        else {
            return self.drop_event(claim, "checkout without a known account").await;
        };

        let input = CreditInput {
            account_id: account.id,
            amount: package.points,
            kind: TransactionKind::Purchase,
            description: package.name.clone(),
            external_ref: Some(checkout.session_id.clone()),
        };

        match self.balance.credit_for_event(&input, claim).await {
            Ok(Claimed::Applied(_)) => {
                if let Some(customer_ref) = checkout.customer_ref.as_deref() {
                    // The credit is committed; a failure here must not trigger a redelivery
                    if let Err(e) = self
                        .subscriptions
                        .attach_customer_ref(account.id, customer_ref)
                        .await
                    {
                        warn!(error = %e, account_id = %account.id, "Failed to attach customer reference");
                    }
                }
                Ok(Ack::Processed)
            }
            Ok(Claimed::AlreadyProcessed) => Ok(Ack::Duplicate),
            Err(AppError::Conflict(_)) => {
                info!(
                    session_id = %checkout.session_id,
                    account_id = %account.id,
                    "Checkout session already credited under another event"
                );
                self.settle(claim, EventOutcome::DuplicateReference).await
            }
            Err(e) => Err(e),
        }
    }

    async fn on_status(&self, change: ProviderStatus<'_>, claim: &EventClaim) -> AppResult<Ack> {
        let Some(account) = self
            .subscriptions
            .resolve_account(change.account_id, change.customer_ref)
            .await?
        else {
            return self
                .drop_event(claim, "status event without a known account")
                .await;
        };

        let update = StatusUpdate::new(account.id, change.status, claim.event_created_at)
            .with_expiry(change.expires_at)
            .with_refs(
                change.customer_ref.map(str::to_string),
                change.subscription_ref.map(str::to_string),
            );

        Ok(
            match self
                .subscriptions
                .apply_provider_update(&update, claim)
                .await?
            {
                Claimed::Applied(StatusChange::Updated(_)) => Ack::Processed,
                Claimed::Applied(StatusChange::Stale(_)) => Ack::Ignored,
                Claimed::AlreadyProcessed => Ack::Duplicate,
            },
        )
    }

    async fn drop_event(&self, claim: &EventClaim, reason: &str) -> AppResult<Ack> {
        error!(
            event_id = %claim.event_id,
            event_type = %claim.event_type,
            reason,
            "Dropping webhook event with missing or unusable metadata"
        );
        self.settle(claim, EventOutcome::Dropped).await
    }

    /// Claim an event that ends without effects.
    async fn settle(&self, claim: &EventClaim, outcome: EventOutcome) -> AppResult<Ack> {
        let result = self.guard.settle_without_effect(claim, outcome).await?;
        Ok(if result.acquired {
            Ack::for_outcome(outcome)
        } else {
            Ack::Duplicate
        })
    }
}
