use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::{
    app_error::AppResult,
    domain::entities::processed_event::{EventClaim, EventOutcome, ProcessedEvent},
};

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait ProcessedEventRepoTrait: Send + Sync {
    /// Insert the claim row if absent. Returns false if the event id exists.
    async fn claim(&self, claim: &EventClaim, outcome: EventOutcome) -> AppResult<bool>;

    /// Record an outcome on an existing claim. Never removes the claim.
    async fn release(&self, event_id: &str, outcome: EventOutcome) -> AppResult<()>;

    async fn get(&self, event_id: &str) -> AppResult<Option<ProcessedEvent>>;
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimResult {
    pub acquired: bool,
}

/// Gate that lets each provider event id produce effects at most once, forever.
///
/// Effectful handlers do not call [`IdempotencyGuard::claim`]: they pass the
/// [`EventClaim`] to the store write so the claim commits with the effect.
/// The standalone calls here cover events that end without a ledger or status
/// write (ignored, dropped, duplicate reference).
#[derive(Clone)]
pub struct IdempotencyGuard {
    repo: Arc<dyn ProcessedEventRepoTrait>,
}

impl IdempotencyGuard {
    pub fn new(repo: Arc<dyn ProcessedEventRepoTrait>) -> Self {
        Self { repo }
    }

    #[instrument(skip(self, claim), fields(event_id = %claim.event_id))]
    pub async fn claim(&self, claim: &EventClaim) -> AppResult<ClaimResult> {
        let acquired = self.repo.claim(claim, EventOutcome::Claimed).await?;
        Ok(ClaimResult { acquired })
    }

    #[instrument(skip(self))]
    pub async fn release(&self, event_id: &str, outcome: EventOutcome) -> AppResult<()> {
        self.repo.release(event_id, outcome).await
    }

    /// Fast-path check before dispatch. A `false` here is not a claim; the
    /// write that follows still has to win the claim insert.
    pub async fn is_processed(&self, event_id: &str) -> AppResult<bool> {
        Ok(self.repo.get(event_id).await?.is_some())
    }

    /// Claim an event that ends without effects and record why in one step.
    pub async fn settle_without_effect(
        &self,
        claim: &EventClaim,
        outcome: EventOutcome,
    ) -> AppResult<ClaimResult> {
        let acquired = self.repo.claim(claim, outcome).await?;
        Ok(ClaimResult { acquired })
    }
}
