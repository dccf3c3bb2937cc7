use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// What happened to a claimed provider event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "event_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EventOutcome {
    /// Claimed, outcome not recorded yet.
    Claimed,
    Credited,
    StatusUpdated,
    /// Status update older than the one already applied.
    Stale,
    /// Unknown or irrelevant event category.
    Ignored,
    /// Missing or unusable metadata; acknowledged without effect.
    Dropped,
    /// The ledger already holds a credit for this checkout session.
    DuplicateReference,
}

/// Dedup record for a provider event. Never deleted.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub event_created_at: DateTime<Utc>,
    pub outcome: EventOutcome,
    pub processed_at: DateTime<Utc>,
}

/// A claim to be inserted together with an event's effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventClaim {
    pub event_id: String,
    pub event_type: String,
    pub event_created_at: DateTime<Utc>,
}
