//! Records read from and written to the store.

use chrono::{DateTime, Utc};

use super::{ClaimStatus, EventId};

/// A row of an outbox table, as written by a producer.
///
/// Read-only to this system: it is never updated or deleted here.
/// `id` is kept raw so a malformed id can still be logged with the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    pub id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            payload: payload.into(),
            created_at,
        }
    }
}

/// Delivery state of one event (one row of the claim table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimState {
    pub event_id: EventId,

    /// Starts at 1 on the first claim and only ever increases.
    pub attempts: u32,

    pub status: ClaimStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a claim.
///
/// `AlreadyTerminal` is not an error: the event has converged and the caller
/// just skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed { attempts: u32 },
    AlreadyTerminal,
}

impl ClaimOutcome {
    pub fn is_claimed(self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }

    /// Attempt count after this claim; `None` when nothing was claimed.
    pub fn attempts(self) -> Option<u32> {
        match self {
            ClaimOutcome::Claimed { attempts } => Some(attempts),
            ClaimOutcome::AlreadyTerminal => None,
        }
    }
}
