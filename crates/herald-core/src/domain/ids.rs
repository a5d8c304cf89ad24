//! Event identifiers.
//!
//! outbox テーブルの `id` は UUID。claim テーブルの `event_id` も同じ値を使う。
//! 文字列のまま持ち回ると不正な id がストアまで届いてしまうので、
//! 境界で一度だけ `EventId::parse` する。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use uuid::Uuid;

use super::errors::StoreError;

/// Identifier of an outbox event (and of its claim row).
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Parse a raw id as read from an outbox table.
    ///
    /// Surrounding whitespace is ignored; anything that is not a UUID is
    /// reported as `StoreError::InvalidId`.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| StoreError::InvalidId(raw.to_string()))
    }

    /// ULID を UUID として埋め込む（生成順に並ぶ id になる）
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(Uuid::from(ulid))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for EventId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hyphenated_uuid() {
        let id = EventId::parse("6f1c2f4e-8a47-4c41-9d4b-7f0e4f0b2a10").unwrap();
        assert_eq!(id.to_string(), "6f1c2f4e-8a47-4c41-9d4b-7f0e4f0b2a10");
    }

    #[test]
    fn trims_before_parsing() {
        let id = EventId::parse("  6f1c2f4e-8a47-4c41-9d4b-7f0e4f0b2a10\n").unwrap();
        assert_eq!(id.to_string(), "6f1c2f4e-8a47-4c41-9d4b-7f0e4f0b2a10");
    }

    #[test]
    fn malformed_id_is_invalid_id() {
        let err = EventId::parse("evt-42").unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(raw) if raw == "evt-42"));
    }

    #[test]
    fn ulid_backed_ids_sort_by_creation_time() {
        let a = EventId::from_ulid(Ulid::from_parts(1_000, 7));
        let b = EventId::from_ulid(Ulid::from_parts(2_000, 3));
        assert!(a < b);
        assert_eq!(a.as_uuid(), Uuid::from(Ulid::from_parts(1_000, 7)));
    }
}
