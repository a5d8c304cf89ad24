//! Event shapes - payload の型
//!
//! # 学習ポイント
//! - Associated Constants (`const EVENT_TYPE`) で event_type と型を対応付ける
//! - `#[serde(transparent)]` で同じ形の payload に別の型名を付ける
//! - null / 欠落フィールドは Option + default で吸収する

use serde::Deserialize;
use serde::de::DeserializeOwned;

/// TypedEvent は event_type と payload の型を対応付ける
pub trait TypedEvent: DeserializeOwned {
    /// outbox 行の `event_type` と一致する名前
    const EVENT_TYPE: &'static str;

    fn into_schedule(self) -> Schedule;
}

/// A payload that already carries the message to send.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenericMessage {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl GenericMessage {
    /// A generic payload is used only if it names a room or carries a body.
    pub fn is_usable(&self) -> bool {
        !absent(self.room_id.as_deref()) || !absent(self.body.as_deref())
    }
}

/// Timetable payload shared by the schedule events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub target_room_id: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub slots: Vec<SlotRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotRecord {
    #[serde(default)]
    pub slot_index: i64,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct DailyScheduleAnnounced(pub Schedule);

impl TypedEvent for DailyScheduleAnnounced {
    const EVENT_TYPE: &'static str = "DailyScheduleAnnounced";

    fn into_schedule(self) -> Schedule {
        self.0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct ScheduleUpdated(pub Schedule);

impl TypedEvent for ScheduleUpdated {
    const EVENT_TYPE: &'static str = "ScheduleUpdated";

    fn into_schedule(self) -> Schedule {
        self.0
    }
}

/// Missing or empty. Whitespace counts as content.
fn absent(value: Option<&str>) -> bool {
    value.is_none_or(str::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_with_only_room_is_usable() {
        let m: GenericMessage = serde_json::from_str(r#"{"room_id":"!a:b"}"#).unwrap();
        assert!(m.is_usable());
    }

    #[test]
    fn generic_without_room_or_body_is_not_usable() {
        let m: GenericMessage =
            serde_json::from_str(r#"{"format":"plain","body":""}"#).unwrap();
        assert!(!m.is_usable());
    }

    #[test]
    fn schedule_tolerates_nulls_and_missing_fields() {
        let s: DailyScheduleAnnounced = serde_json::from_str(
            r#"{"target_room_id":"!r:x","template":null,"slots":[{"slot_index":2,"venue":null}]}"#,
        )
        .unwrap();
        let s = s.into_schedule();
        assert_eq!(s.target_room_id.as_deref(), Some("!r:x"));
        assert!(s.template.is_none());
        assert_eq!(s.slots.len(), 1);
        assert_eq!(s.slots[0].slot_index, 2);
        assert!(s.slots[0].course_code.is_none());
    }
}
