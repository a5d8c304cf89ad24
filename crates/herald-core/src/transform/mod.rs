//! Transform - outbox payload から CanonicalMessage への変換
//!
//! 副作用なしの純粋関数。ストアにもネットワークにも触らないので、
//! 全パターンを単体テストで網羅できる。
//!
//! # フロー
//! 1. generic shape（room_id / body / format）として decode を試す
//! 2. room_id か body が空でなければ、それをそのまま使う
//! 3. それ以外は event_type で型付き decoder に振り分ける
//! 4. 最後に format を正規化し、必須フィールドを検証する

pub mod render;
pub mod shapes;

use crate::domain::{CanonicalMessage, MessageFormat, TransformError};

use self::render::render_schedule;
use self::shapes::{DailyScheduleAnnounced, GenericMessage, ScheduleUpdated, TypedEvent};

/// A payload resolved to one of the known shapes.
#[derive(Debug, Clone)]
pub enum DecodedEvent {
    Generic(GenericMessage),
    DailyScheduleAnnounced(DailyScheduleAnnounced),
    ScheduleUpdated(ScheduleUpdated),
}

/// Resolve `(event_type, payload)` to a known shape.
pub fn decode(event_type: &str, payload: &[u8]) -> Result<DecodedEvent, TransformError> {
    let generic = serde_json::from_slice::<GenericMessage>(payload);
    if let Ok(message) = &generic
        && message.is_usable()
    {
        return Ok(DecodedEvent::Generic(message.clone()));
    }

    match event_type {
        DailyScheduleAnnounced::EVENT_TYPE => {
            decode_typed(payload).map(DecodedEvent::DailyScheduleAnnounced)
        }
        ScheduleUpdated::EVENT_TYPE => decode_typed(payload).map(DecodedEvent::ScheduleUpdated),
        other => match generic {
            Err(err) => Err(TransformError::Decode(err)),
            Ok(_) => Err(TransformError::Unsupported(other.to_string())),
        },
    }
}

fn decode_typed<T: TypedEvent>(payload: &[u8]) -> Result<T, TransformError> {
    serde_json::from_slice(payload).map_err(TransformError::Decode)
}

impl DecodedEvent {
    /// Build the message and apply the shared validation.
    pub fn into_message(self) -> Result<CanonicalMessage, TransformError> {
        match self {
            DecodedEvent::Generic(m) => finish(
                m.room_id.unwrap_or_default(),
                m.body.unwrap_or_default(),
                m.format.as_deref().unwrap_or(""),
            ),
            DecodedEvent::DailyScheduleAnnounced(e) => schedule_message(e),
            DecodedEvent::ScheduleUpdated(e) => schedule_message(e),
        }
    }
}

fn schedule_message<T: TypedEvent>(event: T) -> Result<CanonicalMessage, TransformError> {
    let schedule = event.into_schedule();
    let room_id = schedule
        .target_room_id
        .as_deref()
        .map(str::trim)
        .unwrap_or("");
    if room_id.is_empty() {
        return Err(TransformError::MissingRoom);
    }
    let body = render_schedule(&schedule);
    finish(room_id.to_string(), body, MessageFormat::Markdown.as_str())
}

fn finish(room_id: String, body: String, format: &str) -> Result<CanonicalMessage, TransformError> {
    if room_id.is_empty() {
        return Err(TransformError::MissingRoom);
    }
    if body.is_empty() {
        return Err(TransformError::MissingField("body"));
    }
    let format = format.parse::<MessageFormat>()?;
    Ok(CanonicalMessage {
        room_id,
        body,
        format,
    })
}

/// Map a raw outbox event to the message to deliver.
pub fn transform(event_type: &str, payload: &[u8]) -> Result<CanonicalMessage, TransformError> {
    decode(event_type, payload)?.into_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn bytes(v: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn daily_schedule_renders_markdown_body() {
        let payload = bytes(json!({
            "target_room_id": "!timetable:example.org",
            "template": "Today",
            "date": "2024-05-01",
            "slots": [{
                "slot_index": 1,
                "course_code": "CS101",
                "start_time": "09:00",
                "end_time": "10:00",
                "venue": "Room A",
                "status": "confirmed"
            }]
        }));

        let msg = transform("DailyScheduleAnnounced", &payload).unwrap();
        assert_eq!(msg.room_id, "!timetable:example.org");
        assert_eq!(
            msg.body,
            "Today\nDate: 2024-05-01\n1. CS101 (09:00-10:00) @ Room A [confirmed]"
        );
        assert_eq!(msg.format, MessageFormat::Markdown);
    }

    #[test]
    fn schedule_updated_uses_default_title_without_date() {
        let payload = bytes(json!({
            "target_room_id": " !t:x ",
            "slots": [{"slot_index": 4, "course_code": "PH110", "status": "cancelled"}]
        }));
        let msg = transform("ScheduleUpdated", &payload).unwrap();
        assert_eq!(msg.room_id, "!t:x");
        assert_eq!(msg.body, "Timetable update\n4. PH110 (---) @ - [cancelled]");
        assert_eq!(msg.format, MessageFormat::Markdown);
    }

    #[test]
    fn generic_payload_passes_through_regardless_of_event_type() {
        let payload = bytes(json!({
            "room_id": "!ops:example.org",
            "body": "  *deploy* done  ",
            "format": " Markdown "
        }));
        for event_type in ["DailyScheduleAnnounced", "OrderShipped", ""] {
            let msg = transform(event_type, &payload).unwrap();
            assert_eq!(msg.room_id, "!ops:example.org");
            assert_eq!(msg.body, "  *deploy* done  ");
            assert_eq!(msg.format, MessageFormat::Markdown);
        }
    }

    #[test]
    fn same_input_gives_same_output() {
        let payload = bytes(json!({"room_id": "!a:b", "body": "hi", "format": "plain"}));
        let first = transform("Anything", &payload).unwrap();
        let second = transform("Anything", &payload).unwrap();
        assert_eq!(first, second);

        let bad = b"not json".to_vec();
        let e1 = transform("Anything", &bad).unwrap_err().to_string();
        let e2 = transform("Anything", &bad).unwrap_err().to_string();
        assert_eq!(e1, e2);
    }

    #[test]
    fn whitespace_body_is_content() {
        let payload = bytes(json!({"room_id": "!a:b", "body": "   ", "format": "plain"}));
        let msg = transform("Anything", &payload).unwrap();
        assert_eq!(msg.body, "   ");
        assert_eq!(msg.format, MessageFormat::Plain);
    }

    #[rstest]
    #[case::empty_body(json!({"room_id": "!a:b", "body": "", "format": "plain"}), "body")]
    #[case::null_body(json!({"room_id": "!a:b", "body": null, "format": "plain"}), "body")]
    fn empty_body_is_missing(#[case] payload: serde_json::Value, #[case] field: &str) {
        let err = transform("Anything", &bytes(payload)).unwrap_err();
        assert!(matches!(err, TransformError::MissingField(f) if f == field));
    }

    #[test]
    fn latex_format_is_rejected() {
        let payload = bytes(json!({"room_id": "!a:b", "body": "x^2", "format": "latex"}));
        let err = transform("Anything", &payload).unwrap_err();
        assert!(matches!(err, TransformError::InvalidFormat(f) if f == "latex"));
    }

    #[rstest]
    #[case::missing_body(json!({"room_id": "!a:b", "format": "plain"}))]
    #[case::missing_room(json!({"body": "hi", "format": "plain"}))]
    #[case::missing_format(json!({"room_id": "!a:b", "body": "hi"}))]
    #[case::blank_format(json!({"room_id": "!a:b", "body": "hi", "format": "  "}))]
    fn incomplete_generic_payloads_are_invalid(#[case] payload: serde_json::Value) {
        assert!(transform("Anything", &bytes(payload)).is_err());
    }

    #[test]
    fn schedule_without_room_is_missing_room() {
        let payload = bytes(json!({"template": "Today", "slots": []}));
        let err = transform("DailyScheduleAnnounced", &payload).unwrap_err();
        assert!(matches!(err, TransformError::MissingRoom));
    }

    #[test]
    fn schedule_decode_failure_is_decode_error() {
        let payload = bytes(json!({"target_room_id": "!a:b", "slots": "not-a-list"}));
        let err = transform("ScheduleUpdated", &payload).unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }

    #[test]
    fn unknown_event_type_is_unsupported() {
        let payload = bytes(json!({"order_id": 17}));
        let err = transform("OrderShipped", &payload).unwrap_err();
        assert!(matches!(err, TransformError::Unsupported(t) if t == "OrderShipped"));
    }

    #[test]
    fn unknown_event_type_with_garbage_is_decode_error() {
        let err = transform("OrderShipped", b"\x00\x01").unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }
}
