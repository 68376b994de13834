//! Event model and wire encoding.
//!
//! An event is any JSON object. Batches of exactly one event go out as that
//! object; larger batches go out as a JSON array.

use crate::error::{RelayError, RelayResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single producer event.
pub type Event = Map<String, Value>;

/// Field that carries the relay identity on every flushed event.
pub const DEFAULT_IDENTITY_FIELD: &str = "uuid";

/// One line of a recording: acceptance time plus the untouched event body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    #[serde(rename = "t")]
    pub recorded_at: DateTime<Utc>,
    #[serde(rename = "d")]
    pub data: Event,
}

/// Parse one input line into an event. Anything but a JSON object is rejected.
pub fn parse_event(line: &str) -> RelayResult<Event> {
    match serde_json::from_str::<Value>(line)? {
        Value::Object(event) => Ok(event),
        other => Err(RelayError::InvalidEvent(format!(
            "expected a JSON object, got {}",
            value_kind(&other)
        ))),
    }
}

/// Stamp every event with the identity, replacing any existing value.
pub fn tag_identity(events: &mut [Event], field: &str, identity: &str) {
    for event in events {
        event.insert(field.to_string(), Value::String(identity.to_string()));
    }
}

/// Serialize a batch: a lone event as an object, otherwise an array.
pub fn encode_batch(events: &[Event]) -> RelayResult<Vec<u8>> {
    match events {
        [] => Err(RelayError::InvalidEvent("cannot encode an empty batch".into())),
        [single] => Ok(serde_json::to_vec(single)?),
        many => Ok(serde_json::to_vec(many)?),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> Event {
        match value {
            Value::Object(map) => map,
            _ => panic!("test event must be an object"),
        }
    }

    #[test]
    fn test_parse_event_accepts_objects() {
        let parsed = parse_event(r#"{"event":"kill","unit":42}"#).unwrap();
        assert_eq!(parsed["event"], "kill");
        assert_eq!(parsed["unit"], 42);
    }

    #[test]
    fn test_parse_event_rejects_truncated_json() {
        assert!(matches!(parse_event(r#"{"event":"#), Err(RelayError::Json(_))));
    }

    #[test]
    fn test_parse_event_rejects_non_objects() {
        assert!(matches!(parse_event("[1,2]"), Err(RelayError::InvalidEvent(_))));
        assert!(matches!(parse_event("\"kill\""), Err(RelayError::InvalidEvent(_))));
        assert!(matches!(parse_event("null"), Err(RelayError::InvalidEvent(_))));
    }

    #[test]
    fn test_tag_identity_overwrites_existing_field() {
        let mut events = vec![
            event(json!({"event": "kill", "uuid": "spoofed"})),
            event(json!({"event": "death"})),
        ];

        tag_identity(&mut events, DEFAULT_IDENTITY_FIELD, "abc-123");

        assert_eq!(events[0]["uuid"], "abc-123");
        assert_eq!(events[1]["uuid"], "abc-123");
        assert_eq!(events[0]["event"], "kill");
    }

    #[test]
    fn test_encode_single_event_as_object() {
        let payload = encode_batch(&[event(json!({"event": "kill"}))]).unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, json!({"event": "kill"}));
    }

    #[test]
    fn test_encode_many_events_as_array() {
        let payload = encode_batch(&[
            event(json!({"event": "kill"})),
            event(json!({"event": "death"})),
        ])
        .unwrap();
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, json!([{"event": "kill"}, {"event": "death"}]));
    }

    #[test]
    fn test_encode_empty_batch_is_an_error() {
        assert!(encode_batch(&[]).is_err());
    }

    #[test]
    fn test_recorded_event_uses_short_keys() {
        let recorded = RecordedEvent {
            recorded_at: "2024-05-01T12:00:00Z".parse().unwrap(),
            data: event(json!({"event": "kill"})),
        };

        let value = serde_json::to_value(&recorded).unwrap();
        assert_eq!(value["d"], json!({"event": "kill"}));
        assert!(value["t"].as_str().unwrap().starts_with("2024-05-01T12:00:00"));
    }

    #[test]
    fn test_recorded_event_accepts_offset_timestamps() {
        let line = r#"{"t":"2024-05-01T14:00:00.5+02:00","d":{"event":"death"}}"#;
        let recorded: RecordedEvent = serde_json::from_str(line).unwrap();
        assert_eq!(
            recorded.recorded_at,
            "2024-05-01T12:00:00.5Z".parse::<DateTime<Utc>>().unwrap()
        );
    }
}
