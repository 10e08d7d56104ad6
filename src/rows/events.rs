// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `events` topic rows.
//!
//! Two payload shapes exist on the wire:
//!
//! ```text
//! tagged:  ["ev",    [event_id, room_id, type, state_key, redacts, relates_to?]]
//!          ["state", [room_id, type, state_key, event_id]]
//! legacy:  [event_id, room_id, type, state_key, redacts]
//! ```
//!
//! The tagged shape is tried first; it is recognized by its explicit
//! discriminator followed by a nested array. Anything else is parsed as the
//! legacy positional shape. The detected shape is kept on the record.

use super::{optional_str, parse_array, required_str, ReplicationRow};
use crate::error::{ReplicationError, Result};
use crate::topic::Topic;
use serde_json::Value;

const TOPIC: Topic = Topic::Events;

/// Which generation of the wire format a row arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// Flat positional array without a kind tag.
    Legacy,
    /// `[kind, [fields...]]`.
    Tagged,
}

/// What an events row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRowKind {
    /// A new event was persisted.
    Event,
    /// Current room state changed.
    State,
    /// Legacy rows carry no kind.
    Unknown,
}

/// A decoded `events` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStreamRow {
    pub kind: EventRowKind,
    pub shape: PayloadShape,
    /// `None` only for state rows that remove a piece of state.
    pub event_id: Option<String>,
    pub room_id: String,
    pub event_type: String,
    pub state_key: Option<String>,
    pub redacts_event_id: Option<String>,
    pub relates_to_event_id: Option<String>,
}

impl EventStreamRow {
    pub fn is_state(&self) -> bool {
        self.kind == EventRowKind::State || self.state_key.is_some()
    }

    fn from_tagged(tag: &str, fields: &[Value]) -> Result<Self> {
        match tag {
            "ev" => Ok(Self {
                kind: EventRowKind::Event,
                shape: PayloadShape::Tagged,
                event_id: Some(required_str(TOPIC, fields, 0, "event_id")?),
                room_id: required_str(TOPIC, fields, 1, "room_id")?,
                event_type: required_str(TOPIC, fields, 2, "type")?,
                state_key: optional_str(TOPIC, fields, 3, "state_key")?,
                redacts_event_id: optional_str(TOPIC, fields, 4, "redacts")?,
                relates_to_event_id: optional_str(TOPIC, fields, 5, "relates_to")?,
            }),
            "state" => Ok(Self {
                kind: EventRowKind::State,
                shape: PayloadShape::Tagged,
                room_id: required_str(TOPIC, fields, 0, "room_id")?,
                event_type: required_str(TOPIC, fields, 1, "type")?,
                state_key: Some(required_str(TOPIC, fields, 2, "state_key")?),
                event_id: optional_str(TOPIC, fields, 3, "event_id")?,
                redacts_event_id: None,
                relates_to_event_id: None,
            }),
            other => Err(ReplicationError::malformed(
                TOPIC,
                format!("unknown row kind {:?}", other),
            )),
        }
    }

    fn from_legacy(items: &[Value]) -> Result<Self> {
        if items.len() < 5 {
            return Err(ReplicationError::malformed(
                TOPIC,
                format!("legacy row needs 5 fields, got {}", items.len()),
            ));
        }

        Ok(Self {
            kind: EventRowKind::Unknown,
            shape: PayloadShape::Legacy,
            event_id: Some(required_str(TOPIC, items, 0, "event_id")?),
            room_id: required_str(TOPIC, items, 1, "room_id")?,
            event_type: required_str(TOPIC, items, 2, "type")?,
            state_key: optional_str(TOPIC, items, 3, "state_key")?,
            redacts_event_id: optional_str(TOPIC, items, 4, "redacts")?,
            relates_to_event_id: None,
        })
    }
}

impl ReplicationRow for EventStreamRow {
    const TOPIC: Topic = TOPIC;

    fn decode(raw: &str) -> Result<Self> {
        let items = parse_array(TOPIC, raw)?;

        if let [Value::String(tag), Value::Array(fields)] = items.as_slice() {
            return Self::from_tagged(tag, fields);
        }

        Self::from_legacy(&items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tagged_event() {
        let row = EventStreamRow::decode(r#"["ev",["$e1","!r1","m.room.message","",null]]"#).unwrap();

        assert_eq!(row.kind, EventRowKind::Event);
        assert_eq!(row.shape, PayloadShape::Tagged);
        assert_eq!(row.event_id.as_deref(), Some("$e1"));
        assert_eq!(row.room_id, "!r1");
        assert_eq!(row.event_type, "m.room.message");
        assert_eq!(row.state_key.as_deref(), Some(""));
        assert_eq!(row.redacts_event_id, None);
        assert_eq!(row.relates_to_event_id, None);
    }

    #[test]
    fn test_decode_tagged_event_with_relation() {
        let row = EventStreamRow::decode(
            r#"["ev",["$e2","!r1","m.reaction",null,null,"$e1"]]"#,
        )
        .unwrap();
        assert_eq!(row.state_key, None);
        assert_eq!(row.relates_to_event_id.as_deref(), Some("$e1"));
        assert!(!row.is_state());
    }

    #[test]
    fn test_decode_tagged_state() {
        let row = EventStreamRow::decode(
            r#"["state",["!r1","m.room.member","@alice:example.org","$e3"]]"#,
        )
        .unwrap();

        assert_eq!(row.kind, EventRowKind::State);
        assert_eq!(row.room_id, "!r1");
        assert_eq!(row.state_key.as_deref(), Some("@alice:example.org"));
        assert_eq!(row.event_id.as_deref(), Some("$e3"));
        assert!(row.is_state());
    }

    #[test]
    fn test_decode_state_removal_has_no_event() {
        let row = EventStreamRow::decode(r#"["state",["!r1","m.room.topic","",null]]"#).unwrap();
        assert_eq!(row.event_id, None);
    }

    #[test]
    fn test_decode_legacy_positional() {
        let row = EventStreamRow::decode(
            r#"["$e1","!r1","m.room.redaction",null,"$e0"]"#,
        )
        .unwrap();

        assert_eq!(row.kind, EventRowKind::Unknown);
        assert_eq!(row.shape, PayloadShape::Legacy);
        assert_eq!(row.event_id.as_deref(), Some("$e1"));
        assert_eq!(row.redacts_event_id.as_deref(), Some("$e0"));
    }

    #[test]
    fn test_decode_unknown_tag_is_malformed() {
        let err = EventStreamRow::decode(r#"["xx",["$e1"]]"#).unwrap_err();
        assert!(matches!(err, ReplicationError::MalformedRow { .. }));
        assert!(err.to_string().contains("xx"));
    }

    #[test]
    fn test_decode_short_legacy_is_malformed() {
        assert!(EventStreamRow::decode(r#"["$e1","!r1"]"#).is_err());
    }

    #[test]
    fn test_decode_wrong_field_type_is_malformed() {
        let err = EventStreamRow::decode(r#"["ev",[1,"!r1","m.room.message",null,null]]"#).unwrap_err();
        assert!(err.to_string().contains("event_id"));
    }

    #[test]
    fn test_decode_not_json() {
        assert!(EventStreamRow::decode("not json").is_err());
    }
}
