// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed row records and their decoders.
//!
//! Each record type is tied to exactly one [`Topic`] and decodes a single raw
//! `RDATA` payload (a JSON document) into an immutable value. Decoders are
//! pure: they never touch the connection and fail with
//! [`ReplicationError::MalformedRow`] on structurally invalid input.
//!
//! | Record | Topic | Payload |
//! |--------|-------|---------|
//! | [`EventStreamRow`] | `events` | tagged `["ev"\|"state", [...]]` or legacy positional array |
//! | [`FederationStreamRow`] | `federation` | `[type_id, row, row, ...]` |
//! | [`ReceiptStreamRow`] | `receipts` | `[room_id, receipt_type, user_id, event_id, data]` |
//! | [`TypingStreamRow`] | `typing` | `[room_id, [user_id, ...]]` |
//! | [`PresenceStreamRow`] | `presence` | `[user_id, state, ...timestamps, status_msg, currently_active]` |

pub mod events;
pub mod federation;
pub mod presence;
pub mod receipts;
pub mod typing;

pub use events::{EventRowKind, EventStreamRow, PayloadShape};
pub use federation::{EduEvent, FederationStreamRow, PresenceState};
pub use presence::PresenceStreamRow;
pub use receipts::ReceiptStreamRow;
pub use typing::TypingStreamRow;

use crate::error::{ReplicationError, Result};
use crate::topic::Topic;
use serde_json::Value;

/// A record type that can be bound as a replication stream.
pub trait ReplicationRow: Sized + Send + Sync + 'static {
    /// The topic this record is decoded from.
    const TOPIC: Topic;

    /// Decode one raw row payload.
    fn decode(raw: &str) -> Result<Self>;
}

/// Parse a payload that must be a JSON array.
pub(crate) fn parse_array(topic: Topic, raw: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(other) => Err(ReplicationError::malformed(
            topic,
            format!("expected a JSON array, got {}", json_type(&other)),
        )),
        Err(e) => Err(ReplicationError::malformed(topic, format!("invalid JSON: {}", e))),
    }
}

/// Required string element at `idx`.
pub(crate) fn required_str(topic: Topic, items: &[Value], idx: usize, field: &str) -> Result<String> {
    match items.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ReplicationError::malformed(
            topic,
            format!("{} must be a string, got {}", field, json_type(other)),
        )),
        None => Err(ReplicationError::malformed(topic, format!("missing {}", field))),
    }
}

/// Optional string element at `idx` (missing or `null` both give `None`).
pub(crate) fn optional_str(
    topic: Topic,
    items: &[Value],
    idx: usize,
    field: &str,
) -> Result<Option<String>> {
    match items.get(idx) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ReplicationError::malformed(
            topic,
            format!("{} must be a string or null, got {}", field, json_type(other)),
        )),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
