// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `receipts` topic rows: `[room_id, receipt_type, user_id, event_id, data]`.

use super::{json_type, parse_array, required_str, ReplicationRow};
use crate::error::{ReplicationError, Result};
use crate::topic::Topic;
use serde_json::{Map, Value};

const TOPIC: Topic = Topic::Receipts;

/// A decoded `receipts` row.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptStreamRow {
    pub room_id: String,
    pub receipt_type: String,
    pub user_id: String,
    pub event_id: String,
    /// Receipt body, e.g. `{"ts": 1590000000000}`.
    pub data: Map<String, Value>,
}

impl ReplicationRow for ReceiptStreamRow {
    const TOPIC: Topic = TOPIC;

    fn decode(raw: &str) -> Result<Self> {
        let items = parse_array(TOPIC, raw)?;
        if items.len() != 5 {
            return Err(ReplicationError::malformed(
                TOPIC,
                format!("expected 5 fields, got {}", items.len()),
            ));
        }

        let data = match &items[4] {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(ReplicationError::malformed(
                    TOPIC,
                    format!("data must be an object, got {}", json_type(other)),
                ))
            }
        };

        Ok(Self {
            room_id: required_str(TOPIC, &items, 0, "room_id")?,
            receipt_type: required_str(TOPIC, &items, 1, "receipt_type")?,
            user_id: required_str(TOPIC, &items, 2, "user_id")?,
            event_id: required_str(TOPIC, &items, 3, "event_id")?,
            data,
        })
    }
}
