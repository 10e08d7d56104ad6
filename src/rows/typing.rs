// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `typing` topic rows: `[room_id, [user_id, ...]]`.

use super::{json_type, parse_array, required_str, ReplicationRow};
use crate::error::{ReplicationError, Result};
use crate::topic::Topic;
use serde_json::Value;

const TOPIC: Topic = Topic::Typing;

/// Users currently typing in a room (an empty list means nobody is).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingStreamRow {
    pub room_id: String,
    pub user_ids: Vec<String>,
}

impl ReplicationRow for TypingStreamRow {
    const TOPIC: Topic = TOPIC;

    fn decode(raw: &str) -> Result<Self> {
        let items = parse_array(TOPIC, raw)?;
        let room_id = required_str(TOPIC, &items, 0, "room_id")?;

        let user_ids = match items.get(1) {
            Some(Value::Array(users)) => users
                .iter()
                .map(|u| match u {
                    Value::String(s) => Ok(s.clone()),
                    other => Err(ReplicationError::malformed(
                        TOPIC,
                        format!("user id must be a string, got {}", json_type(other)),
                    )),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(ReplicationError::malformed(
                    TOPIC,
                    format!("user_ids must be an array, got {}", json_type(other)),
                ))
            }
            None => return Err(ReplicationError::malformed(TOPIC, "missing user_ids")),
        };

        Ok(Self { room_id, user_ids })
    }
}
