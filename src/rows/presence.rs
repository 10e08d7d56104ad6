// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `presence` topic rows.
//!
//! ```text
//! [user_id, state, last_active_ts, last_federation_update_ts,
//!  last_user_sync_ts, status_msg, currently_active]
//! ```

use super::federation::PresenceState;
use super::{json_type, optional_str, parse_array, required_str, ReplicationRow};
use crate::error::{ReplicationError, Result};
use crate::topic::Topic;
use serde_json::Value;

const TOPIC: Topic = Topic::Presence;

/// A decoded `presence` row.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceStreamRow(pub PresenceState);

impl PresenceStreamRow {
    pub fn state(&self) -> &PresenceState {
        &self.0
    }
}

fn timestamp(items: &[Value], idx: usize, field: &str) -> Result<u64> {
    match items.get(idx) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| {
            ReplicationError::malformed(TOPIC, format!("{} must be a non-negative integer", field))
        }),
        Some(other) => Err(ReplicationError::malformed(
            TOPIC,
            format!("{} must be a number, got {}", field, json_type(other)),
        )),
    }
}

impl ReplicationRow for PresenceStreamRow {
    const TOPIC: Topic = TOPIC;

    fn decode(raw: &str) -> Result<Self> {
        let items = parse_array(TOPIC, raw)?;

        let currently_active = match items.get(6) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ReplicationError::malformed(
                    TOPIC,
                    format!("currently_active must be a bool, got {}", json_type(other)),
                ))
            }
        };

        Ok(Self(PresenceState {
            user_id: required_str(TOPIC, &items, 0, "user_id")?,
            state: required_str(TOPIC, &items, 1, "state")?,
            last_active_ts: timestamp(&items, 2, "last_active_ts")?,
            last_federation_update_ts: timestamp(&items, 3, "last_federation_update_ts")?,
            last_user_sync_ts: timestamp(&items, 4, "last_user_sync_ts")?,
            status_msg: optional_str(TOPIC, &items, 5, "status_msg")?,
            currently_active,
        }))
    }
}
