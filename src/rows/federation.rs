// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `federation` topic rows.
//!
//! A federation payload is a type id followed by any number of rows of that
//! type, which are accumulated into one composite record:
//!
//! | Type id | Row | Collected into |
//! |---------|-----|----------------|
//! | `k` | `{"key": [...], "edu": {...}}` | `keyed_edus` (by key) |
//! | `e` | `{...edu...}` | `edus` |
//! | `p` | `{...presence state...}` | `presence` |
//! | `d` | `{"destination": "..."}` | `devices` |
//!
//! Keyed EDUs sharing a key within one payload overwrite each other (the last
//! one wins) while every other collection is append-only.

use super::{json_type, parse_array, ReplicationRow};
use crate::error::{ReplicationError, Result};
use crate::topic::Topic;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

const TOPIC: Topic = Topic::Federation;

/// An ephemeral data unit queued for a remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EduEvent {
    pub edu_type: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub content: Map<String, Value>,
}

/// Presence of one user, as sent to remote servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    pub user_id: String,
    pub state: String,
    #[serde(default)]
    pub last_active_ts: u64,
    #[serde(default)]
    pub last_federation_update_ts: u64,
    #[serde(default)]
    pub last_user_sync_ts: u64,
    #[serde(default)]
    pub status_msg: Option<String>,
    #[serde(default)]
    pub currently_active: bool,
}

#[derive(Deserialize)]
struct KeyedEduRow {
    key: Vec<String>,
    edu: EduEvent,
}

#[derive(Deserialize)]
struct DeviceRow {
    destination: String,
}

/// A decoded `federation` row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FederationStreamRow {
    pub keyed_edus: HashMap<Vec<String>, EduEvent>,
    pub edus: Vec<EduEvent>,
    pub presence: Vec<PresenceState>,
    /// Destinations with pending device list updates.
    pub devices: Vec<String>,
}

impl FederationStreamRow {
    pub fn is_empty(&self) -> bool {
        self.keyed_edus.is_empty()
            && self.edus.is_empty()
            && self.presence.is_empty()
            && self.devices.is_empty()
    }
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ReplicationError::malformed(TOPIC, format!("invalid {} row: {}", what, e)))
}

impl ReplicationRow for FederationStreamRow {
    const TOPIC: Topic = TOPIC;

    fn decode(raw: &str) -> Result<Self> {
        let mut items = parse_array(TOPIC, raw)?.into_iter();

        let type_id = match items.next() {
            Some(Value::String(id)) => id,
            Some(other) => {
                return Err(ReplicationError::malformed(
                    TOPIC,
                    format!("type id must be a string, got {}", json_type(&other)),
                ))
            }
            None => return Err(ReplicationError::malformed(TOPIC, "empty row")),
        };

        let mut row = FederationStreamRow::default();

        for item in items {
            match type_id.as_str() {
                "k" => {
                    let keyed: KeyedEduRow = from_value(item, "keyed EDU")?;
                    if row.keyed_edus.insert(keyed.key.clone(), keyed.edu).is_some() {
                        debug!(key = ?keyed.key, "Keyed EDU replaced an earlier one in the same row");
                    }
                }
                "e" => row.edus.push(from_value(item, "EDU")?),
                "p" => row.presence.push(from_value(item, "presence")?),
                "d" => {
                    let device: DeviceRow = from_value(item, "device")?;
                    row.devices.push(device.destination);
                }
                other => {
                    return Err(ReplicationError::malformed(
                        TOPIC,
                        format!("unknown type id {:?}", other),
                    ))
                }
            }
        }

        Ok(row)
    }
}
