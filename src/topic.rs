// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication topics and positions.
//!
//! A topic is one logical change feed on the server (`events`, `receipts`, ...).
//! Positions are opaque, server-issued strings; the only value the client ever
//! makes up itself is [`LATEST`], used when subscribing "from now".

use std::fmt;
use std::str::FromStr;

/// Position sentinel meaning "start from the newest row".
///
/// Only ever sent in outbound subscribe requests; the server never returns it.
pub const LATEST: &str = "NOW";

/// Known replication topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// No longer emitted by current servers.
    CurrentStateDeltas,
    Events,
    Federation,
    Backfill,
    Presence,
    Typing,
    Receipts,
    PushRules,
    Pushers,
    Caches,
    PublicRooms,
    DeviceLists,
    ToDevice,
    TagAccountData,
    AccountData,
    Groups,
    UserSignature,
}

impl Topic {
    /// Every known topic.
    pub const ALL: [Topic; 17] = [
        Topic::CurrentStateDeltas,
        Topic::Events,
        Topic::Federation,
        Topic::Backfill,
        Topic::Presence,
        Topic::Typing,
        Topic::Receipts,
        Topic::PushRules,
        Topic::Pushers,
        Topic::Caches,
        Topic::PublicRooms,
        Topic::DeviceLists,
        Topic::ToDevice,
        Topic::TagAccountData,
        Topic::AccountData,
        Topic::Groups,
        Topic::UserSignature,
    ];

    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::CurrentStateDeltas => "current_state_deltas",
            Topic::Events => "events",
            Topic::Federation => "federation",
            Topic::Backfill => "backfill",
            Topic::Presence => "presence",
            Topic::Typing => "typing",
            Topic::Receipts => "receipts",
            Topic::PushRules => "push_rules",
            Topic::Pushers => "pushers",
            Topic::Caches => "caches",
            Topic::PublicRooms => "public_rooms",
            Topic::DeviceLists => "device_lists",
            Topic::ToDevice => "to_device",
            Topic::TagAccountData => "tag_account_data",
            Topic::AccountData => "account_data",
            Topic::Groups => "groups",
            Topic::UserSignature => "user_signature",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire name matches no known topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTopic(pub String);

impl fmt::Display for UnknownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown replication topic: {}", self.0)
    }
}

impl std::error::Error for UnknownTopic {}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

/// A position update for one topic, as carried by a `POSITION` line.
///
/// The topic is kept as the raw wire string: servers may announce topics
/// this client has no variant for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPosition {
    pub topic: String,
    pub position: String,
}

impl StreamPosition {
    pub fn new(topic: impl Into<String>, position: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            position: position.into(),
        }
    }
}
