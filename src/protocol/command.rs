// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Command grammar.
//!
//! # Inbound
//!
//! | Verb | Payload |
//! |------|---------|
//! | `SERVER` | server name |
//! | `RDATA` | `<topic> <position \| "batch"> <row>` |
//! | `POSITION` | `<topic> <position>` |
//! | `PING` | opaque token |
//! | `ERROR` | message |
//! | `REMOTE_SERVER_UP` | server name |
//!
//! Anything else parses to `None` and is ignored, so newer servers can add
//! verbs without breaking older clients.
//!
//! # Outbound
//!
//! See [`OutboundCommand`]; its `Display` impl is the wire form (without the
//! line terminator, which the transport appends).

use crate::error::{ReplicationError, Result};
use std::fmt;

/// Position marker meaning "more rows for this batch follow".
pub const BATCH_MARKER: &str = "batch";

/// A recognized inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Server(String),
    RData {
        topic: String,
        position: String,
        row: String,
    },
    Position {
        topic: String,
        position: String,
    },
    Ping(String),
    Error(String),
    RemoteServerUp(String),
}

impl Command {
    /// Parse one command line.
    ///
    /// Returns `Ok(None)` for unrecognized verbs and `Err` when a known verb
    /// is missing required fields.
    pub fn parse(line: &str) -> Result<Option<Command>> {
        let (verb, payload) = match line.split_once(' ') {
            Some((verb, payload)) => (verb, payload),
            None => (line, ""),
        };

        let command = match verb {
            "SERVER" => Command::Server(payload.to_string()),
            "RDATA" => {
                let mut parts = payload.splitn(3, ' ');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(topic), Some(position), Some(row)) if !topic.is_empty() => {
                        Command::RData {
                            topic: topic.to_string(),
                            position: position.to_string(),
                            row: row.to_string(),
                        }
                    }
                    _ => {
                        return Err(ReplicationError::Protocol(format!(
                            "RDATA needs topic, position and row: {}",
                            truncate(line)
                        )))
                    }
                }
            }
            "POSITION" => match payload.split_once(' ') {
                Some((topic, position)) if !topic.is_empty() => Command::Position {
                    topic: topic.to_string(),
                    position: position.to_string(),
                },
                _ => {
                    return Err(ReplicationError::Protocol(format!(
                        "POSITION needs topic and position: {}",
                        truncate(line)
                    )))
                }
            },
            "PING" => Command::Ping(payload.to_string()),
            "ERROR" => Command::Error(payload.to_string()),
            "REMOTE_SERVER_UP" => Command::RemoteServerUp(payload.to_string()),
            _ => return Ok(None),
        };

        Ok(Some(command))
    }

    /// The command verb, for logging and metrics.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Server(_) => "SERVER",
            Command::RData { .. } => "RDATA",
            Command::Position { .. } => "POSITION",
            Command::Ping(_) => "PING",
            Command::Error(_) => "ERROR",
            Command::RemoteServerUp(_) => "REMOTE_SERVER_UP",
        }
    }
}

/// Commands the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Identify this client.
    Name(String),
    /// Subscribe one topic from a position (legacy protocol only).
    Replicate { topic: String, position: String },
    /// Ask for current positions of every topic (current protocol only).
    ReplicateAll,
    /// Keepalive.
    Ping(String),
    FederationAck(String),
    RemoteServerUp(String),
    /// Report a local processing fault to the server.
    Error(String),
}

impl fmt::Display for OutboundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundCommand::Name(name) => write!(f, "NAME {}", name),
            OutboundCommand::Replicate { topic, position } => {
                write!(f, "REPLICATE {} {}", topic, position)
            }
            OutboundCommand::ReplicateAll => f.write_str("REPLICATE "),
            OutboundCommand::Ping(token) => write!(f, "PING {}", token),
            OutboundCommand::FederationAck(token) => write!(f, "FEDERATION_ACK {}", token),
            OutboundCommand::RemoteServerUp(name) => write!(f, "REMOTE_SERVER_UP {}", name),
            OutboundCommand::Error(message) => write!(f, "ERROR {}", message),
        }
    }
}

/// Shorten a line for log output.
pub(crate) fn truncate(line: &str) -> &str {
    const MAX: usize = 80;
    if line.len() <= MAX {
        return line;
    }
    let mut end = MAX;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}
