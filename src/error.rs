// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication client.
//!
//! Errors are categorized by where they surface. Transport faults are
//! recovered locally by the reconnect supervisor and only reach callers of
//! the send operation that hit them; data and usage faults are reported
//! synchronously to whoever triggered them.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Connect` | Yes | DNS or socket failure while (re)connecting |
//! | `NoAddress` | Yes | Host resolved, but not to an IPv4 address |
//! | `Send` | Yes | Outbound line could not be written |
//! | `Redis` | Yes | Pub/sub broker command failed |
//! | `NotConnected` | Yes | Send attempted with no open channel (no reconnect is scheduled) |
//! | `MalformedRow` | No | Row payload does not match its topic's shape |
//! | `Protocol` | No | Inbound command line with a known verb is malformed |
//! | `UnsupportedOperation` | No | Operation not valid for the configured protocol version |
//! | `AlreadyBound` | No | A stream for this row type is already bound |
//! | `Config` | No | Configuration invalid |
//! | `Shutdown` | No | Client was explicitly stopped |

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur while talking to the replication server.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Connecting (or reconnecting) to the server failed.
    ///
    /// The reconnect supervisor retries these indefinitely.
    #[error("Connect error ({address}): {message}")]
    Connect { address: String, message: String },

    /// The host name resolved, but to no IPv4 address.
    #[error("No IPv4 address found for {0}")]
    NoAddress(String),

    /// Writing an outbound command failed.
    ///
    /// Triggers a reconnect and is also returned to the caller of the send.
    #[error("Failed to send command to the replication server: {0}")]
    Send(String),

    /// Pub/sub broker error.
    #[error("Redis error ({operation}): {message}")]
    Redis {
        operation: String,
        message: String,
        #[source]
        source: Option<redis::RedisError>,
    },

    /// No channel is open.
    ///
    /// Unlike [`Send`](Self::Send) this schedules no reconnect: the client is
    /// either stopped or the supervisor is already reconnecting.
    #[error("Not connected to the replication server")]
    NotConnected,

    /// A row payload did not match the expected shape for its topic.
    ///
    /// Surfaced per row; never aborts the rest of the record set.
    #[error("Malformed {topic} row: {message}")]
    MalformedRow { topic: String, message: String },

    /// An inbound command with a recognized verb could not be parsed.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The operation is gated to the other protocol version.
    #[error("Unsupported operation for {version} protocol: {operation}")]
    UnsupportedOperation { operation: String, version: String },

    /// A stream for this row type was already bound on this client.
    #[error("A stream for {0} has already been bound")]
    AlreadyBound(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client has been explicitly stopped.
    #[error("Shutdown in progress")]
    Shutdown,
}

impl ReplicationError {
    /// Create a Redis error from a redis::RedisError
    pub fn redis(operation: impl Into<String>, source: redis::RedisError) -> Self {
        Self::Redis {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a connect error for an address.
    pub fn connect(address: impl Into<String>, message: impl ToString) -> Self {
        Self::Connect {
            address: address.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-row error for a topic.
    pub fn malformed(topic: impl ToString, message: impl Into<String>) -> Self {
        Self::MalformedRow {
            topic: topic.to_string(),
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. } => true,
            Self::NoAddress(_) => true, // DNS may change
            Self::Send(_) => true,
            Self::Redis { .. } => true,
            Self::NotConnected => true,
            Self::MalformedRow { .. } => false, // Data is bad at the source
            Self::Protocol(_) => false,
            Self::UnsupportedOperation { .. } => false,
            Self::AlreadyBound(_) => false,
            Self::Config(_) => false,
            Self::Shutdown => false,
        }
    }
}

impl From<redis::RedisError> for ReplicationError {
    fn from(e: redis::RedisError) -> Self {
        Self::redis("unknown", e)
    }
}
