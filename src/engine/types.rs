//! Client state and event types.
//!
//! # State Transitions
//!
//! ```text
//!              connect()
//! Disconnected ─────────→ Connecting ──────→ Connected
//!      ↑                      │                  │
//!      │   (connect failed)   │                  │ (read/send failure)
//!      ├──────────────────────┘                  ↓
//!      │                                    Reconnecting ⟲ (retry every 5s)
//!      │        disconnect()                     │
//!      └─────────────────────────────────────────┘
//! ```
//!
//! Only one reconnect loop runs at a time. `disconnect()` stops it and is
//! the only way out of `Reconnecting` other than a successful reconnect.

use crate::batch::ReplicationData;
use crate::topic::StreamPosition;

/// Connection state of a [`ReplicationClient`](super::ReplicationClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel open and no reconnect pending.
    Disconnected,

    /// Initial connect in progress.
    Connecting,

    /// Channel open; the read task is running.
    Connected,

    /// The channel was lost and the reconnect loop is running.
    Reconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Something the server told us, or a change in the connection.
///
/// Delivered to [`on_event`](super::ReplicationClient::on_event) listeners
/// on the read task, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationEvent {
    /// A channel was opened (fired for reconnects too).
    Connected,

    /// The channel was lost or closed.
    Disconnected,

    /// `SERVER <name>`
    ServerName(String),

    /// A completed record set, for any topic (bound or not).
    RecordSet(ReplicationData),

    /// `POSITION <topic> <position>`
    Position(StreamPosition),

    /// `PING <token>`
    Ping(String),

    /// `ERROR <message>`
    Error(String),

    /// `REMOTE_SERVER_UP <server>`
    RemoteServerUp(String),
}

impl ReplicationEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ReplicationEvent::Connected => "connected",
            ReplicationEvent::Disconnected => "disconnected",
            ReplicationEvent::ServerName(_) => "server_name",
            ReplicationEvent::RecordSet(_) => "record_set",
            ReplicationEvent::Position(_) => "position",
            ReplicationEvent::Ping(_) => "ping",
            ReplicationEvent::Error(_) => "error",
            ReplicationEvent::RemoteServerUp(_) => "remote_server_up",
        }
    }
}
