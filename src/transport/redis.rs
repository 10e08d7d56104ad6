// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis pub/sub backend.
//!
//! The homeserver publishes every command on a channel named after its
//! hostname and listens on the same channel for commands from workers.
//!
//! ```text
//!   client                       Redis                     homeserver
//!     │ SUBSCRIBE <channel> ──────▶ │ ◀───── PUBLISH <channel> "RDATA …"
//!     │ ◀──────── message ───────── │
//!     │ PUBLISH <channel> "…" ────▶ │ ──────▶ subscriber
//! ```
//!
//! Two Redis connections are used: a dedicated pub/sub connection (a
//! subscribed connection cannot issue other commands) and a multiplexed
//! [`ConnectionManager`] for publishing.
//!
//! Every message is exactly one command, so the line terminator is appended
//! on receipt and omitted on publish. No `NAME` or `PING` is sent: Redis
//! keeps the connection alive and there is no server greeting.

use super::{BackendFuture, Endpoint, InboundStream, ReplicationBackend};
use crate::error::{ReplicationError, Result};
use crate::protocol::command::truncate;
use crate::protocol::LINE_TERMINATOR;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Msg};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Replication over Redis pub/sub.
pub struct RedisBackend {
    channel: String,
    /// Publishing connection. ConnectionManager is Clone and multiplexed.
    publisher: RwLock<Option<ConnectionManager>>,
}

impl RedisBackend {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            publisher: RwLock::new(None),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

fn redis_url(endpoint: &Endpoint) -> String {
    format!("redis://{}:{}/", endpoint.host, endpoint.port)
}

fn message_text(msg: Msg) -> Result<String> {
    let mut payload: String = msg
        .get_payload()
        .map_err(|e| ReplicationError::redis("MESSAGE", e))?;
    payload.push(LINE_TERMINATOR);
    Ok(payload)
}

impl ReplicationBackend for RedisBackend {
    fn kind(&self) -> &'static str {
        "redis"
    }

    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BackendFuture<'a, InboundStream> {
        Box::pin(async move {
            self.disconnect().await?;

            let url = redis_url(endpoint);
            info!(url = %url, channel = %self.channel, "Connecting to replication channel");

            let client = Client::open(url.as_str())
                .map_err(|e| ReplicationError::connect(endpoint.to_string(), format!("Invalid Redis URL: {}", e)))?;

            let mut pubsub = client
                .get_async_pubsub()
                .await
                .map_err(|e| ReplicationError::connect(endpoint.to_string(), e))?;
            pubsub
                .subscribe(&self.channel)
                .await
                .map_err(|e| ReplicationError::redis("SUBSCRIBE", e))?;

            let publisher = client
                .get_connection_manager()
                .await
                .map_err(|e| ReplicationError::connect(endpoint.to_string(), e))?;
            *self.publisher.write().await = Some(publisher);

            debug!(channel = %self.channel, "Subscribed");
            Ok(Box::pin(pubsub.into_on_message().map(message_text)) as InboundStream)
        })
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            // Dropping the pub/sub stream unsubscribes; only the publisher lives here
            self.publisher.write().await.take();
            Ok(())
        })
    }

    fn send_raw<'a>(&'a self, line: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self
                .publisher
                .read()
                .await
                .clone()
                .ok_or(ReplicationError::NotConnected)?;

            debug!(channel = %self.channel, command = %truncate(line), "Publishing");
            let _receivers: i64 = conn
                .publish(&self.channel, line)
                .await
                .map_err(|e| ReplicationError::Send(e.to_string()))?;
            Ok(())
        })
    }

    fn greets_on_connect(&self) -> bool {
        false
    }
}
