// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport backends.
//!
//! A backend moves protocol text between the client and the server and knows
//! nothing about commands. Two implementations are provided:
//!
//! - [`TcpBackend`]: a duplex TCP stream to the server's replication
//!   listener; sends `NAME` on connect and keeps the link alive with `PING`s.
//! - [`RedisBackend`]: Redis pub/sub on a channel named after the homeserver.
//!
//! # Example
//!
//! ```rust
//! use synapse_replication::transport::{BackendFuture, Endpoint, InboundStream, ReplicationBackend};
//!
//! struct Loopback;
//!
//! impl ReplicationBackend for Loopback {
//!     fn kind(&self) -> &'static str {
//!         "loopback"
//!     }
//!
//!     fn connect<'a>(&'a self, _endpoint: &'a Endpoint) -> BackendFuture<'a, InboundStream> {
//!         Box::pin(async move {
//!             let lines = futures::stream::iter(vec![Ok("SERVER loopback\n".to_string())]);
//!             Ok(Box::pin(lines) as InboundStream)
//!         })
//!     }
//!
//!     fn disconnect(&self) -> BackendFuture<'_, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn send_raw<'a>(&'a self, _line: &'a str) -> BackendFuture<'a, ()> {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//! ```

pub mod redis;
pub mod tcp;

pub use self::redis::RedisBackend;
pub use self::tcp::TcpBackend;

use crate::error::Result;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed backend futures (reduces trait signature complexity).
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Raw inbound text, chunked however the transport delivers it.
///
/// The stream ending (or yielding an error) means the channel is lost.
pub type InboundStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Where to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A channel carrying the replication protocol.
pub trait ReplicationBackend: Send + Sync + 'static {
    /// Short name for logs and metrics.
    fn kind(&self) -> &'static str;

    /// Open the channel and return its inbound text.
    ///
    /// Calling this again, after a failure or while connected, replaces the
    /// previous channel.
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BackendFuture<'a, InboundStream>;

    /// Close the channel and stop any background activity.
    ///
    /// Safe to call when not connected.
    fn disconnect(&self) -> BackendFuture<'_, ()>;

    /// Send one command line (without terminator).
    fn send_raw<'a>(&'a self, line: &'a str) -> BackendFuture<'a, ()>;

    /// Whether the server greets every new connection with `SERVER`.
    ///
    /// Backends without a greeting get the global resync request on connect
    /// instead.
    fn greets_on_connect(&self) -> bool {
        true
    }
}
