// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication client.
//!
//! [`ReplicationClient`] ties together:
//! - A transport backend ([`crate::transport`])
//! - Command interpretation and batch assembly (`dispatch`)
//! - Connection supervision and reconnects (`connection`)
//! - Typed per-topic streams ([`crate::stream`])
//!
//! # Protocol Versions
//!
//! The client speaks one of two dialects, fixed at construction:
//!
//! | | Legacy | Current |
//! |---|---|---|
//! | On bind | `REPLICATE <topic> <pos>` | nothing |
//! | On connect | `REPLICATE <topic> <pos>` per bound stream | `REPLICATE ` (Redis) |
//! | On `SERVER` | nothing | `REPLICATE ` |
//! | `subscribe()` / `force_position()` | allowed | `UnsupportedOperation` |
//! | `acquire_all_positions()` | `UnsupportedOperation` | allowed |
//!
//! # Example
//!
//! ```rust,no_run
//! use synapse_replication::{ReplicationClient, ReplicationConfig};
//! use synapse_replication::rows::EventStreamRow;
//!
//! # async fn example() -> synapse_replication::Result<()> {
//! let client = ReplicationClient::new(ReplicationConfig::default())?;
//! let events = client.bind_stream::<EventStreamRow>().await?;
//! events.on_row(|row| println!("{} in {}", row.event_type, row.room_id));
//!
//! client.connect().await?;
//! // ... runs until stopped
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod connection;
mod dispatch;
mod types;

pub use types::{ConnectionState, ReplicationEvent};

use crate::config::{ProtocolVersion, ReplicationConfig, TransportConfig};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::protocol::OutboundCommand;
use crate::rows::ReplicationRow;
use crate::stream::{guarded, ReplicationStream, StreamSlot};
use crate::topic::{Topic, LATEST};
use crate::transport::{Endpoint, InboundStream, RedisBackend, ReplicationBackend, TcpBackend};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type EventListener = Arc<dyn Fn(&ReplicationEvent) + Send + Sync>;

/// Client for the homeserver replication protocol.
///
/// Cheap to clone; clones share the connection. The background supervisor
/// keeps the client alive until [`disconnect()`](Self::disconnect) is called.
#[derive(Clone)]
pub struct ReplicationClient {
    shared: Arc<Shared>,
}

/// State shared between the client handles and the supervisor task.
pub(crate) struct Shared {
    pub(crate) config: ReplicationConfig,
    pub(crate) backend: Arc<dyn ReplicationBackend>,

    /// Last address passed to connect.
    endpoint: Mutex<Option<Endpoint>>,

    listeners: RwLock<Vec<EventListener>>,

    /// Bound streams, one per row type.
    streams: Mutex<HashMap<TypeId, Arc<dyn StreamSlot>>>,

    state_tx: watch::Sender<ConnectionState>,

    supervisor: Mutex<Option<JoinHandle<()>>>,

    /// Set while a reconnect is pending or running.
    pub(crate) reconnecting: AtomicBool,

    /// Set by disconnect(); cleared by connect().
    pub(crate) stopped: AtomicBool,

    /// Bumped on every established connection.
    pub(crate) generation: AtomicU64,

    /// Reconnect requests, tagged with the generation they were made on.
    pub(crate) reconnect_tx: mpsc::UnboundedSender<u64>,
    pub(crate) reconnect_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<u64>>>,
}

impl Shared {
    pub(crate) fn endpoint(&self) -> Option<Endpoint> {
        self.endpoint
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
            metrics::set_connection_state(&state.to_string());
        }
    }

    /// Deliver an event to every listener, in registration order.
    pub(crate) fn emit(&self, event: &ReplicationEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            guarded(event.name(), || listener(event));
        }
    }

    pub(crate) fn slots(&self) -> Vec<Arc<dyn StreamSlot>> {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Bound streams for a wire topic name.
    pub(crate) fn slots_for(&self, topic: &str) -> Vec<Arc<dyn StreamSlot>> {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|slot| slot.topic().as_str() == topic)
            .cloned()
            .collect()
    }

    /// Write one line through the backend.
    pub(crate) async fn send_line(&self, line: &str) -> Result<()> {
        let verb = line.split(' ').next().unwrap_or_default();
        let result = self.backend.send_raw(line).await;
        metrics::record_command_sent(verb, result.is_ok());
        result
    }

    pub(crate) async fn send_command(&self, command: &OutboundCommand) -> Result<()> {
        self.send_line(&command.to_string()).await
    }

    fn start_supervisor(self: &Arc<Self>, inbound: InboundStream) {
        let handle = tokio::spawn(connection::supervise(Arc::clone(self), inbound));
        if let Some(previous) = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            previous.abort();
        }
    }

    fn stop_supervisor(&self) {
        let handle = self
            .supervisor
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl ReplicationClient {
    /// Create a client with the backend selected by `config.transport`.
    ///
    /// Nothing is connected until [`connect()`](Self::connect).
    pub fn new(config: ReplicationConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(ReplicationError::Config("host must not be empty".to_string()));
        }

        let backend: Arc<dyn ReplicationBackend> = match &config.transport {
            TransportConfig::Tcp => Arc::new(TcpBackend::new(
                config.effective_client_name(),
                config.keepalive_interval(),
            )),
            TransportConfig::Redis { channel } => {
                if channel.trim().is_empty() {
                    return Err(ReplicationError::Config(
                        "redis channel must not be empty".to_string(),
                    ));
                }
                Arc::new(RedisBackend::new(channel.clone()))
            }
        };

        Ok(Self::with_backend(config, backend))
    }

    /// Create a client over a caller-supplied backend.
    pub fn with_backend(config: ReplicationConfig, backend: Arc<dyn ReplicationBackend>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (reconnect_tx, reconnect_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                config,
                backend,
                endpoint: Mutex::new(None),
                listeners: RwLock::new(Vec::new()),
                streams: Mutex::new(HashMap::new()),
                state_tx,
                supervisor: Mutex::new(None),
                reconnecting: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                reconnect_tx,
                reconnect_rx: Arc::new(tokio::sync::Mutex::new(reconnect_rx)),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> Arc<Shared> {
        Arc::clone(&self.shared)
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.shared.config
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.shared.config.protocol_version
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to the configured host and port.
    pub async fn connect(&self) -> Result<()> {
        let config = &self.shared.config;
        self.connect_to(&config.host, config.port()).await
    }

    /// Connect to an explicit address.
    ///
    /// Fails if the first attempt fails; once connected, lost connections are
    /// re-established in the background until [`disconnect()`](Self::disconnect).
    pub async fn connect_to(&self, host: &str, port: u16) -> Result<()> {
        let endpoint = Endpoint::new(host, port);

        self.shared.stop_supervisor();
        self.shared.stopped.store(false, Ordering::Release);
        self.shared.reconnecting.store(false, Ordering::Release);
        *self
            .shared
            .endpoint
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(endpoint.clone());

        self.shared.set_state(ConnectionState::Connecting);

        match connection::establish(&self.shared, &endpoint).await {
            Ok(inbound) => {
                self.shared.start_supervisor(inbound);
                Ok(())
            }
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "Failed to connect to replication server");
                let _ = self.shared.backend.disconnect().await;
                self.shared.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Open batches are discarded. Safe to call when not connected.
    pub async fn disconnect(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.stop_supervisor();

        if let Err(e) = self.shared.backend.disconnect().await {
            warn!(error = %e, "Error closing replication connection");
        }

        let was = *self.shared.state_tx.borrow();
        self.shared.reconnecting.store(false, Ordering::Release);
        self.shared.set_state(ConnectionState::Disconnected);

        // The supervisor already announced the loss of a reconnecting channel
        if was.is_connected() {
            info!("Disconnected from replication server");
            self.shared.emit(&ReplicationEvent::Disconnected);
        }
    }

    /// Drop the connection and connect again to the last address.
    pub async fn reconnect(&self) -> Result<()> {
        let endpoint = self.shared.endpoint().ok_or_else(|| {
            ReplicationError::Config("reconnect() called before connect()".to_string())
        })?;

        info!(endpoint = %endpoint, "Reconnecting to replication server");
        self.shared.stop_supervisor();
        let _ = self.shared.backend.disconnect().await;
        self.connect_to(&endpoint.host, endpoint.port).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Watch connection state changes.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Register a listener for every client event.
    ///
    /// Listeners run on the read task and must not block.
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&ReplicationEvent) + Send + Sync + 'static,
    {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(listener));
    }

    // =========================================================================
    // Outbound commands
    // =========================================================================

    /// Send one raw command line.
    ///
    /// A write failure schedules a reconnect and is returned as
    /// [`ReplicationError::Send`]. With no open channel the result is
    /// [`ReplicationError::NotConnected`] and nothing is scheduled.
    pub async fn send_raw(&self, line: &str) -> Result<()> {
        match self.shared.send_line(line).await {
            Ok(()) => Ok(()),
            Err(e @ ReplicationError::Send(_)) => {
                warn!(error = %e, "Send failed; scheduling reconnect");
                connection::request_reconnect(&self.shared);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn send(&self, command: OutboundCommand) -> Result<()> {
        self.send_raw(&command.to_string()).await
    }

    pub async fn send_name(&self, name: &str) -> Result<()> {
        self.send(OutboundCommand::Name(name.to_string())).await
    }

    /// Subscribe one topic from a position (legacy protocol only).
    ///
    /// A blank position means [`LATEST`].
    pub async fn subscribe(&self, topic: Topic, position: &str) -> Result<()> {
        self.require(ProtocolVersion::Legacy, "subscribe")?;

        let position = if position.trim().is_empty() {
            LATEST
        } else {
            position
        };
        self.send(OutboundCommand::Replicate {
            topic: topic.to_string(),
            position: position.to_string(),
        })
        .await
    }

    /// Ask the server to resend the position of every topic (current protocol only).
    pub async fn acquire_all_positions(&self) -> Result<()> {
        self.require(ProtocolVersion::Current, "acquire_all_positions")?;
        self.send(OutboundCommand::ReplicateAll).await
    }

    pub async fn send_federation_ack(&self, token: &str) -> Result<()> {
        self.send(OutboundCommand::FederationAck(token.to_string())).await
    }

    pub async fn send_remote_server_up(&self, server: &str) -> Result<()> {
        self.send(OutboundCommand::RemoteServerUp(server.to_string())).await
    }

    /// Report a local processing fault to the server.
    pub async fn send_error(&self, message: &str) -> Result<()> {
        self.send(OutboundCommand::Error(message.to_string())).await
    }

    fn require(&self, version: ProtocolVersion, operation: &str) -> Result<()> {
        let configured = self.shared.config.protocol_version;
        if configured == version {
            Ok(())
        } else {
            Err(ReplicationError::UnsupportedOperation {
                operation: operation.to_string(),
                version: configured.to_string(),
            })
        }
    }

    // =========================================================================
    // Streams
    // =========================================================================

    /// Bind the stream for `T`, starting from the newest position.
    ///
    /// Each row type can be bound once per client.
    pub async fn bind_stream<T: ReplicationRow>(&self) -> Result<ReplicationStream<T>> {
        self.resume_stream::<T>(LATEST).await
    }

    /// Bind the stream for `T`, starting from `position`.
    ///
    /// Only the legacy protocol lets the client choose where a stream starts;
    /// with the current protocol the server's announced positions win.
    pub async fn resume_stream<T: ReplicationRow>(&self, position: &str) -> Result<ReplicationStream<T>> {
        let stream = ReplicationStream::<T>::new(position);

        {
            let mut streams = self.shared.streams.lock().unwrap_or_else(|e| e.into_inner());
            if streams.contains_key(&TypeId::of::<T>()) {
                return Err(ReplicationError::AlreadyBound(type_name::<T>().to_string()));
            }
            streams.insert(TypeId::of::<T>(), Arc::new(stream.clone()));
        }
        info!(topic = %T::TOPIC, position = %stream.position(), "Stream bound");

        if self.protocol_version() == ProtocolVersion::Legacy && self.state().is_connected() {
            // Resubscribed on the next connect if this fails
            if let Err(e) = self.subscribe(T::TOPIC, &stream.position()).await {
                warn!(topic = %T::TOPIC, error = %e, "Initial subscription failed");
            }
        }

        Ok(stream)
    }

    /// Restart a bound stream from `position` (legacy protocol only).
    ///
    /// The position is updated only once the request has been sent.
    pub async fn force_position<T: ReplicationRow>(
        &self,
        stream: &ReplicationStream<T>,
        position: &str,
    ) -> Result<()> {
        self.require(ProtocolVersion::Legacy, "force_position")?;
        self.subscribe(T::TOPIC, position).await?;
        stream.set_position(position);
        Ok(())
    }

    /// Whether a stream is bound for `T`.
    pub fn is_bound<T: ReplicationRow>(&self) -> bool {
        self.shared
            .streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for ReplicationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationClient")
            .field("transport", &self.shared.backend.kind())
            .field("protocol_version", &self.shared.config.protocol_version)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{EventStreamRow, TypingStreamRow};

    fn offline(version: ProtocolVersion) -> ReplicationClient {
        ReplicationClient::new(ReplicationConfig::for_testing(version)).unwrap()
    }

    #[test]
    fn test_new_rejects_blank_host() {
        let config = ReplicationConfig {
            host: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ReplicationClient::new(config),
            Err(ReplicationError::Config(_))
        ));
    }

    #[test]
    fn test_new_selects_backend() {
        let tcp = offline(ProtocolVersion::Current);
        assert_eq!(tcp.shared.backend.kind(), "tcp");

        let config = ReplicationConfig {
            transport: TransportConfig::Redis {
                channel: "example.org".to_string(),
            },
            ..Default::default()
        };
        let redis = ReplicationClient::new(config).unwrap();
        assert_eq!(redis.shared.backend.kind(), "redis");
    }

    #[test]
    fn test_initial_state() {
        let client = offline(ProtocolVersion::Current);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(*client.state_watch().borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_subscribe_unsupported_in_current_mode() {
        let client = offline(ProtocolVersion::Current);
        let err = client.subscribe(Topic::Events, LATEST).await.unwrap_err();
        assert!(matches!(err, ReplicationError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_acquire_all_unsupported_in_legacy_mode() {
        let client = offline(ProtocolVersion::Legacy);
        let err = client.acquire_all_positions().await.unwrap_err();
        assert!(matches!(err, ReplicationError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_double_bind_fails() {
        let client = offline(ProtocolVersion::Current);
        client.bind_stream::<EventStreamRow>().await.unwrap();
        assert!(client.is_bound::<EventStreamRow>());
        assert!(!client.is_bound::<TypingStreamRow>());

        let err = client.bind_stream::<EventStreamRow>().await.unwrap_err();
        assert!(matches!(err, ReplicationError::AlreadyBound(_)));

        let err = client.resume_stream::<EventStreamRow>("5").await.unwrap_err();
        assert!(matches!(err, ReplicationError::AlreadyBound(_)));
    }

    #[tokio::test]
    async fn test_resume_stream_position() {
        let client = offline(ProtocolVersion::Legacy);
        let typing = client.resume_stream::<TypingStreamRow>("1234").await.unwrap();
        assert_eq!(typing.position(), "1234");
    }

    #[tokio::test]
    async fn test_reconnect_before_connect() {
        let client = offline(ProtocolVersion::Current);
        assert!(matches!(
            client.reconnect().await,
            Err(ReplicationError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected() {
        let client = offline(ProtocolVersion::Current);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        client.on_event(move |e| sink.lock().unwrap().push(e.clone()));

        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_when_not_connected() {
        let client = offline(ProtocolVersion::Current);
        let err = client.send_federation_ack("1").await.unwrap_err();
        assert!(matches!(err, ReplicationError::NotConnected));
    }
}
