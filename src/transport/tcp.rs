// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Duplex TCP backend.
//!
//! # Connection Lifecycle
//!
//! ```text
//! resolve host (IPv4 only) → TCP connect → NAME <client> → keepalive task
//!                                                        → inbound stream
//! ```
//!
//! The inbound stream reads whatever the socket has, then drains everything
//! else that is immediately available before yielding, so one chunk usually
//! holds several commands. Multi-byte UTF-8 sequences split across reads are
//! carried to the next chunk.
//!
//! The keepalive task sends `PING <unix millis>` every interval. A failed
//! ping is logged, stops the task and ends the inbound stream with the send
//! error, so the engine reconnects as it does for a failed read.

use super::{BackendFuture, Endpoint, InboundStream, ReplicationBackend};
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::protocol::command::truncate;
use crate::protocol::{OutboundCommand, LINE_TERMINATOR};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const READ_BUFFER_SIZE: usize = 4096;

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// Replication over a plain TCP connection.
pub struct TcpBackend {
    client_name: String,
    keepalive_interval: Duration,
    /// Write half; the single outbound critical section for this connection.
    writer: SharedWriter,
    keepalive: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TcpBackend {
    pub fn new(client_name: impl Into<String>, keepalive_interval: Duration) -> Self {
        Self {
            client_name: client_name.into(),
            keepalive_interval,
            writer: Arc::new(Mutex::new(None)),
            keepalive: std::sync::Mutex::new(None),
        }
    }

    fn stop_keepalive(&self) {
        let handle = self
            .keepalive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn start_keepalive(&self, faults: mpsc::Sender<ReplicationError>) {
        let writer = Arc::clone(&self.writer);
        let interval = self.keepalive_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let ping = OutboundCommand::Ping(epoch_millis().to_string()).to_string();
                match write_line(&writer, &ping).await {
                    Ok(()) => metrics::record_keepalive(true),
                    Err(e) => {
                        metrics::record_keepalive(false);
                        warn!(error = %e, "Ping failed");
                        let _ = faults.try_send(e);
                        return;
                    }
                }
            }
        });

        if let Some(previous) = self
            .keepalive
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle)
        {
            previous.abort();
        }
    }
}

/// Resolve a host to its first IPv4 address.
pub async fn resolve_ipv4(endpoint: &Endpoint) -> Result<SocketAddr> {
    let addrs = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| ReplicationError::connect(endpoint.to_string(), e))?;

    first_ipv4(addrs).ok_or_else(|| ReplicationError::NoAddress(endpoint.host.clone()))
}

fn first_ipv4(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    addrs.into_iter().find(SocketAddr::is_ipv4)
}

async fn write_line(writer: &Mutex<Option<OwnedWriteHalf>>, line: &str) -> Result<()> {
    let mut guard = writer.lock().await;
    let stream = guard.as_mut().ok_or(ReplicationError::NotConnected)?;

    let mut framed = String::with_capacity(line.len() + 1);
    framed.push_str(line);
    framed.push(LINE_TERMINATOR);

    stream
        .write_all(framed.as_bytes())
        .await
        .map_err(|e| ReplicationError::Send(e.to_string()))
}

impl ReplicationBackend for TcpBackend {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BackendFuture<'a, InboundStream> {
        Box::pin(async move {
            self.disconnect().await?;

            let addr = resolve_ipv4(endpoint).await?;
            info!(%addr, "Connecting to replication stream");

            let stream = TcpStream::connect(addr)
                .await
                .map_err(|e| ReplicationError::connect(addr.to_string(), e))?;
            // Commands are small and latency matters more than throughput
            let _ = stream.set_nodelay(true);

            let (reader, writer) = stream.into_split();
            *self.writer.lock().await = Some(writer);

            let name = OutboundCommand::Name(self.client_name.clone()).to_string();
            debug!(command = %name, "Sending");
            write_line(&self.writer, &name).await?;

            let (fault_tx, fault_rx) = mpsc::channel(1);
            self.start_keepalive(fault_tx);

            Ok(inbound_stream(reader, addr, fault_rx))
        })
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.stop_keepalive();

            if let Some(mut writer) = self.writer.lock().await.take() {
                // Peer may already be gone
                let _ = writer.shutdown().await;
            }
            Ok(())
        })
    }

    fn send_raw<'a>(&'a self, line: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            debug!(command = %truncate(line), "Sending");
            write_line(&self.writer, line).await
        })
    }
}

struct ReadState {
    reader: OwnedReadHalf,
    peer: SocketAddr,
    /// Incomplete UTF-8 sequence from the previous read.
    carry: Vec<u8>,
    /// Send failures reported by the keepalive task.
    faults: mpsc::Receiver<ReplicationError>,
}

fn inbound_stream(
    reader: OwnedReadHalf,
    peer: SocketAddr,
    faults: mpsc::Receiver<ReplicationError>,
) -> InboundStream {
    let state = ReadState {
        reader,
        peer,
        carry: Vec::new(),
        faults,
    };

    Box::pin(futures::stream::try_unfold(state, |mut state| async move {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let mut bytes = std::mem::take(&mut state.carry);

        let n = tokio::select! {
            read = state.reader.read(&mut buf) => read.map_err(|e| {
                ReplicationError::connect(state.peer.to_string(), format!("read failed: {}", e))
            })?,
            Some(fault) = state.faults.recv() => return Err(fault),
        };
        if n == 0 {
            debug!(peer = %state.peer, "Replication stream closed by server");
            return Ok(None);
        }
        bytes.extend_from_slice(&buf[..n]);

        // Drain whatever else is already buffered
        loop {
            match state.reader.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => bytes.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    return Err(ReplicationError::connect(
                        state.peer.to_string(),
                        format!("read failed: {}", e),
                    ))
                }
            }
        }

        let (text, carry) = split_utf8(bytes)?;
        state.carry = carry;
        Ok(Some((text, state)))
    }))
}

/// Split bytes into the longest valid UTF-8 prefix and an incomplete tail.
fn split_utf8(bytes: Vec<u8>) -> Result<(String, Vec<u8>)> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok((text, Vec::new())),
        Err(e) => {
            let utf8_error = e.utf8_error();
            if utf8_error.error_len().is_some() {
                return Err(ReplicationError::Protocol(format!(
                    "invalid UTF-8 from server: {}",
                    utf8_error
                )));
            }

            let mut bytes = e.into_bytes();
            let carry = bytes.split_off(utf8_error.valid_up_to());
            let text = String::from_utf8(bytes)
                .map_err(|e| ReplicationError::Protocol(e.to_string()))?;
            Ok((text, carry))
        }
    }
}

fn epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV6};

    #[test]
    fn test_first_ipv4_skips_ipv6() {
        let v6 = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 9092, 0, 0));
        let v4 = SocketAddr::from((Ipv4Addr::LOCALHOST, 9092));
        assert_eq!(first_ipv4(vec![v6, v4]), Some(v4));
    }

    #[test]
    fn test_first_ipv4_none_for_ipv6_only() {
        let v6 = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::LOCALHOST, 9092, 0, 0));
        assert_eq!(first_ipv4(vec![v6]), None);
    }

    #[tokio::test]
    async fn test_resolve_ipv6_literal_has_no_address() {
        let err = resolve_ipv4(&Endpoint::new("::1", 9092)).await.unwrap_err();
        assert!(matches!(err, ReplicationError::NoAddress(_)));
    }

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        let addr = resolve_ipv4(&Endpoint::new("127.0.0.1", 9092)).await.unwrap();
        assert_eq!(addr, SocketAddr::from((Ipv4Addr::LOCALHOST, 9092)));
    }

    #[test]
    fn test_split_utf8_carries_partial_sequence() {
        let mut bytes = "PING é".as_bytes().to_vec();
        let last = bytes.pop().unwrap();

        let (text, carry) = split_utf8(bytes).unwrap();
        assert_eq!(text, "PING ");
        assert_eq!(carry.len(), 1);

        let mut rest = carry;
        rest.push(last);
        let (text, carry) = split_utf8(rest).unwrap();
        assert_eq!(text, "é");
        assert!(carry.is_empty());
    }

    #[test]
    fn test_split_utf8_rejects_invalid_bytes() {
        assert!(split_utf8(vec![b'a', 0xFF, b'b']).is_err());
    }

    #[tokio::test]
    async fn test_send_when_not_connected() {
        let backend = TcpBackend::new("test", Duration::from_secs(5));
        let err = backend.send_raw("PING 1").await.unwrap_err();
        assert!(matches!(err, ReplicationError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected() {
        let backend = TcpBackend::new("test", Duration::from_secs(5));
        backend.disconnect().await.unwrap();
        backend.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_ping_ends_inbound_stream() {
        use futures::StreamExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = TcpBackend::new("test", Duration::from_millis(20));

        let endpoint = Endpoint::new("127.0.0.1", port);
        let (inbound, accepted) = tokio::join!(backend.connect(&endpoint), listener.accept());
        let mut inbound = inbound.unwrap();
        let _server = accepted.unwrap();

        // Writer gone: the next ping cannot be written
        backend.writer.lock().await.take();

        let next = tokio::time::timeout(Duration::from_secs(2), inbound.next())
            .await
            .expect("inbound stream kept waiting after a failed ping");
        assert!(matches!(next, Some(Err(ReplicationError::NotConnected))));
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_ping_triggers_reconnect() {
        use crate::config::{ProtocolVersion, ReplicationConfig};
        use crate::engine::{ConnectionState, ReplicationClient};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = Arc::new(TcpBackend::new("test", Duration::from_millis(20)));
        let client = ReplicationClient::with_backend(
            ReplicationConfig::for_testing(ProtocolVersion::Current),
            Arc::clone(&backend) as Arc<dyn ReplicationBackend>,
        );

        let (connected, accepted) = tokio::join!(client.connect_to("127.0.0.1", port), listener.accept());
        connected.unwrap();
        let _first = accepted.unwrap();

        backend.writer.lock().await.take();

        let second = tokio::time::timeout(Duration::from_secs(2), listener.accept()).await;
        assert!(second.is_ok(), "no reconnect after a failed ping");
        let _second = second.unwrap().unwrap();

        for _ in 0..400 {
            if client.state() == ConnectionState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(client.state(), ConnectionState::Connected);
        client.disconnect().await;
    }

    #[test]
    fn test_epoch_millis() {
        assert!(epoch_millis() > 1_500_000_000_000);
    }
}
