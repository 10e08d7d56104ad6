// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection supervision.
//!
//! One supervisor task exists per `connect()`. It owns the inbound stream and
//! drives the [`Dispatcher`] on it, so every line is handled on this single
//! task. When the stream is lost it reconnects, retrying forever with a fixed
//! delay, then starts reading again.
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │
//!   read_until_lost ── stream ended / read error ──┐        │
//!            │         protocol error (ERROR sent) ─┤        │
//!            │         reconnect requested ─────────┤        │
//!            │                                      ▼        │
//!            │                          emit Disconnected    │
//!            │                                      │        │
//!            │                          reconnect_with_retry ┘
//!            │                                (5s between attempts)
//!       disconnect() aborts the task at any point
//! ```
//!
//! Reconnect requests from send failures go through a channel so they are
//! handled on the supervisor task. Each request carries the generation of the
//! connection it was made on; requests from an older connection are ignored.
//! A guard flag collapses requests made while a reconnect is already underway.

use super::dispatch::Dispatcher;
use super::types::{ConnectionState, ReplicationEvent};
use super::Shared;
use crate::config::ProtocolVersion;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::protocol::OutboundCommand;
use crate::resilience::RetryConfig;
use crate::transport::{Endpoint, InboundStream};
use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Message sent to the server when a received command cannot be handled.
pub(crate) const PROCESSING_ERROR: &str = "Error processing incoming commands";

/// Open the transport, announce the connection and restore subscriptions.
///
/// Returns the inbound stream; nothing reads it until the caller hands it
/// to a supervisor.
pub(super) async fn establish(shared: &Arc<Shared>, endpoint: &Endpoint) -> Result<InboundStream> {
    let kind = shared.backend.kind();
    let started = Instant::now();

    let inbound = match shared.backend.connect(endpoint).await {
        Ok(inbound) => inbound,
        Err(e) => {
            metrics::record_connection(kind, false);
            return Err(e);
        }
    };

    // disconnect() may have run while the transport was opening
    if shared.stopped.load(Ordering::Acquire) {
        let _ = shared.backend.disconnect().await;
        return Err(ReplicationError::Shutdown);
    }

    metrics::record_connection(kind, true);
    metrics::record_connect_latency(kind, started.elapsed());
    let generation = shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
    info!(transport = kind, endpoint = %endpoint, generation, "Connected to replication server");

    shared.set_state(ConnectionState::Connected);
    resubscribe(shared).await?;

    shared.emit(&ReplicationEvent::Connected);
    Ok(inbound)
}

/// Bring the server up to date with what this client follows.
async fn resubscribe(shared: &Shared) -> Result<()> {
    match shared.config.protocol_version {
        ProtocolVersion::Legacy => {
            for slot in shared.slots() {
                let command = OutboundCommand::Replicate {
                    topic: slot.topic().to_string(),
                    position: slot.position(),
                };
                debug!(topic = %slot.topic(), row_type = slot.row_type(), "Resubscribing stream");
                shared.send_command(&command).await?;
            }
        }
        ProtocolVersion::Current => {
            // Otherwise the SERVER greeting triggers it
            if !shared.backend.greets_on_connect() {
                shared.send_command(&OutboundCommand::ReplicateAll).await?;
            }
        }
    }
    Ok(())
}

/// Supervisor task body.
pub(super) async fn supervise(shared: Arc<Shared>, inbound: InboundStream) {
    let mut requests = Arc::clone(&shared.reconnect_rx).lock_owned().await;
    let retry = shared.config.retry_config();
    let mut inbound = inbound;

    loop {
        let current = shared.generation.load(Ordering::Acquire);

        let mut dispatcher = Dispatcher::new(Arc::clone(&shared));
        loop {
            let chunk = tokio::select! {
                Some(generation) = requests.recv() => {
                    if generation < current {
                        debug!(generation, current, "Ignoring reconnect request for an earlier connection");
                        continue;
                    }
                    info!(generation, "Reconnect requested");
                    break;
                }
                next = inbound.next() => match next {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        error!(error = %e, "Failed to read from replication");
                        break;
                    }
                    None => {
                        info!("Replication stream closed");
                        break;
                    }
                },
            };

            if let Err(e) = dispatcher.process(&chunk).await {
                report_processing_error(&shared, &e).await;
                break;
            }
        }

        let discarded = dispatcher.discard();
        if discarded > 0 {
            debug!(discarded, "Discarding incomplete batches");
        }
        metrics::record_batches_discarded(discarded);

        drop(dispatcher);
        if let Err(e) = shared.backend.disconnect().await {
            warn!(error = %e, "Error closing replication connection");
        }

        if shared.stopped.load(Ordering::Acquire) {
            shared.set_state(ConnectionState::Disconnected);
            shared.emit(&ReplicationEvent::Disconnected);
            return;
        }

        info!("Lost replication connection - reconnecting");
        shared.reconnecting.store(true, Ordering::Release);
        shared.set_state(ConnectionState::Reconnecting);
        shared.emit(&ReplicationEvent::Disconnected);

        inbound = match reconnect_with_retry(&shared, &retry).await {
            Some(inbound) => {
                shared.reconnecting.store(false, Ordering::Release);
                inbound
            }
            None => {
                shared.reconnecting.store(false, Ordering::Release);
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
        };
    }
}

async fn report_processing_error(shared: &Shared, e: &ReplicationError) {
    match e {
        ReplicationError::Protocol(_) => {
            metrics::record_protocol_error();
            error!(error = %e, "Error processing incoming commands");
            let report = OutboundCommand::Error(PROCESSING_ERROR.to_string());
            if let Err(send_err) = shared.send_command(&report).await {
                warn!(error = %send_err, "Failed to report processing error to server");
            }
        }
        _ => warn!(error = %e, "Failed to respond to replication server"),
    }
}

async fn reconnect_with_retry(shared: &Arc<Shared>, retry: &RetryConfig) -> Option<InboundStream> {
    let endpoint = shared.endpoint()?;
    let mut attempt = 0usize;

    loop {
        if shared.stopped.load(Ordering::Acquire) {
            return None;
        }

        attempt += 1;
        metrics::record_reconnect_attempt(attempt);
        info!(attempt, endpoint = %endpoint, "Reconnecting to replication");

        match establish(shared, &endpoint).await {
            Ok(inbound) => {
                if attempt > 1 {
                    info!(attempt, "Reconnected to replication after retry");
                }
                return Some(inbound);
            }
            Err(e) => {
                error!(attempt, error = %e, "Reconnection failed");
                let _ = shared.backend.disconnect().await;
                shared.set_state(ConnectionState::Reconnecting);

                if !e.is_retryable() || !retry.should_retry(attempt) {
                    error!(attempt, "Giving up on replication connection");
                    return None;
                }
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
            }
        }
    }
}

/// Ask the supervisor to drop the connection and reconnect.
pub(super) fn request_reconnect(shared: &Shared) {
    if shared.stopped.load(Ordering::Acquire) {
        debug!("Client stopped; not reconnecting");
        return;
    }
    if shared.reconnecting.swap(true, Ordering::AcqRel) {
        debug!("Reconnect already in progress");
        return;
    }
    let generation = shared.generation.load(Ordering::Acquire);
    // Only fails once the client is gone
    let _ = shared.reconnect_tx.send(generation);
}
