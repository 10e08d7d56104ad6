// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Command interpretation.
//!
//! The dispatcher turns inbound text into client events. It owns the line
//! framer and the batch assembler for one connection; both are dropped with
//! it, which is how partial batches get discarded on reconnect.
//!
//! # Per-line Flow
//!
//! ```text
//! chunk ─▶ LineFramer ─▶ Command::parse ─┬─ None ──────────▶ ignored
//!                                        ├─ Err ───────────▶ stop, report ERROR
//!                                        └─ Some(command)
//!                                             │
//!   SERVER   ─▶ event; REPLICATE-all (current protocol)
//!   RDATA    ─▶ BatchAssembler ─▶ (terminal position) bound streams, event
//!   POSITION ─▶ bound streams, event
//!   PING / ERROR / REMOTE_SERVER_UP ─▶ event
//! ```
//!
//! Lines are handled one at a time, in order; every listener of a line has
//! returned before the next line is looked at.

use super::types::ReplicationEvent;
use super::Shared;
use crate::batch::BatchAssembler;
use crate::config::ProtocolVersion;
use crate::error::Result;
use crate::metrics;
use crate::protocol::command::truncate;
use crate::protocol::{Command, LineFramer, OutboundCommand};
use crate::topic::StreamPosition;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Per-connection command dispatcher.
pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    framer: LineFramer,
    batches: BatchAssembler,
}

impl Dispatcher {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            framer: LineFramer::new(),
            batches: BatchAssembler::new(),
        }
    }

    /// Feed one raw chunk from the transport.
    ///
    /// Stops at the first line that cannot be handled; the rest of the
    /// chunk is not dispatched.
    pub(crate) async fn process(&mut self, chunk: &str) -> Result<()> {
        for line in self.framer.push(chunk) {
            self.dispatch(&line).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, line: &str) -> Result<()> {
        trace!(command = %truncate(line), "Received");

        let Some(command) = Command::parse(line)? else {
            metrics::record_command_ignored();
            trace!(command = %truncate(line), "Ignoring unknown command");
            return Ok(());
        };
        metrics::record_command_received(command.verb());

        match command {
            Command::Server(name) => {
                info!(server = %name, "Replication server identified");
                self.shared.emit(&ReplicationEvent::ServerName(name));

                if self.shared.config.protocol_version == ProtocolVersion::Current {
                    self.shared.send_command(&OutboundCommand::ReplicateAll).await?;
                }
            }
            Command::RData {
                topic,
                position,
                row,
            } => {
                if let Some(data) = self.batches.push(&topic, &position, row) {
                    metrics::record_batch_flushed(&topic, data.len());
                    for slot in self.shared.slots_for(&topic) {
                        slot.deliver(&data);
                    }
                    self.shared.emit(&ReplicationEvent::RecordSet(data));
                }
                metrics::set_open_batches(self.batches.open_batches());
            }
            Command::Position { topic, position } => {
                metrics::record_position_update(&topic);
                for slot in self.shared.slots_for(&topic) {
                    slot.set_position(&position);
                }
                self.shared
                    .emit(&ReplicationEvent::Position(StreamPosition::new(topic, position)));
            }
            Command::Ping(token) => {
                self.shared.emit(&ReplicationEvent::Ping(token));
            }
            Command::Error(message) => {
                warn!(message = %message, "Replication server reported an error");
                self.shared.emit(&ReplicationEvent::Error(message));
            }
            Command::RemoteServerUp(server) => {
                self.shared.emit(&ReplicationEvent::RemoteServerUp(server));
            }
        }

        Ok(())
    }

    /// Drop buffered text and open batches, returning how many batches were lost.
    pub(crate) fn discard(&mut self) -> usize {
        self.framer.clear();
        let dropped = self.batches.clear();
        metrics::set_open_batches(0);
        dropped
    }
}
