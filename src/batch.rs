// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-topic batch assembly for `RDATA` rows.
//!
//! The server may split one logical update into several `RDATA` lines that
//! share a terminal position. All but the last carry the position marker
//! `batch`; the last one carries the real position and closes the batch.
//!
//! # Design
//!
//! ```text
//! RDATA events batch r1 ──┐
//! RDATA receipts 7 q1 ────┼──▶ HashMap<topic, ReplicationData> ──▶ flush on
//! RDATA events batch r2 ──┤       (one open batch per topic)        terminal
//! RDATA events 12 r3 ─────┘                                         position
//!                                   events @12: [r1, r2, r3]
//!                                   receipts @7: [q1]
//! ```
//!
//! A flushed batch is removed from the map in the same step that returns it,
//! so it can never be delivered twice. Batches still open when the
//! connection drops are discarded along with the assembler.

use crate::protocol::command::BATCH_MARKER;
use std::collections::HashMap;
use tracing::trace;

/// A completed record set for one topic.
///
/// Rows are kept as raw payload strings, in arrival order; decoding is left
/// to the bound stream for the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationData {
    topic: String,
    position: String,
    rows: Vec<String>,
}

impl ReplicationData {
    fn open(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            position: String::new(),
            rows: Vec::new(),
        }
    }

    /// Build a finished record set directly.
    pub fn new(topic: impl Into<String>, position: impl Into<String>, rows: Vec<String>) -> Self {
        Self {
            topic: topic.into(),
            position: position.into(),
            rows,
        }
    }

    /// Topic name as sent by the server.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Terminal position of the batch.
    pub fn position(&self) -> &str {
        &self.position
    }

    /// Raw row payloads in arrival order.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Accumulates `RDATA` rows per topic until their batch closes.
#[derive(Debug, Default)]
pub struct BatchAssembler {
    /// Open batches keyed by topic (at most one per topic).
    pending: HashMap<String, ReplicationData>,
}

impl BatchAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row for a topic.
    ///
    /// Returns the completed record set when `position` is a terminal
    /// position, or `None` while the batch stays open.
    pub fn push(&mut self, topic: &str, position: &str, row: String) -> Option<ReplicationData> {
        self.pending
            .entry(topic.to_string())
            .or_insert_with(|| ReplicationData::open(topic))
            .rows
            .push(row);

        if position == BATCH_MARKER {
            trace!(topic = %topic, "Row added to open batch");
            return None;
        }

        let mut data = self.pending.remove(topic)?;
        data.position = position.to_string();
        Some(data)
    }

    /// Whether a topic has an open batch.
    pub fn is_open(&self, topic: &str) -> bool {
        self.pending.contains_key(topic)
    }

    /// Number of topics with an open batch.
    pub fn open_batches(&self) -> usize {
        self.pending.len()
    }

    /// Total rows buffered across all open batches.
    pub fn buffered_rows(&self) -> usize {
        self.pending.values().map(|b| b.rows.len()).sum()
    }

    /// Drop every open batch without delivering it.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}
