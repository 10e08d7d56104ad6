// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed per-topic streams.
//!
//! A [`ReplicationStream<T>`] is the caller's view of one topic: it tracks the
//! topic's position and turns every completed record set into decoded `T`
//! values. Streams are created through
//! [`ReplicationClient::bind_stream()`](crate::ReplicationClient::bind_stream)
//! and live as long as the client; they survive reconnects.
//!
//! # Delivery
//!
//! ```text
//! RecordSet(topic, pos, [r1, r2, r3])
//!     │
//!     ├─▶ position = pos ──▶ position listeners
//!     │
//!     └─▶ for each row, in order:
//!             decode ─┬─ Ok(row)  ──▶ row listeners
//!                     └─ Err(e)   ──▶ error listeners (next row continues)
//! ```
//!
//! Listeners run on the client's read task, synchronously and in arrival
//! order. A panicking listener is logged and counted; it never stops delivery
//! of the remaining rows or takes down the read task.

use crate::batch::ReplicationData;
use crate::error::ReplicationError;
use crate::metrics;
use crate::rows::ReplicationRow;
use crate::topic::{Topic, LATEST};
use std::any::type_name;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, warn};

type RowListener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type PositionListener = Arc<dyn Fn(&str) + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&ReplicationError) + Send + Sync>;

/// Handle to a bound stream. Cloning is cheap; clones share state.
pub struct ReplicationStream<T: ReplicationRow> {
    inner: Arc<StreamInner<T>>,
}

struct StreamInner<T> {
    position: Mutex<String>,
    row_listeners: RwLock<Vec<RowListener<T>>>,
    position_listeners: RwLock<Vec<PositionListener>>,
    error_listeners: RwLock<Vec<ErrorListener>>,
}

impl<T: ReplicationRow> Clone for ReplicationStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ReplicationRow> fmt::Debug for ReplicationStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationStream")
            .field("topic", &T::TOPIC)
            .field("position", &self.position())
            .finish()
    }
}

impl<T: ReplicationRow> ReplicationStream<T> {
    /// New stream starting at `position`; blank means [`LATEST`].
    pub(crate) fn new(position: &str) -> Self {
        let position = if position.trim().is_empty() {
            LATEST.to_string()
        } else {
            position.to_string()
        };

        Self {
            inner: Arc::new(StreamInner {
                position: Mutex::new(position),
                row_listeners: RwLock::new(Vec::new()),
                position_listeners: RwLock::new(Vec::new()),
                error_listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn topic(&self) -> Topic {
        T::TOPIC
    }

    /// Last position seen for this topic.
    pub fn position(&self) -> String {
        self.inner
            .position
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Register a callback for every decoded row.
    pub fn on_row<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        write_lock(&self.inner.row_listeners).push(Arc::new(listener));
    }

    /// Register a callback for every position change.
    pub fn on_position<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        write_lock(&self.inner.position_listeners).push(Arc::new(listener));
    }

    /// Register a callback for rows that failed to decode.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&ReplicationError) + Send + Sync + 'static,
    {
        write_lock(&self.inner.error_listeners).push(Arc::new(listener));
    }

    pub(crate) fn set_position(&self, position: &str) {
        *self
            .inner
            .position
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = position.to_string();

        debug!(topic = %T::TOPIC, position = %position, "Stream position updated");
        for listener in snapshot(&self.inner.position_listeners) {
            guarded(T::TOPIC, || listener(position));
        }
    }

    /// Update the position, then decode and deliver every row in order.
    pub(crate) fn deliver(&self, data: &ReplicationData) {
        self.set_position(data.position());

        let row_listeners = snapshot(&self.inner.row_listeners);
        let mut delivered = 0;

        for raw in data.rows() {
            match T::decode(raw) {
                Ok(row) => {
                    for listener in &row_listeners {
                        guarded(T::TOPIC, || listener(&row));
                    }
                    delivered += 1;
                }
                Err(e) => {
                    metrics::record_malformed_row(T::TOPIC.as_str());
                    warn!(topic = %T::TOPIC, error = %e, "Skipping malformed row");
                    for listener in snapshot(&self.inner.error_listeners) {
                        guarded(T::TOPIC, || listener(&e));
                    }
                }
            }
        }

        metrics::record_rows_delivered(T::TOPIC.as_str(), delivered);
    }
}

/// Type-erased view of a bound stream, as held by the client.
pub(crate) trait StreamSlot: Send + Sync {
    fn topic(&self) -> Topic;
    fn row_type(&self) -> &'static str;
    fn position(&self) -> String;
    fn set_position(&self, position: &str);
    fn deliver(&self, data: &ReplicationData);
}

impl<T: ReplicationRow> StreamSlot for ReplicationStream<T> {
    fn topic(&self) -> Topic {
        T::TOPIC
    }

    fn row_type(&self) -> &'static str {
        type_name::<T>()
    }

    fn position(&self) -> String {
        ReplicationStream::position(self)
    }

    fn set_position(&self, position: &str) {
        ReplicationStream::set_position(self, position)
    }

    fn deliver(&self, data: &ReplicationData) {
        ReplicationStream::deliver(self, data)
    }
}

fn write_lock<L>(lock: &RwLock<Vec<L>>) -> std::sync::RwLockWriteGuard<'_, Vec<L>> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Clone the listener list so callbacks run without holding the lock.
fn snapshot<L: Clone>(lock: &RwLock<Vec<L>>) -> Vec<L> {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Run a listener, containing any panic.
pub(crate) fn guarded(topic: impl fmt::Display, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        let topic = topic.to_string();
        metrics::record_listener_panic(&topic);
        error!(topic = %topic, "Listener panicked");
    }
}
