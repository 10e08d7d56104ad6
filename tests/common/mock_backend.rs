//! In-memory transport for engine tests.
//!
//! Records every outbound line and lets the test play the server: text
//! pushed with [`MockBackend::push`] arrives on the client's inbound stream,
//! and [`MockBackend::drop_connection`] ends that stream as if the server had
//! hung up.

use futures::channel::mpsc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use synapse_replication::transport::{BackendFuture, Endpoint, InboundStream, ReplicationBackend};
use synapse_replication::{ReplicationError, Result};

pub struct MockBackend {
    greets: bool,
    sent: Mutex<Vec<String>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<Result<String>>>>,
    endpoints: Mutex<Vec<Endpoint>>,
    connects: AtomicUsize,
    fail_connects: AtomicUsize,
    fail_sends: AtomicBool,
}

impl MockBackend {
    /// Backend whose server greets with `SERVER` (like TCP).
    pub fn new() -> Self {
        Self::with_greeting(true)
    }

    /// Backend with no server greeting (like Redis).
    pub fn without_greeting() -> Self {
        Self::with_greeting(false)
    }

    fn with_greeting(greets: bool) -> Self {
        Self {
            greets,
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
            endpoints: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            fail_connects: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Deliver raw text to the client.
    pub fn push(&self, text: &str) {
        if let Some(tx) = self.inbound.lock().unwrap().as_ref() {
            let _ = tx.unbounded_send(Ok(text.to_string()));
        }
    }

    /// End the current inbound stream.
    pub fn drop_connection(&self) {
        self.inbound.lock().unwrap().take();
    }

    /// End the current inbound stream with a read error.
    pub fn fail_read(&self) {
        if let Some(tx) = self.inbound.lock().unwrap().take() {
            let _ = tx.unbounded_send(Err(ReplicationError::connect("mock", "connection reset")));
        }
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.fail_connects.store(count, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn has_sent(&self, line: &str) -> bool {
        self.sent.lock().unwrap().iter().any(|l| l == line)
    }

    pub fn count_sent(&self, line: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|l| *l == line).count()
    }

    /// Number of connect attempts, successful or not.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.inbound.lock().unwrap().is_some()
    }

    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.endpoints.lock().unwrap().last().cloned()
    }
}

impl ReplicationBackend for MockBackend {
    fn kind(&self) -> &'static str {
        "mock"
    }

    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BackendFuture<'a, InboundStream> {
        Box::pin(async move {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.endpoints.lock().unwrap().push(endpoint.clone());

            let failing = self
                .fail_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(ReplicationError::connect(endpoint.to_string(), "connection refused"));
            }

            let (tx, rx) = mpsc::unbounded();
            *self.inbound.lock().unwrap() = Some(tx);
            Ok(Box::pin(rx) as InboundStream)
        })
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.inbound.lock().unwrap().take();
            Ok(())
        })
    }

    fn send_raw<'a>(&'a self, line: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if self.inbound.lock().unwrap().is_none() {
                return Err(ReplicationError::NotConnected);
            }
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(ReplicationError::Send("broken pipe".to_string()));
            }
            self.sent.lock().unwrap().push(line.to_string());
            Ok(())
        })
    }

    fn greets_on_connect(&self) -> bool {
        self.greets
    }
}
