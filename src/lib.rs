//! # Synapse Replication
//!
//! A client for the Synapse homeserver replication protocol: a long-lived,
//! line-oriented command stream carrying per-topic change rows (events,
//! receipts, federation traffic, ...) to worker processes.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          ReplicationClient                                │
//! │                                                                           │
//! │  ┌──────────────┐   ┌────────────┐   ┌────────────┐   ┌────────────────┐  │
//! │  │  Transport   │──►│ LineFramer │──►│ Dispatcher │──►│ Replication-   │  │
//! │  │ (TCP/Redis)  │   │ (framing)  │   │ + batches  │   │ Stream<T>      │  │
//! │  └──────────────┘   └────────────┘   └────────────┘   │ (decode+deliver│  │
//! │         ▲                                  │          └────────────────┘  │
//! │         │ NAME / REPLICATE / PING / ...    ▼                              │
//! │         └───────────────────────── ReplicationEvent listeners             │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All inbound lines are handled on one supervisor task, strictly in order.
//! Lost connections are re-established every 5 seconds until the client is
//! explicitly disconnected.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use synapse_replication::{ProtocolVersion, ReplicationClient, ReplicationConfig};
//! use synapse_replication::rows::ReceiptStreamRow;
//!
//! #[tokio::main]
//! async fn main() -> synapse_replication::Result<()> {
//!     let config = ReplicationConfig {
//!         client_name: "receipt-worker".into(),
//!         protocol_version: ProtocolVersion::Current,
//!         ..Default::default()
//!     };
//!
//!     let client = ReplicationClient::new(config)?;
//!     let receipts = client.bind_stream::<ReceiptStreamRow>().await?;
//!     receipts.on_row(|r| println!("{} read {} in {}", r.user_id, r.event_id, r.room_id));
//!
//!     client.connect().await?;
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod resilience;
pub mod rows;
pub mod stream;
pub mod topic;
pub mod transport;

// Re-exports for convenience
pub use batch::ReplicationData;
pub use config::{ProtocolVersion, ReplicationConfig, TransportConfig};
pub use engine::{ConnectionState, ReplicationClient, ReplicationEvent};
pub use error::{ReplicationError, Result};
pub use rows::ReplicationRow;
pub use stream::ReplicationStream;
pub use topic::{StreamPosition, Topic, LATEST};
