//! Configuration for the replication client.
//!
//! Configuration is passed to [`ReplicationClient::new()`](crate::ReplicationClient::new)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use synapse_replication::config::{ProtocolVersion, ReplicationConfig};
//!
//! let config = ReplicationConfig {
//!     client_name: "my-worker".into(),
//!     host: "synapse.internal".into(),
//!     protocol_version: ProtocolVersion::Current,
//!     ..Default::default()
//! };
//! assert_eq!(config.port(), 9092);
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── client_name: String             # Sent as NAME on connect
//! ├── protocol_version: ProtocolVersion
//! ├── host: String
//! ├── port: Option<u16>               # Default depends on transport
//! ├── transport: TransportConfig      # tcp | redis { channel }
//! ├── keepalive_interval_sec: u64
//! └── reconnect_delay_sec: u64
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! client_name: "appservice-bridge"
//! protocol_version: current
//! host: "redis.internal"
//! transport:
//!   kind: redis
//!   channel: "example.org"
//! reconnect_delay_sec: 5
//! ```

use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Name sent when the configured one is blank.
pub const DEFAULT_CLIENT_NAME: &str = "SynapseReplicationRs";

/// Default port of the TCP replication listener.
pub const DEFAULT_TCP_PORT: u16 = 9092;

/// Default Redis port.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

// ═══════════════════════════════════════════════════════════════════════════════
// ProtocolVersion: the two incompatible dialects
// ═══════════════════════════════════════════════════════════════════════════════

/// Which generation of the replication protocol the server speaks.
///
/// There is no negotiation: the caller must know which server it talks to.
///
/// | | Legacy | Current |
/// |---|---|---|
/// | Subscription | `REPLICATE <topic> <position>` per stream | one `REPLICATE ` for everything |
/// | Triggered by | bind + every connect | `SERVER` greeting |
/// | Per-topic subscribe / force position | allowed | `UnsupportedOperation` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    /// Servers before the protocol break (per-topic subscriptions).
    Legacy,
    /// Servers after the protocol break (global resync).
    #[default]
    Current,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Legacy => write!(f, "legacy"),
            ProtocolVersion::Current => write!(f, "current"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TransportConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Which channel carries the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Direct TCP connection to the replication listener.
    #[default]
    Tcp,
    /// Redis pub/sub; `channel` is the homeserver's hostname.
    Redis {
        #[serde(default = "default_channel")]
        channel: String,
    },
}

fn default_channel() -> String {
    "localhost".to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `ReplicationClient::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Identifies this client to the server (`NAME` command).
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Protocol dialect of the server.
    #[serde(default)]
    pub protocol_version: ProtocolVersion,

    /// Server (or Redis broker) host name.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port; `None` picks the transport's default.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Interval between keepalive pings on the TCP transport.
    #[serde(default = "default_keepalive_interval_sec")]
    pub keepalive_interval_sec: u64,

    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_reconnect_delay_sec")]
    pub reconnect_delay_sec: u64,
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_keepalive_interval_sec() -> u64 {
    5
}

fn default_reconnect_delay_sec() -> u64 {
    5
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            protocol_version: ProtocolVersion::default(),
            host: default_host(),
            port: None,
            transport: TransportConfig::default(),
            keepalive_interval_sec: default_keepalive_interval_sec(),
            reconnect_delay_sec: default_reconnect_delay_sec(),
        }
    }
}

impl ReplicationConfig {
    /// Create a minimal config for testing.
    ///
    /// Uses a 10ms reconnect delay so reconnect tests stay fast.
    pub fn for_testing(protocol_version: ProtocolVersion) -> Self {
        Self {
            client_name: "test-client".to_string(),
            protocol_version,
            reconnect_delay_sec: 0,
            ..Default::default()
        }
    }

    /// Client name to announce, falling back to the default for blank names.
    pub fn effective_client_name(&self) -> &str {
        if self.client_name.trim().is_empty() {
            DEFAULT_CLIENT_NAME
        } else {
            &self.client_name
        }
    }

    /// Configured port or the transport default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.transport {
            TransportConfig::Tcp => DEFAULT_TCP_PORT,
            TransportConfig::Redis { .. } => DEFAULT_REDIS_PORT,
        })
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_sec.max(1))
    }

    /// Reconnect policy: fixed delay, unbounded attempts.
    ///
    /// A zero delay maps to [`RetryConfig::testing()`].
    pub fn retry_config(&self) -> RetryConfig {
        if self.reconnect_delay_sec == 0 {
            RetryConfig::testing()
        } else {
            RetryConfig::fixed(Duration::from_secs(self.reconnect_delay_sec))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReplicationConfig::default();
        assert_eq!(config.client_name, DEFAULT_CLIENT_NAME);
        assert_eq!(config.protocol_version, ProtocolVersion::Current);
        assert_eq!(config.transport, TransportConfig::Tcp);
        assert_eq!(config.port(), DEFAULT_TCP_PORT);
        assert_eq!(config.keepalive_interval(), Duration::from_secs(5));
        assert_eq!(config.retry_config().initial_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_redis_default_port() {
        let config = ReplicationConfig {
            transport: TransportConfig::Redis {
                channel: "example.org".into(),
            },
            ..Default::default()
        };
        assert_eq!(config.port(), DEFAULT_REDIS_PORT);
    }

    #[test]
    fn test_explicit_port_wins() {
        let config = ReplicationConfig {
            port: Some(19092),
            ..Default::default()
        };
        assert_eq!(config.port(), 19092);
    }

    #[test]
    fn test_blank_client_name_falls_back() {
        let config = ReplicationConfig {
            client_name: "  ".into(),
            ..Default::default()
        };
        assert_eq!(config.effective_client_name(), DEFAULT_CLIENT_NAME);
    }

    #[test]
    fn test_for_testing_uses_fast_retry() {
        let config = ReplicationConfig::for_testing(ProtocolVersion::Legacy);
        assert_eq!(config.protocol_version, ProtocolVersion::Legacy);
        assert!(config.retry_config().initial_delay < Duration::from_secs(1));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "protocol_version": "legacy",
            "host": "redis.internal",
            "transport": {"kind": "redis", "channel": "example.org"}
        }"#;
        let config: ReplicationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.protocol_version, ProtocolVersion::Legacy);
        assert_eq!(config.host, "redis.internal");
        assert_eq!(
            config.transport,
            TransportConfig::Redis {
                channel: "example.org".into()
            }
        );
        assert_eq!(config.port(), DEFAULT_REDIS_PORT);
        assert_eq!(config.client_name, DEFAULT_CLIENT_NAME);
        assert_eq!(config.reconnect_delay_sec, 5);
    }

    #[test]
    fn test_protocol_version_display() {
        assert_eq!(ProtocolVersion::Legacy.to_string(), "legacy");
        assert_eq!(ProtocolVersion::Current.to_string(), "current");
    }
}
