// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Testcontainers setup for Redis.
//!
//! Provides helpers to spin up a Redis broker that plays the homeserver's
//! pub/sub side in integration tests.

use redis::AsyncCommands;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

/// Create a vanilla Redis container.
///
/// Uses official redis:7 image. Waits for "Ready to accept connections".
pub fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// Get the Redis URL for a container.
pub fn redis_url(container: &Container<'_, GenericImage>) -> String {
    let port = container.get_host_port_ipv4(6379);
    format!("redis://127.0.0.1:{}", port)
}

/// A Redis broker standing in for the homeserver's side of the channel.
pub struct TestHomeserver<'a> {
    #[allow(dead_code)] // Kept alive for container lifetime
    container: Container<'a, GenericImage>,
    pub channel: String,
    pub port: u16,
    pub redis_url: String,
}

impl<'a> TestHomeserver<'a> {
    pub fn new(docker: &'a Cli, channel: &str) -> Self {
        let container = redis_container(docker);
        let port = container.get_host_port_ipv4(6379);
        let redis_url = redis_url(&container);
        Self {
            container,
            channel: channel.to_string(),
            port,
            redis_url,
        }
    }

    /// Publish one command on the replication channel, as the server would.
    pub async fn publish(&self, command: &str) -> redis::RedisResult<i64> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        conn.publish(&self.channel, command).await
    }

    /// Open a subscription that sees what clients publish.
    pub async fn listen(&self) -> redis::RedisResult<redis::aio::PubSub> {
        let client = redis::Client::open(self.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        Ok(pubsub)
    }
}
