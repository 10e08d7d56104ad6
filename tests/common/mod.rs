//! Shared test utilities for engine, TCP and integration tests.
//!
//! This module provides:
//! - An in-memory `MockBackend` that records outbound lines
//! - Redis testcontainer setup
//! - Polling helpers for asynchronous assertions

#![allow(dead_code)]

pub mod containers;
pub mod mock_backend;

pub use containers::*;
pub use mock_backend::*;

use std::time::Duration;

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
