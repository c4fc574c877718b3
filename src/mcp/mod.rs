pub mod client;
pub mod http;
pub mod manager;
pub mod protocol;
pub mod proxy;
pub mod stdio;

pub use client::McpClient;
pub use manager::McpManager;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Default per-request timeout for MCP calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace period before a stdio server child is killed on shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON-RPC 2.0 framing over one of the supported transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the matching response's `result`.
    async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Close the transport. Must be idempotent.
    async fn close(&self) -> Result<()>;
}
