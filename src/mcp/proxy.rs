use crate::agent::tools::{Tool, ToolRegistry};
use crate::mcp::McpManager;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::info;

/// Bridges one discovered MCP tool into the agent's tool registry.
///
/// Holds only a weak handle to the manager: the agent loop owns the
/// manager, and shutdown order (loop, then manager, then clients, then
/// transports) must not be inverted by a tool keeping the manager alive.
pub struct McpProxyTool {
    manager: Weak<McpManager>,
    key: String,
    description: String,
    schema: Value,
}

#[async_trait]
impl Tool for McpProxyTool {
    fn name(&self) -> &str {
        &self.key
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let manager = self
            .manager
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("MCP manager has shut down"))?;
        manager.execute_tool(&self.key, args).await
    }
}

/// Diagnostic tool reporting per-tool MCP call counts.
pub struct McpStatsTool {
    manager: Weak<McpManager>,
}

#[async_trait]
impl Tool for McpStatsTool {
    fn name(&self) -> &str {
        "mcp_stats"
    }

    fn description(&self) -> &str {
        "Get statistics about MCP tool usage, including which tools have been called and how many times"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<String> {
        let Some(manager) = self.manager.upgrade() else {
            return Ok("No MCP manager configured".to_string());
        };
        let usage = manager.usage();
        if usage.is_empty() {
            return Ok("No MCP tools have been used yet in this session.".to_string());
        }
        let mut out = String::from("MCP Tool Usage Statistics:\n\n");
        for (tool, count) in usage {
            out.push_str(&format!("  - {}: {} call(s)\n", tool, count));
        }
        Ok(out)
    }
}

/// Register every discovered MCP tool plus the `mcp_stats` diagnostic.
pub async fn register_mcp_tools(manager: &Arc<McpManager>, registry: &ToolRegistry) {
    let defs = manager.definitions();
    info!("[MCP] registering {} MCP tool(s)", defs.len());

    for def in defs {
        registry
            .register(Arc::new(McpProxyTool {
                manager: Arc::downgrade(manager),
                key: def.name,
                description: def.description,
                schema: def.parameters,
            }))
            .await;
    }

    registry
        .register(Arc::new(McpStatsTool {
            manager: Arc::downgrade(manager),
        }))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpConfig;

    #[tokio::test]
    async fn test_stats_tool_reports_empty_usage() {
        let manager = Arc::new(McpManager::connect(&McpConfig::default()).await);
        let registry = ToolRegistry::new();
        register_mcp_tools(&manager, &registry).await;

        let out = registry
            .execute("mcp_stats", serde_json::json!({}))
            .await
            .unwrap();
        assert!(out.contains("No MCP tools have been used yet"));
    }

    #[tokio::test]
    async fn test_proxy_fails_after_manager_dropped() {
        let manager = Arc::new(McpManager::connect(&McpConfig::default()).await);
        let stats = McpStatsTool {
            manager: Arc::downgrade(&manager),
        };
        drop(manager);
        let out = stats.execute(serde_json::json!({})).await.unwrap();
        assert!(out.contains("No MCP manager configured"));
    }
}
