use crate::config::McpConfig;
use crate::mcp::client::McpClient;
use crate::providers::base::ToolDefinition;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

/// An MCP tool as registered with the manager: which client serves it
/// and under what wire name.
struct McpToolEntry {
    client: Arc<McpClient>,
    tool_name: String,
    description: String,
    schema: Value,
}

/// Owns one client per configured MCP server and namespaces their tools
/// as `mcp_<server>_<tool>`.
pub struct McpManager {
    clients: Vec<Arc<McpClient>>,
    tools: RwLock<HashMap<String, McpToolEntry>>,
    usage: Mutex<HashMap<String, u64>>,
}

/// Replace characters that are not valid in a tool key.
fn sanitize_key_part(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn tool_key(server: &str, tool: &str) -> String {
    format!("mcp_{}_{}", sanitize_key_part(server), sanitize_key_part(tool))
}

impl McpManager {
    /// Connect to every configured server. A server that fails to
    /// connect, initialize, or list its tools is logged and skipped -
    /// the rest of the agent starts regardless.
    pub async fn connect(config: &McpConfig) -> Self {
        let mut clients = Vec::new();
        let mut tools: HashMap<String, McpToolEntry> = HashMap::new();

        for (name, server_cfg) in &config.servers {
            let mut client = match McpClient::from_config(name, server_cfg) {
                Ok(client) => client,
                Err(e) => {
                    warn!("[MCP] failed to create client for '{}': {}", name, e);
                    continue;
                }
            };

            let init = match client.initialize().await {
                Ok(init) => init,
                Err(e) => {
                    warn!("[MCP] failed to initialize server '{}': {}", name, e);
                    let _ = client.close().await;
                    continue;
                }
            };
            info!(
                "[MCP] connected to '{}' ({} {}, protocol {})",
                name,
                init.server_info.name,
                init.server_info.version,
                init.protocol_version
            );

            let discovered = match client.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!("[MCP] failed to list tools from '{}': {}", name, e);
                    let _ = client.close().await;
                    continue;
                }
            };
            info!("[MCP] server '{}' provides {} tool(s)", name, discovered.len());

            let client = Arc::new(client);
            for tool in discovered {
                let key = tool_key(name, &tool.name);
                if tools.contains_key(&key) {
                    warn!("[MCP] tool key collision on '{}', overwriting", key);
                }
                tools.insert(
                    key,
                    McpToolEntry {
                        client: client.clone(),
                        tool_name: tool.name,
                        description: format!("[{}] {}", name, tool.description),
                        schema: if tool.input_schema.is_null() {
                            serde_json::json!({"type": "object", "properties": {}})
                        } else {
                            tool.input_schema
                        },
                    },
                );
            }
            clients.push(client);
        }

        Self {
            clients,
            tools: RwLock::new(tools),
            usage: Mutex::new(HashMap::new()),
        }
    }

    /// Tool descriptors for all discovered MCP tools.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let tools = self
            .tools
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut defs: Vec<ToolDefinition> = tools
            .iter()
            .map(|(key, entry)| ToolDefinition {
                name: key.clone(),
                description: entry.description.clone(),
                parameters: entry.schema.clone(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn has_tools(&self) -> bool {
        !self
            .tools
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_empty()
    }

    /// Invoke a namespaced MCP tool and render its content to a string.
    /// An `isError` result surfaces as an error.
    pub async fn execute_tool(&self, key: &str, args: Value) -> Result<String> {
        let (client, tool_name) = {
            let tools = self
                .tools
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = tools
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("MCP tool not found: {}", key))?;
            (entry.client.clone(), entry.tool_name.clone())
        };

        let result = client.call_tool(&tool_name, args).await?;
        if result.is_error {
            anyhow::bail!("MCP tool returned error: {}", result.render());
        }

        {
            let mut usage = self
                .usage
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *usage.entry(key.to_string()).or_insert(0) += 1;
        }

        Ok(result.render())
    }

    /// Per-tool call counts, sorted by key.
    pub fn usage(&self) -> Vec<(String, u64)> {
        let usage = self
            .usage
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut entries: Vec<(String, u64)> =
            usage.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort();
        entries
    }

    /// Close every client; clients close their transports.
    pub async fn shutdown(&self) {
        for client in &self.clients {
            if let Err(e) = client.close().await {
                warn!("[MCP] error closing client '{}': {}", client.name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_key_namespacing() {
        assert_eq!(tool_key("echo", "echo"), "mcp_echo_echo");
        assert_eq!(tool_key("my server", "do:thing"), "mcp_my_server_do_thing");
    }

    #[tokio::test]
    async fn test_connect_with_no_servers_is_empty() {
        let manager = McpManager::connect(&McpConfig::default()).await;
        assert!(!manager.has_tools());
        assert!(manager.definitions().is_empty());
        assert!(manager.usage().is_empty());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_errors() {
        let manager = McpManager::connect(&McpConfig::default()).await;
        let err = manager
            .execute_tool("mcp_missing_tool", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("MCP tool not found"));
    }
}
