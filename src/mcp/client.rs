use crate::config::McpServerConfig;
use crate::errors::PicobotError;
use crate::mcp::http::HttpTransport;
use crate::mcp::protocol::PROTOCOL_VERSION;
use crate::mcp::stdio::StdioTransport;
use crate::mcp::{Transport, REQUEST_TIMEOUT};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: String,
    #[serde(rename = "serverInfo", default)]
    pub server_info: ServerInfo,
    #[serde(default)]
    pub capabilities: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Servers send `inputSchema` per the MCP spec; `parameters` is
    /// accepted as a legacy alias.
    #[serde(rename = "inputSchema", alias = "parameters", default)]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<McpToolDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenate content items: text verbatim, anything else as a
    /// `[<type> content]` placeholder.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for item in &self.content {
            match (item.kind.as_str(), &item.text) {
                ("text", Some(text)) => out.push_str(text),
                (kind, _) => out.push_str(&format!("[{} content]", kind)),
            }
        }
        out
    }
}

/// One connection to one MCP server, over either transport.
pub struct McpClient {
    name: String,
    transport: Box<dyn Transport>,
    timeout: Duration,
    pub server_info: Option<ServerInfo>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("server_info", &self.server_info)
            .finish()
    }
}

impl McpClient {
    /// Build a client from config: `url` selects HTTP, else `command`
    /// selects stdio; neither is a config error.
    pub fn from_config(name: &str, cfg: &McpServerConfig) -> Result<Self> {
        let transport: Box<dyn Transport> = if let Some(url) = &cfg.url {
            Box::new(HttpTransport::new(url))
        } else if cfg.command.is_some() {
            Box::new(StdioTransport::spawn(cfg)?)
        } else {
            return Err(PicobotError::Config(format!(
                "mcp.servers.{} must set either 'url' or 'command'",
                name
            ))
            .into());
        };
        Ok(Self {
            name: name.to_string(),
            transport,
            timeout: REQUEST_TIMEOUT,
            server_info: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The MCP handshake: `initialize`, then `notifications/initialized`.
    /// A failed initialized notification is logged but not fatal.
    pub async fn initialize(&mut self) -> Result<InitializeResult> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "picobot",
                "version": "0.1.0",
            },
            "capabilities": {},
        });

        let result = self
            .transport
            .call("initialize", Some(params), self.timeout)
            .await
            .with_context(|| format!("initialize failed for MCP server '{}'", self.name))?;

        let init: InitializeResult =
            serde_json::from_value(result).context("failed to parse initialize result")?;

        if let Err(e) = self
            .transport
            .notify("notifications/initialized", None)
            .await
        {
            warn!(
                "[MCP] failed to send initialized notification to '{}': {}",
                self.name, e
            );
        }

        self.server_info = Some(init.server_info.clone());
        Ok(init)
    }

    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>> {
        let result = self
            .transport
            .call("tools/list", None, self.timeout)
            .await
            .with_context(|| format!("tools/list failed for MCP server '{}'", self.name))?;
        let list: ListToolsResult =
            serde_json::from_value(result).context("failed to parse tools list")?;
        Ok(list.tools)
    }

    pub async fn call_tool(&self, tool: &str, args: Value) -> Result<CallToolResult> {
        let params = json!({
            "name": tool,
            "arguments": args,
        });
        let result = self
            .transport
            .call("tools/call", Some(params), self.timeout)
            .await
            .with_context(|| {
                format!("tools/call '{}' failed on MCP server '{}'", tool, self.name)
            })?;
        serde_json::from_value(result).context("failed to parse tool call result")
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpServerConfig;

    #[test]
    fn test_from_config_requires_url_or_command() {
        let err = McpClient::from_config("empty", &McpServerConfig::default()).unwrap_err();
        assert!(err.to_string().contains("'url' or 'command'"));
    }

    #[test]
    fn test_render_concatenates_content_types() {
        let result = CallToolResult {
            content: vec![
                ContentItem {
                    kind: "text".into(),
                    text: Some("hello ".into()),
                },
                ContentItem {
                    kind: "image".into(),
                    text: None,
                },
                ContentItem {
                    kind: "text".into(),
                    text: Some("world".into()),
                },
            ],
            is_error: false,
        };
        assert_eq!(result.render(), "hello [image content]world");
    }

    #[test]
    fn test_tool_definition_accepts_both_schema_keys() {
        let modern: McpToolDefinition = serde_json::from_value(serde_json::json!({
            "name": "echo",
            "description": "d",
            "inputSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(modern.input_schema["type"], "object");

        let legacy: McpToolDefinition = serde_json::from_value(serde_json::json!({
            "name": "echo",
            "parameters": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(legacy.input_schema["type"], "object");
    }
}
