use crate::errors::PicobotError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    pub fn workspace_path(&self) -> PathBuf {
        crate::utils::get_workspace_path(&self.agents.defaults.workspace)
    }

    pub fn validate(&self) -> Result<(), PicobotError> {
        let d = &self.agents.defaults;
        if d.max_tokens == 0 {
            return Err(PicobotError::Config(
                "agents.defaults.maxTokens must be > 0".into(),
            ));
        }
        if d.temperature.is_nan()
            || d.temperature.is_infinite()
            || d.temperature < 0.0
            || d.temperature > 2.0
        {
            return Err(PicobotError::Config(
                "agents.defaults.temperature must be a finite number between 0.0 and 2.0".into(),
            ));
        }
        if d.max_tool_iterations == 0 {
            return Err(PicobotError::Config(
                "agents.defaults.maxToolIterations must be > 0".into(),
            ));
        }
        for (name, server) in &self.mcp.servers {
            if server.url.is_none() && server.command.is_none() {
                return Err(PicobotError::Config(format!(
                    "mcp.servers.{} must set either 'url' (HTTP) or 'command' (stdio)",
                    name
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_max_tokens", rename = "maxTokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tool_iterations", rename = "maxToolIterations")]
    pub max_tool_iterations: usize,
    #[serde(default = "default_heartbeat_interval", rename = "heartbeatIntervalS")]
    pub heartbeat_interval_s: u64,
    #[serde(default = "default_request_timeout", rename = "requestTimeoutS")]
    pub request_timeout_s: u64,
    #[serde(default = "default_exec_timeout", rename = "execTimeoutS")]
    pub exec_timeout_s: u64,
    #[serde(default = "default_true", rename = "stripThinkTags")]
    pub strip_think_tags: bool,
    /// Extra regex stripped from final responses alongside `<think>` blocks.
    #[serde(default, rename = "thinkTagPattern", skip_serializing_if = "Option::is_none")]
    pub think_tag_pattern: Option<String>,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_tool_iterations: default_max_tool_iterations(),
            heartbeat_interval_s: default_heartbeat_interval(),
            request_timeout_s: default_request_timeout(),
            exec_timeout_s: default_exec_timeout(),
            strip_think_tags: true,
            think_tag_pattern: None,
        }
    }
}

fn default_workspace() -> String {
    "~/.picobot/workspace".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tool_iterations() -> usize {
    100
}

fn default_heartbeat_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    120
}

fn default_exec_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "allowFrom")]
    pub allow_from: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            allow_from: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("enabled", &self.enabled)
            .field(
                "token",
                &if self.token.is_empty() {
                    "[empty]"
                } else {
                    "[REDACTED]"
                },
            )
            .field("allow_from", &self.allow_from)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "allowFrom")]
    pub allow_from: Vec<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            allow_from: Vec::new(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("enabled", &self.enabled)
            .field(
                "token",
                &if self.token.is_empty() {
                    "[empty]"
                } else {
                    "[REDACTED]"
                },
            )
            .field("allow_from", &self.allow_from)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default, rename = "apiBase", skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field(
                "api_key",
                &if self.api_key.is_empty() {
                    "[empty]"
                } else {
                    "[REDACTED]"
                },
            )
            .field("api_base", &self.api_base)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MCP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    /// Keyed by server name. BTreeMap keeps serialization deterministic.
    #[serde(default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpServerConfig {
    /// Stdio transport: program to spawn (e.g. "npx", "uvx").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// HTTP transport: base URL of the server. Takes precedence over `command`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Web UI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

fn default_web_host() -> String {
    "127.0.0.1".to_string()
}

fn default_web_port() -> u16 {
    8080
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.agents.defaults.max_tool_iterations, 100);
        assert_eq!(cfg.agents.defaults.heartbeat_interval_s, 60);
        assert!(cfg.agents.defaults.strip_think_tags);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_camel_case_round_trip() {
        let json = serde_json::json!({
            "agents": {"defaults": {"maxTokens": 1000, "maxToolIterations": 5}},
            "channels": {"telegram": {"enabled": true, "token": "t", "allowFrom": ["1"]}},
            "providers": {"openai": {"apiKey": "k"}},
            "mcp": {"servers": {"echo": {"command": "echo-server"}}}
        });
        let cfg: Config = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.agents.defaults.max_tokens, 1000);
        assert_eq!(cfg.agents.defaults.max_tool_iterations, 5);
        assert_eq!(cfg.channels.telegram.allow_from, vec!["1"]);
        assert_eq!(cfg.providers.openai.api_key, "k");

        let out = serde_json::to_value(&cfg).unwrap();
        assert_eq!(out["agents"]["defaults"]["maxTokens"], 1000);
        assert_eq!(out["channels"]["telegram"]["allowFrom"][0], "1");
        assert_eq!(out["providers"]["openai"]["apiKey"], "k");
    }

    #[test]
    fn test_mcp_server_requires_url_or_command() {
        let mut cfg = Config::default();
        cfg.mcp
            .servers
            .insert("bad".to_string(), McpServerConfig::default());
        assert!(cfg.validate().is_err());

        cfg.mcp.servers.get_mut("bad").unwrap().command = Some("npx".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = TelegramConfig {
            enabled: true,
            token: "secret-token".to_string(),
            allow_from: vec![],
        };
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
