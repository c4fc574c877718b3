use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse, ToolCallRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// OpenAI-compatible chat completions provider. Works against any endpoint
/// speaking the `/chat/completions` dialect by overriding `apiBase`.
pub struct OpenAIProvider {
    api_key: String,
    default_model: String,
    base_url: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        api_base: Option<String>,
        default_model: Option<String>,
        request_timeout_s: u64,
    ) -> Self {
        let base = api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self {
            api_key,
            default_model: default_model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: format!("{}/chat/completions", base.trim_end_matches('/')),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(Duration::from_secs(request_timeout_s))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn parse_response(json: &Value) -> Result<LLMResponse> {
        let choice = json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("No choices in chat completion response")?;

        let message = &choice["message"];
        let content = message["content"]
            .as_str()
            .map(std::string::ToString::to_string);

        let mut tool_calls = Vec::new();
        if let Some(tool_calls_array) = message["tool_calls"].as_array() {
            for tc in tool_calls_array {
                if let Some(function) = tc["function"].as_object() {
                    // Arguments arrive as a JSON-encoded string.
                    let arguments = function["arguments"]
                        .as_str()
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or_else(|| json!({}));

                    tool_calls.push(ToolCallRequest {
                        id: tc["id"].as_str().unwrap_or("").to_string(),
                        name: function["name"].as_str().unwrap_or("").to_string(),
                        arguments,
                    });
                }
            }
        }

        Ok(LLMResponse {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        let messages: Vec<Value> = req
            .messages
            .into_iter()
            .map(|msg| {
                let mut m = json!({
                    "role": msg.role,
                    "content": msg.content,
                });
                if let Some(tool_calls) = msg.tool_calls {
                    m["tool_calls"] = json!(tool_calls
                        .into_iter()
                        .map(|tc| {
                            let args_str = serde_json::to_string(&tc.arguments)
                                .unwrap_or_else(|_| "{}".to_string());
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": args_str
                                }
                            })
                        })
                        .collect::<Vec<_>>());
                }
                if let Some(tool_call_id) = msg.tool_call_id {
                    m["tool_call_id"] = json!(tool_call_id);
                }
                m
            })
            .collect();

        let mut payload = json!({
            "model": req.model.unwrap_or(&self.default_model),
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        if let Some(tools) = req.tools {
            if !tools.is_empty() {
                payload["tools"] = json!(tools
                    .into_iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    }))
                    .collect::<Vec<_>>());
            }
        }

        let resp = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .context("Failed to send chat completion request")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(500).collect();
            anyhow::bail!("provider returned {}: {}", status, excerpt);
        }

        let json: Value = resp
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        Self::parse_response(&json)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}
