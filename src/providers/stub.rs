use crate::providers::base::{ChatRequest, LLMProvider, LLMResponse};
use async_trait::async_trait;

/// Canned-response provider for tests and channel connectivity checks.
/// Echoes the last user message back without any tool calls.
pub struct StubProvider {
    model: String,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            model: "stub".to_string(),
        }
    }
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for StubProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LLMResponse::text(format!("echo: {}", last_user)))
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::base::Message;

    #[tokio::test]
    async fn test_stub_echoes_last_user_message() {
        let provider = StubProvider::new();
        let resp = provider
            .chat(ChatRequest {
                messages: vec![Message::system("sys"), Message::user("hello")],
                tools: None,
                model: None,
                max_tokens: 10,
                temperature: 0.0,
            })
            .await
            .unwrap();
        assert_eq!(resp.content.as_deref(), Some("echo: hello"));
    }
}
