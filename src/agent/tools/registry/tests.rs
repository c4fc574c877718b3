use super::*;
use async_trait::async_trait;

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {"text": {"type": "string"}},
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        Ok(args["text"].as_str().unwrap_or_default().to_string())
    }
}

struct FailTool;

#[async_trait]
impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> anyhow::Result<String> {
        anyhow::bail!("deliberate failure")
    }
}

#[tokio::test]
async fn test_register_and_execute() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool)).await;

    let out = registry
        .execute("echo", serde_json::json!({"text": "hi"}))
        .await
        .unwrap();
    assert_eq!(out, "hi");
}

#[tokio::test]
async fn test_unknown_tool_errors() {
    let registry = ToolRegistry::new();
    let err = registry
        .execute("nope", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("tool not found"));
}

#[tokio::test]
async fn test_empty_name_errors() {
    let registry = ToolRegistry::new();
    let err = registry.execute("", serde_json::json!({})).await.unwrap_err();
    assert!(err.to_string().contains("tool name is required"));
}

#[tokio::test]
async fn test_errors_surface_verbatim() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(FailTool)).await;

    let err = registry
        .execute("fail", serde_json::json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "deliberate failure");
}

#[tokio::test]
async fn test_definitions_sorted_by_name() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(FailTool)).await;
    registry.register(Arc::new(EchoTool)).await;

    let defs = registry.definitions().await;
    assert_eq!(defs.len(), 2);
    assert_eq!(defs[0].name, "echo");
    assert_eq!(defs[1].name, "fail");
    assert_eq!(defs[0].parameters["required"][0], "text");
}

#[tokio::test]
async fn test_duplicate_registration_overwrites() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool)).await;
    registry.register(Arc::new(EchoTool)).await;
    assert_eq!(registry.tool_names().await, vec!["echo"]);
}
