use async_trait::async_trait;
use serde_json::Value;

/// A capability callable by the agent.
///
/// Implementations return `Ok(result)` on success and `Err` for anything
/// the model should see as a failure (validation, sandbox denial,
/// transient I/O). The registry turns errors into tool-result turns so
/// the loop never aborts on a failed tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's argument object.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

/// Convenience accessors over the `args` object with uniform error texts.
pub fn require_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("'{}' argument required and must be a string", key))
}

pub fn optional_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}
