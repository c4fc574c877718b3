use crate::agent::tools::Tool;
use crate::providers::base::ToolDefinition;
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Named-tool dispatch. Reads are frequent (every provider round), writes
/// happen only at startup - a readers/writer lock suffices.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().await;
        if tools.insert(name.clone(), tool).is_some() {
            warn!("tool registry: overwriting duplicate tool '{}'", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    pub async fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool descriptors passed to the provider, sorted by name for a
    /// stable prompt.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        let mut defs: Vec<ToolDefinition> = tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool by name. Logs name, argument JSON, elapsed time and
    /// result size; errors are surfaced verbatim to the caller.
    pub async fn execute(&self, name: &str, args: Value) -> Result<String> {
        if name.is_empty() {
            anyhow::bail!("tool name is required");
        }
        let tool = self
            .get(name)
            .await
            .ok_or_else(|| anyhow::anyhow!("tool not found: {}", name))?;

        let args_json = serde_json::to_string(&args).unwrap_or_else(|_| "{}".to_string());
        info!("[tool] -> {} {}", name, args_json);
        let start = Instant::now();

        match tool.execute(args).await {
            Ok(result) => {
                info!(
                    "[tool] ok {} completed in {:?} ({} bytes)",
                    name,
                    start.elapsed(),
                    result.len()
                );
                Ok(result)
            }
            Err(e) => {
                warn!("[tool] err {} failed after {:?}: {}", name, start.elapsed(), e);
                Err(e)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
