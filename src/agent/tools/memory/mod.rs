use crate::agent::memory::MemoryStore;
use crate::agent::tools::base::{optional_bool, require_str, Tool};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Handle to the memory store of the conversation currently being
/// processed. The agent loop swaps the inner store before every message,
/// so a write issued while handling (ch, c1) can never land in (ch, c2).
#[derive(Clone, Default)]
pub struct ScopedMemory {
    inner: Arc<RwLock<Option<Arc<MemoryStore>>>>,
}

impl ScopedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, store: Arc<MemoryStore>) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(store);
    }

    pub fn get(&self) -> Result<Arc<MemoryStore>> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow::anyhow!("memory store is not configured"))
    }
}

pub struct WriteMemoryTool {
    memory: ScopedMemory,
}

impl WriteMemoryTool {
    pub fn new(memory: ScopedMemory) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for WriteMemoryTool {
    fn name(&self) -> &str {
        "write_memory"
    }

    fn description(&self) -> &str {
        "Write or append to memory (today's note or long-term MEMORY.md)"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "description": "Memory target: 'today' for daily note or 'long' for long-term memory",
                    "enum": ["today", "long"]
                },
                "content": {
                    "type": "string",
                    "description": "The content to write or append"
                },
                "append": {
                    "type": "boolean",
                    "description": "If true, append to existing content; if false, overwrite",
                    "default": true
                }
            },
            "required": ["target", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let target = require_str(&args, "target")?;
        let content = require_str(&args, "content")?;
        let append = optional_bool(&args, "append", true);
        let store = self.memory.get()?;

        match target {
            "today" => {
                store.append_today(content)?;
                Ok("appended to today".to_string())
            }
            "long" => {
                if append {
                    store.append_long_term(content)?;
                    Ok("appended to long-term memory".to_string())
                } else {
                    store.write_long_term(content)?;
                    Ok("wrote long-term memory".to_string())
                }
            }
            other => anyhow::bail!("unknown target '{}' (expected 'today' or 'long')", other),
        }
    }
}

pub struct ReadMemoryTool {
    memory: ScopedMemory,
}

impl ReadMemoryTool {
    pub fn new(memory: ScopedMemory) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ReadMemoryTool {
    fn name(&self) -> &str {
        "read_memory"
    }

    fn description(&self) -> &str {
        "Read recent daily notes or long-term memory"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "description": "Memory target: 'today' for recent daily notes or 'long' for long-term memory",
                    "enum": ["today", "long"],
                    "default": "long"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let target = args
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or("long");
        let store = self.memory.get()?;

        let content = match target {
            "today" => store.read_recent_daily(7)?,
            "long" => store.read_long_term()?,
            other => anyhow::bail!("unknown target '{}' (expected 'today' or 'long')", other),
        };

        if content.trim().is_empty() {
            Ok("(no memory recorded yet)".to_string())
        } else {
            Ok(content)
        }
    }
}
