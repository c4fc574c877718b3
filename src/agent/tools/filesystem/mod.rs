use crate::agent::tools::base::{require_str, Tool};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Read, write and list files inside the workspace.
///
/// The sandbox is kernel-enforced: every operation goes through a `Dir`
/// handle anchored at the workspace (openat-style resolution that refuses
/// to traverse above the anchor). Symlinks pointing outside the workspace
/// and `..` traversal fail at the syscall layer, so there is no
/// check-then-use race to exploit.
pub struct FilesystemTool {
    root: Dir,
}

impl FilesystemTool {
    pub fn new(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref();
        std::fs::create_dir_all(workspace).with_context(|| {
            format!("Failed to create workspace directory: {}", workspace.display())
        })?;
        let root = Dir::open_ambient_dir(workspace, ambient_authority())
            .with_context(|| format!("Failed to open workspace root: {}", workspace.display()))?;
        Ok(Self { root })
    }

    fn read(&self, path: &str) -> Result<String> {
        self.root
            .read_to_string(path)
            .with_context(|| format!("cannot read '{}'", path))
    }

    fn write(&self, path: &str, content: &str) -> Result<String> {
        let parent = PathBuf::from(path);
        if let Some(dir) = parent.parent() {
            if !dir.as_os_str().is_empty() {
                self.root
                    .create_dir_all(dir)
                    .with_context(|| format!("cannot create parent directories for '{}'", path))?;
            }
        }
        self.root
            .write(path, content.as_bytes())
            .with_context(|| format!("cannot write '{}'", path))?;
        Ok("written".to_string())
    }

    fn list(&self, path: &str) -> Result<String> {
        let entries = self
            .root
            .read_dir(path)
            .with_context(|| format!("cannot list '{}'", path))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let mut name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        let mut out = names.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}

#[async_trait]
impl Tool for FilesystemTool {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn description(&self) -> &str {
        "Read, write, and list files in the workspace"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "description": "The filesystem operation to perform",
                    "enum": ["read", "write", "list"]
                },
                "path": {
                    "type": "string",
                    "description": "The file or directory path (relative to workspace)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (required when action is 'write')"
                }
            },
            "required": ["action", "path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let action = require_str(&args, "action")?;
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .unwrap_or(".");

        match action {
            "read" => self.read(path),
            "write" => {
                let content = require_str(&args, "content")?;
                self.write(path, content)
            }
            "list" => self.list(path),
            other => anyhow::bail!("unknown action '{}' (expected read, write or list)", other),
        }
    }
}

#[cfg(test)]
mod tests;
