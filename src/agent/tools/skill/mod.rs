use crate::agent::skills::SkillManager;
use crate::agent::tools::base::{require_str, Tool};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct CreateSkillTool {
    skills: Arc<SkillManager>,
}

impl CreateSkillTool {
    pub fn new(skills: Arc<SkillManager>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for CreateSkillTool {
    fn name(&self) -> &str {
        "create_skill"
    }

    fn description(&self) -> &str {
        "Create or replace a skill: a reusable instruction file stored at skills/<name>/SKILL.md"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Skill name (letters, digits, '_' and '-')"
                },
                "description": {
                    "type": "string",
                    "description": "One-line summary shown in skill listings"
                },
                "content": {
                    "type": "string",
                    "description": "The skill instructions (markdown body)"
                }
            },
            "required": ["name", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let name = require_str(&args, "name")?;
        let content = require_str(&args, "content")?;
        let description = args
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        self.skills.create_skill(name, description, content)?;
        Ok(format!("Skill '{}' created successfully", name))
    }
}

pub struct ListSkillsTool {
    skills: Arc<SkillManager>,
}

impl ListSkillsTool {
    pub fn new(skills: Arc<SkillManager>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for ListSkillsTool {
    fn name(&self) -> &str {
        "list_skills"
    }

    fn description(&self) -> &str {
        "List installed skills with their descriptions"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value) -> Result<String> {
        let skills = self.skills.list_skills()?;
        if skills.is_empty() {
            return Ok("No skills installed.".to_string());
        }
        let lines: Vec<String> = skills
            .into_iter()
            .map(|s| {
                if s.description.is_empty() {
                    format!("- {}", s.name)
                } else {
                    format!("- {}: {}", s.name, s.description)
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

pub struct ReadSkillTool {
    skills: Arc<SkillManager>,
}

impl ReadSkillTool {
    pub fn new(skills: Arc<SkillManager>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for ReadSkillTool {
    fn name(&self) -> &str {
        "read_skill"
    }

    fn description(&self) -> &str {
        "Read a skill's full SKILL.md content by name"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The skill name to read"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let name = require_str(&args, "name")?;
        self.skills.get_skill(name)
    }
}

pub struct DeleteSkillTool {
    skills: Arc<SkillManager>,
}

impl DeleteSkillTool {
    pub fn new(skills: Arc<SkillManager>) -> Self {
        Self { skills }
    }
}

#[async_trait]
impl Tool for DeleteSkillTool {
    fn name(&self) -> &str {
        "delete_skill"
    }

    fn description(&self) -> &str {
        "Delete a skill and its directory by name"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "The skill name to delete"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let name = require_str(&args, "name")?;
        self.skills.delete_skill(name)?;
        Ok(format!("Skill '{}' deleted successfully", name))
    }
}

#[cfg(test)]
mod tests;
