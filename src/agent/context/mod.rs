use crate::agent::memory::{ranked_recall, MemoryStore, RecallRanker, RECALL_TOP_K};
use crate::agent::skills::SkillManager;
use crate::providers::base::Message;
use crate::session::Turn;
use anyhow::{Context, Result};
use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable system texts loaded from the workspace, in prompt order.
const BOOTSTRAP_FILES: &[&str] = &["SOUL.md", "AGENTS.md", "USER.md", "TOOLS.md"];

/// Assembles the provider context for one inbound message:
/// bootstrap system texts, ranked memory recall, the session window,
/// and the current user message - in that order.
pub struct ContextBuilder {
    workspace: PathBuf,
    ranker: Arc<dyn RecallRanker>,
    skills: Arc<SkillManager>,
    bootstrap_cache: Option<String>,
    bootstrap_mtimes: HashMap<String, u64>,
}

impl ContextBuilder {
    pub fn new(
        workspace: impl AsRef<Path>,
        ranker: Arc<dyn RecallRanker>,
        skills: Arc<SkillManager>,
    ) -> Result<Self> {
        let workspace = workspace.as_ref().to_path_buf();
        std::fs::create_dir_all(&workspace).with_context(|| {
            format!("Failed to create workspace directory: {}", workspace.display())
        })?;
        Ok(Self {
            workspace,
            ranker,
            skills,
            bootstrap_cache: None,
            bootstrap_mtimes: HashMap::new(),
        })
    }

    pub async fn build_messages(
        &mut self,
        memory: &MemoryStore,
        history: &[Turn],
        current_message: &str,
        channel: &str,
        chat_id: &str,
    ) -> Result<Vec<Message>> {
        let mut system = String::new();

        let now = Local::now();
        system.push_str(&format!(
            "You are picobot, a helpful AI assistant with tools.\n\
             Current date: {}\nWorkspace: {}\n",
            now.format("%Y-%m-%d (%A) %H:%M %Z"),
            self.workspace.display()
        ));

        let bootstrap = self.load_bootstrap_files()?;
        if !bootstrap.is_empty() {
            system.push_str("\n---\n\n");
            system.push_str(&bootstrap);
        }

        let recall = self.build_recall(memory, current_message).await?;
        if !recall.is_empty() {
            system.push_str("\n---\n\n# Memory\n\n");
            system.push_str(&recall);
        }

        let skills = self.list_skills();
        if !skills.is_empty() {
            system.push_str(
                "\n---\n\n# Skills\n\nLoad a skill with the read_skill tool before using it.\n\n",
            );
            system.push_str(&skills);
        }

        system.push_str(&format!(
            "\n\n## Current Session\nChannel: {}\nChat ID: {}",
            channel, chat_id
        ));

        let mut messages = vec![Message::system(system)];

        // Session window. Tool turns stay on disk for inspection but are
        // not replayed: providers require tool messages to pair with the
        // assistant tool-call message that produced them.
        for turn in history {
            if turn.content.is_empty() || turn.role == "tool" {
                continue;
            }
            messages.push(Message {
                role: turn.role.clone(),
                content: turn.content.clone(),
                ..Default::default()
            });
        }

        messages.push(Message::user(current_message));
        Ok(messages)
    }

    /// LLM-ranked recall over memory snippets, top-K bounded. Ranker
    /// failures fall back to the most recent snippets.
    async fn build_recall(&self, memory: &MemoryStore, query: &str) -> Result<String> {
        let candidates = memory.recall_candidates()?;
        if candidates.is_empty() {
            return Ok(String::new());
        }
        let indices = ranked_recall(self.ranker.as_ref(), query, &candidates, RECALL_TOP_K).await;
        let parts: Vec<String> = indices
            .into_iter()
            .filter_map(|i| candidates.get(i))
            .map(|c| format!("**{}**: {}", c.source, c.content))
            .collect();
        Ok(parts.join("\n\n"))
    }

    /// One line per installed skill, so the model can load them on
    /// demand (via `read_skill`) instead of inflating every prompt.
    fn list_skills(&self) -> String {
        let skills = self.skills.list_skills().unwrap_or_default();
        skills
            .into_iter()
            .map(|s| {
                if s.description.is_empty() {
                    format!("- {} (skills/{}/SKILL.md)", s.name, s.name)
                } else {
                    format!("- {}: {} (skills/{}/SKILL.md)", s.name, s.description, s.name)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Bootstrap texts are cached until any file's mtime changes.
    fn load_bootstrap_files(&mut self) -> Result<String> {
        let mut current_mtimes = HashMap::new();
        for filename in BOOTSTRAP_FILES {
            let path = self.workspace.join(filename);
            if let Ok(meta) = std::fs::metadata(&path) {
                if let Ok(mtime) = meta.modified() {
                    if let Ok(duration) = mtime.duration_since(std::time::UNIX_EPOCH) {
                        current_mtimes.insert((*filename).to_string(), duration.as_secs());
                    }
                }
            }
        }

        if let Some(ref cache) = self.bootstrap_cache {
            if current_mtimes == self.bootstrap_mtimes {
                return Ok(cache.clone());
            }
        }

        let mut parts = Vec::new();
        for filename in BOOTSTRAP_FILES {
            let path = self.workspace.join(filename);
            if path.exists() {
                if let Ok(content) = std::fs::read_to_string(&path) {
                    parts.push(format!("## {}\n\n{}", filename, content));
                }
            }
        }

        let cache = parts.join("\n\n");
        self.bootstrap_cache = Some(cache.clone());
        self.bootstrap_mtimes = current_mtimes;
        Ok(cache)
    }
}
