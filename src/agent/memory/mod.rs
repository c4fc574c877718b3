use crate::providers::base::{ChatRequest, LLMProvider, Message};
use crate::utils::safe_filename;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// How many recent daily notes are offered to the recall ranker.
const RECALL_DAILY_FILES: usize = 7;
/// Candidate snippets are truncated to this many characters.
const SNIPPET_MAX_CHARS: usize = 2000;
/// Default number of snippets selected into the context.
pub const RECALL_TOP_K: usize = 6;

/// Notes for ONE conversation: a directory holding `MEMORY.md` (long-term)
/// and append-only `YYYY-MM-DD.md` daily files. The agent loop creates one
/// store per (channel, chat) so writes can never cross conversation keys.
pub struct MemoryStore {
    memory_dir: PathBuf,
}

impl MemoryStore {
    /// Open the store rooted at `workspace/memory/<channel>/<chat>/`.
    pub fn for_conversation(
        workspace: impl AsRef<Path>,
        channel: &str,
        chat_id: &str,
    ) -> Result<Self> {
        let memory_dir = workspace
            .as_ref()
            .join("memory")
            .join(safe_filename(channel))
            .join(safe_filename(chat_id));
        std::fs::create_dir_all(&memory_dir).with_context(|| {
            format!("Failed to create memory directory: {}", memory_dir.display())
        })?;
        Ok(Self { memory_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.memory_dir
    }

    fn today_key() -> String {
        let now = Utc::now();
        format!("{}-{:02}-{:02}", now.year(), now.month(), now.day())
    }

    pub fn today_file(&self) -> PathBuf {
        self.memory_dir.join(format!("{}.md", Self::today_key()))
    }

    /// Append to today's daily note, creating it with a date header.
    pub fn append_today(&self, content: &str) -> Result<()> {
        let path = self.today_file();
        if path.exists() {
            let existing = std::fs::read_to_string(&path)?;
            std::fs::write(&path, format!("{}\n{}", existing, content))?;
        } else {
            std::fs::write(&path, format!("# {}\n\n{}", Self::today_key(), content))?;
        }
        Ok(())
    }

    pub fn read_long_term(&self) -> Result<String> {
        let path = self.memory_dir.join("MEMORY.md");
        if path.exists() {
            Ok(std::fs::read_to_string(&path)?)
        } else {
            Ok(String::new())
        }
    }

    pub fn write_long_term(&self, content: &str) -> Result<()> {
        std::fs::write(self.memory_dir.join("MEMORY.md"), content)?;
        Ok(())
    }

    pub fn append_long_term(&self, content: &str) -> Result<()> {
        let prev = self.read_long_term()?;
        if prev.is_empty() {
            self.write_long_term(content)
        } else {
            self.write_long_term(&format!("{}\n{}", prev.trim_end(), content))
        }
    }

    /// Read recent daily notes, newest first, for `read_memory`.
    pub fn read_recent_daily(&self, days: usize) -> Result<String> {
        let mut files = self.daily_files()?;
        files.reverse(); // newest first
        let mut parts = Vec::new();
        for path in files.into_iter().take(days) {
            if let Ok(content) = std::fs::read_to_string(&path) {
                if !content.trim().is_empty() {
                    parts.push(content.trim_end().to_string());
                }
            }
        }
        Ok(parts.join("\n\n---\n\n"))
    }

    /// Candidate snippets for recall ranking: long-term memory paragraphs
    /// plus whole recent daily notes, each truncated.
    pub fn recall_candidates(&self) -> Result<Vec<MemorySnippet>> {
        let mut candidates = Vec::new();

        let long_term = self.read_long_term()?;
        for para in long_term.split("\n\n") {
            let para = para.trim();
            if !para.is_empty() {
                candidates.push(MemorySnippet {
                    source: "MEMORY.md".to_string(),
                    content: truncate_chars(para, SNIPPET_MAX_CHARS),
                });
            }
        }

        let mut files = self.daily_files()?;
        files.reverse();
        for path in files.into_iter().take(RECALL_DAILY_FILES) {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Ok(content) = std::fs::read_to_string(&path) {
                let content = content.trim();
                if !content.is_empty() {
                    candidates.push(MemorySnippet {
                        source: name,
                        content: truncate_chars(content, SNIPPET_MAX_CHARS),
                    });
                }
            }
        }

        Ok(candidates)
    }

    /// Daily note files sorted by name (dates sort lexicographically).
    fn daily_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.memory_dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().and_then(|e| e.to_str()) == Some("md")
                    && p.file_name().and_then(|n| n.to_str()) != Some("MEMORY.md")
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

#[derive(Debug, Clone)]
pub struct MemorySnippet {
    pub source: String,
    pub content: String,
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Ranks memory snippets by relevance to the incoming message.
#[async_trait]
pub trait RecallRanker: Send + Sync {
    /// Return indices into `candidates`, most relevant first, at most `top_k`.
    async fn rank(
        &self,
        query: &str,
        candidates: &[MemorySnippet],
        top_k: usize,
    ) -> Result<Vec<usize>>;
}

/// Default ranker: asks the LLM which snippets matter for the query.
/// A malformed or failed response falls back to the most recent snippets
/// at the call site.
pub struct LlmRecallRanker {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl LlmRecallRanker {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl RecallRanker for LlmRecallRanker {
    async fn rank(
        &self,
        query: &str,
        candidates: &[MemorySnippet],
        top_k: usize,
    ) -> Result<Vec<usize>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut listing = String::new();
        for (i, c) in candidates.iter().enumerate() {
            listing.push_str(&format!("[{}] ({}) {}\n\n", i, c.source, c.content));
        }
        let prompt = format!(
            "Select the memory snippets most relevant to the user's message.\n\
             Reply with ONLY a JSON array of snippet indices, most relevant first, \
             at most {} entries. Reply [] if none are relevant.\n\n\
             User message:\n{}\n\nSnippets:\n{}",
            top_k, query, listing
        );

        let resp = self
            .provider
            .chat(ChatRequest {
                messages: vec![Message::user(prompt)],
                tools: None,
                model: Some(&self.model),
                max_tokens: 256,
                temperature: 0.0,
            })
            .await?;

        let text = resp.content.unwrap_or_default();
        let indices = parse_index_array(&text, candidates.len(), top_k)
            .context("ranker returned no parsable index array")?;
        debug!("recall ranker selected {:?}", indices);
        Ok(indices)
    }
}

/// Extract a JSON array of indices from ranker output, tolerating prose
/// around the array. Out-of-range and duplicate indices are dropped.
fn parse_index_array(text: &str, len: usize, top_k: usize) -> Option<Vec<usize>> {
    let start = text.find('[')?;
    let end = text[start..].find(']')? + start;
    let arr: Vec<serde_json::Value> = serde_json::from_str(&text[start..=end]).ok()?;

    let mut seen = std::collections::HashSet::new();
    let mut indices = Vec::new();
    for v in arr {
        if let Some(i) = v.as_u64() {
            let i = i as usize;
            if i < len && seen.insert(i) {
                indices.push(i);
            }
        }
    }
    indices.truncate(top_k);
    Some(indices)
}

/// Run the ranker with a fallback: on error the most recent `top_k`
/// candidates (the tail of the list) are used.
pub async fn ranked_recall(
    ranker: &dyn RecallRanker,
    query: &str,
    candidates: &[MemorySnippet],
    top_k: usize,
) -> Vec<usize> {
    match ranker.rank(query, candidates, top_k).await {
        Ok(indices) => indices,
        Err(e) => {
            warn!("recall ranker failed, falling back to recency: {}", e);
            let start = candidates.len().saturating_sub(top_k);
            (start..candidates.len()).collect()
        }
    }
}

#[cfg(test)]
mod tests;
