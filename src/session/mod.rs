use crate::utils::{atomic_write, ensure_dir, safe_filename};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

const MAX_CACHED_SESSIONS: usize = 64;

/// Rolling window size: one conversation keeps at most this many turns.
pub const SESSION_WINDOW: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub turns: Vec<Turn>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            turns: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Append a turn; trims the head once the window is exceeded.
    pub fn add_turn(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.turns.push(Turn {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();

        if self.turns.len() > SESSION_WINDOW {
            let drain = self.turns.len() - SESSION_WINDOW;
            self.turns.drain(..drain);
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.turns
    }
}

/// File-backed session storage: one JSON document per conversation at
/// `sessions/<channel>/<chat>.json`, with a small in-memory LRU on top.
pub struct SessionManager {
    sessions_dir: PathBuf,
    cache: Mutex<LruCache<String, Session>>,
}

impl SessionManager {
    pub fn new(workspace: impl Into<PathBuf>) -> Result<Self> {
        let sessions_dir = ensure_dir(workspace.into().join("sessions"))?;
        Ok(Self {
            sessions_dir,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_CACHED_SESSIONS).expect("cache size must be > 0"),
            )),
        })
    }

    fn session_path(&self, channel: &str, chat_id: &str) -> PathBuf {
        self.sessions_dir
            .join(safe_filename(channel))
            .join(format!("{}.json", safe_filename(chat_id)))
    }

    pub async fn get_or_create(&self, channel: &str, chat_id: &str) -> Result<Session> {
        let key = format!("{}:{}", channel, chat_id);
        {
            let mut cache = self.cache.lock().await;
            if let Some(session) = cache.get(&key) {
                debug!("session cache hit: {}", key);
                return Ok(session.clone());
            }
        }

        let path = self.session_path(channel, chat_id);
        let loaded = tokio::task::spawn_blocking(move || -> Result<Option<Session>> {
            if !path.exists() {
                return Ok(None);
            }
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read session file: {}", path.display()))?;
            let session: Session = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
            Ok(Some(session))
        })
        .await
        .map_err(|e| anyhow::anyhow!("session load task failed: {}", e))??;

        let session = match loaded {
            Some(mut s) => {
                // Trim on load in case the window shrank between versions
                if s.turns.len() > SESSION_WINDOW {
                    let drain = s.turns.len() - SESSION_WINDOW;
                    s.turns.drain(..drain);
                }
                debug!("session loaded from disk: {}", key);
                s
            }
            None => {
                debug!("session created: {}", key);
                Session::new(&key)
            }
        };

        let mut cache = self.cache.lock().await;
        cache.put(key, session.clone());
        Ok(session)
    }

    pub async fn save(&self, channel: &str, chat_id: &str, session: &Session) -> Result<()> {
        let path = self.session_path(channel, chat_id);
        let content = serde_json::to_string_pretty(session)?;
        let turn_count = session.turns.len();
        let key = session.key.clone();

        tokio::task::spawn_blocking(move || atomic_write(&path, &content))
            .await
            .map_err(|e| anyhow::anyhow!("session save task failed: {}", e))??;

        debug!("session saved: {} ({} turns)", key, turn_count);

        let mut cache = self.cache.lock().await;
        cache.put(format!("{}:{}", channel, chat_id), session.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests;
