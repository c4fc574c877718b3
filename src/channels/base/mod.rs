use crate::bus::OutboundMessage;
use crate::utils::env_flag;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Permits channels configured with an empty `allowFrom` list to accept
/// every sender. Without it, an empty allowlist rejects everyone.
pub const ALLOW_PUBLIC_CHANNELS_ENV: &str = "PICOBOT_ALLOW_PUBLIC_CHANNELS";

/// How often the typing indicator is refreshed while a reply is pending.
const TYPING_REFRESH: Duration = Duration::from_secs(5);
/// Safety cap: a typing loop never outlives this, reply or not.
const TYPING_MAX: Duration = Duration::from_secs(300);

/// A chat front-end adapter: translates between the wire protocol and
/// hub messages.
#[async_trait]
pub trait BaseChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;
}

/// Allowlist gate every adapter applies to inbound senders.
///
/// A non-empty list admits exactly its members. An empty list admits
/// everyone only under the public-channels override; otherwise it is
/// default-deny.
pub fn sender_allowed(channel: &str, sender_id: &str, allow_from: &[String]) -> bool {
    if allow_from.is_empty() {
        if env_flag(ALLOW_PUBLIC_CHANNELS_ENV) {
            return true;
        }
        warn!(
            "{}: rejecting sender {} (empty allowFrom without {})",
            channel, sender_id, ALLOW_PUBLIC_CHANNELS_ENV
        );
        return false;
    }

    let sender = sender_id.trim_start_matches('+');
    let allowed = allow_from
        .iter()
        .any(|a| a.trim_start_matches('+') == sender);
    if !allowed {
        warn!("{}: rejecting sender {} (not in allowFrom)", channel, sender_id);
    }
    allowed
}

/// Split a message into chunks of at most `limit` bytes, preferring a
/// newline break, then a space, then a hard cut at a char boundary.
/// The concatenation of the chunks equals the input exactly.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(4); // guard against degenerate limits
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > limit {
        // Largest char boundary not exceeding the limit
        let mut window = limit;
        while window > 0 && !remaining.is_char_boundary(window) {
            window -= 1;
        }

        let head = &remaining[..window];
        let cut = head
            .rfind('\n')
            .or_else(|| head.rfind(' '))
            .map_or(window, |idx| idx + 1); // keep the separator in this chunk
        let cut = if cut == 0 { window } else { cut };

        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

type TypingTick = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-conversation "typing…" refresher.
///
/// `start` spawns a loop that fires the tick immediately and then every
/// few seconds; `stop` (called when the reply is sent) aborts it. The
/// loop also self-cancels after a safety timeout in case no reply ever
/// arrives.
#[derive(Clone, Default)]
pub struct TypingTracker {
    tasks: Arc<Mutex<HashMap<String, tokio::task::JoinHandle<()>>>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, chat_id: &str, tick: TypingTick) {
        let handle = tokio::spawn(async move {
            let _ = tokio::time::timeout(TYPING_MAX, async {
                loop {
                    tick().await;
                    tokio::time::sleep(TYPING_REFRESH).await;
                }
            })
            .await;
        });

        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(old) = tasks.insert(chat_id.to_string(), handle) {
            old.abort();
        }
    }

    pub fn stop(&self, chat_id: &str) {
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handle) = tasks.remove(chat_id) {
            handle.abort();
        }
    }

    pub fn stop_all(&self) {
        let mut tasks = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}
