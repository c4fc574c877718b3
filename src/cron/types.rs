use serde::{Deserialize, Serialize};

/// A scheduled prompt. When it fires, `message` is injected as an
/// inbound message routed to (`channel`, `chat_id`).
///
/// All times are unix milliseconds; `interval_ms` is the recurrence
/// period in milliseconds (required for recurring jobs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default, rename = "chatId")]
    pub chat_id: String,
    #[serde(rename = "fireAt")]
    pub fire_at_ms: i64,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default, rename = "interval", skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<i64>,
}

fn default_channel() -> String {
    "cron".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CronStore {
    #[serde(default)]
    pub jobs: Vec<CronJob>,
}
