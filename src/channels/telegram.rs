use crate::bus::{InboundMessage, OutboundMessage};
use crate::channels::base::{sender_allowed, split_message, BaseChannel, TypingTracker};
use crate::config::TelegramConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{Message as TgMessage, MessageKind};
use tokio::sync::mpsc;

const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

pub struct TelegramChannel {
    config: TelegramConfig,
    inbound_tx: mpsc::Sender<InboundMessage>,
    bot: Bot,
    typing: TypingTracker,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        let bot = Bot::new(&config.token);
        Self {
            config,
            inbound_tx,
            bot,
            typing: TypingTracker::new(),
        }
    }
}

/// In groups the bot only answers when addressed: an @mention in the
/// text, or a reply to one of the bot's own messages.
fn group_text<'a>(msg: &'a TgMessage, text: &'a str, bot_username: &str) -> Option<String> {
    let is_group = msg.chat.is_group() || msg.chat.is_supergroup();
    if !is_group {
        return Some(text.to_string());
    }

    if !bot_username.is_empty() {
        let mention = format!("@{}", bot_username);
        if text.contains(&mention) {
            // Strip the mention before forwarding.
            return Some(text.replace(&mention, " ").trim().to_string());
        }
    }

    let replied_to_bot = msg
        .reply_to_message()
        .and_then(|r| r.from())
        .map(|u| u.is_bot)
        .unwrap_or(false);
    if replied_to_bot {
        return Some(text.to_string());
    }

    None
}

#[async_trait]
impl BaseChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<()> {
        tracing::info!("starting Telegram channel");

        let bot = self.bot.clone();
        let me = bot.get_me().await?;
        let bot_username = me.user.username.clone().unwrap_or_default();

        let inbound_tx = self.inbound_tx.clone();
        let allow_from = self.config.allow_from.clone();
        let typing = self.typing.clone();

        let handler = Update::filter_message().endpoint(move |msg: TgMessage, bot: Bot| {
            let inbound_tx = inbound_tx.clone();
            let allow_from = allow_from.clone();
            let typing = typing.clone();
            let bot_username = bot_username.clone();
            async move {
                let MessageKind::Common(_) = &msg.kind else {
                    return Ok(());
                };
                let Some(text) = msg.text() else {
                    return Ok(());
                };

                // Bot-authored messages never reach the agent.
                if msg.from().map(|u| u.is_bot).unwrap_or(false) {
                    return Ok(());
                }

                let sender_id = msg.from().map(|u| u.id.to_string()).unwrap_or_default();
                if !sender_allowed("telegram", &sender_id, &allow_from) {
                    return Ok(());
                }

                let Some(content) = group_text(&msg, text, &bot_username) else {
                    return Ok(());
                };
                if content.is_empty() {
                    return Ok(());
                }

                let chat_id = msg.chat.id.to_string();

                // Processing indicator until the reply goes out.
                let bot_for_typing = bot.clone();
                let tg_chat = msg.chat.id;
                typing.start(
                    &chat_id,
                    Arc::new(move || {
                        let bot = bot_for_typing.clone();
                        Box::pin(async move {
                            let _ = bot
                                .send_chat_action(tg_chat, teloxide::types::ChatAction::Typing)
                                .await;
                        })
                    }),
                );

                let inbound = InboundMessage {
                    channel: "telegram".to_string(),
                    sender_id,
                    chat_id,
                    content,
                    timestamp: Utc::now(),
                    media: vec![],
                    metadata: HashMap::new(),
                };

                // Blocking send: inbound backpressure, never drop.
                if let Err(e) = inbound_tx.send(inbound).await {
                    tracing::error!("telegram: failed to enqueue inbound: {}", e);
                }
                Ok::<(), anyhow::Error>(())
            }
        });

        let mut dispatcher = Dispatcher::builder(bot, handler).build();
        tokio::spawn(async move {
            dispatcher.dispatch().await;
        });

        tracing::info!("Telegram channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.typing.stop_all();
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        self.typing.stop(&msg.chat_id);

        let chat_id = msg.chat_id.parse::<i64>()?;
        for chunk in split_message(&msg.content, TELEGRAM_MESSAGE_LIMIT) {
            self.bot.send_message(ChatId(chat_id), chunk).await?;
        }
        Ok(())
    }
}
