use crate::bus::{InboundMessage, OutboundMessage};
use crate::channels::base::{sender_allowed, split_message, BaseChannel, TypingTracker};
use crate::config::DiscordConfig;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serenity::async_trait as serenity_async_trait;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const DISCORD_MESSAGE_LIMIT: usize = 2000;

struct Handler {
    inbound_tx: mpsc::Sender<InboundMessage>,
    allow_from: Vec<String>,
    typing: TypingTracker,
    bot_id: Arc<AtomicU64>,
}

impl Handler {
    /// In guilds the bot only answers when addressed: an explicit
    /// mention, or a reply to one of its own messages.
    fn addresses_bot(&self, msg: &DiscordMessage) -> bool {
        if msg.guild_id.is_none() {
            return true; // DMs always address the bot
        }
        let bot_id = self.bot_id.load(Ordering::SeqCst);
        if msg.mentions.iter().any(|u| u.id.get() == bot_id) {
            return true;
        }
        msg.referenced_message
            .as_deref()
            .map(|replied| replied.author.id.get() == bot_id)
            .unwrap_or(false)
    }

    /// Remove `<@id>` / `<@!id>` mention markers for the bot itself.
    fn strip_bot_mention(&self, content: &str) -> String {
        let bot_id = self.bot_id.load(Ordering::SeqCst);
        content
            .replace(&format!("<@{}>", bot_id), "")
            .replace(&format!("<@!{}>", bot_id), "")
            .trim()
            .to_string()
    }
}

#[serenity_async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_id.store(ready.user.id.get(), Ordering::SeqCst);
        tracing::info!(
            "Discord bot connected as {} (id: {})",
            ready.user.name,
            ready.user.id
        );
    }

    async fn message(&self, ctx: Context, msg: DiscordMessage) {
        if msg.author.bot {
            return;
        }

        let sender_id = msg.author.id.to_string();
        if !sender_allowed("discord", &sender_id, &self.allow_from) {
            return;
        }

        if !self.addresses_bot(&msg) {
            return;
        }

        let content = self.strip_bot_mention(&msg.content);
        if content.is_empty() {
            return;
        }

        let chat_id = msg.channel_id.to_string();

        // Processing indicator until the reply goes out.
        let http = ctx.http.clone();
        let channel_id = msg.channel_id;
        self.typing.start(
            &chat_id,
            Arc::new(move || {
                let http = http.clone();
                Box::pin(async move {
                    let _ = channel_id.broadcast_typing(&http).await;
                })
            }),
        );

        let inbound = InboundMessage {
            channel: "discord".to_string(),
            sender_id,
            chat_id,
            content,
            timestamp: Utc::now(),
            media: vec![],
            metadata: HashMap::new(),
        };

        if let Err(e) = self.inbound_tx.send(inbound).await {
            tracing::error!("discord: failed to enqueue inbound: {}", e);
        }
    }
}

pub struct DiscordChannel {
    config: DiscordConfig,
    inbound_tx: mpsc::Sender<InboundMessage>,
    http: Arc<serenity::http::Http>,
    typing: TypingTracker,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        let http = Arc::new(serenity::http::Http::new(&config.token));
        Self {
            config,
            inbound_tx,
            http,
            typing: TypingTracker::new(),
        }
    }
}

#[async_trait]
impl BaseChannel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<()> {
        tracing::info!("starting Discord channel");

        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = Handler {
            inbound_tx: self.inbound_tx.clone(),
            allow_from: self.config.allow_from.clone(),
            typing: self.typing.clone(),
            bot_id: Arc::new(AtomicU64::new(0)),
        };

        let mut client = Client::builder(&self.config.token, intents)
            .event_handler(handler)
            .await?;

        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                tracing::error!("discord client error: {}", e);
            }
        });

        tracing::info!("Discord channel started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.typing.stop_all();
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        self.typing.stop(&msg.chat_id);

        let channel_id = ChannelId::new(msg.chat_id.parse::<u64>()?);
        for chunk in split_message(&msg.content, DISCORD_MESSAGE_LIMIT) {
            channel_id.say(&self.http, chunk).await?;
        }
        Ok(())
    }
}
