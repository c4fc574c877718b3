use crate::bus::Hub;
use crate::channels::base::BaseChannel;
use crate::channels::discord::DiscordChannel;
use crate::channels::telegram::TelegramChannel;
use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Owns the enabled channel adapters, starts/stops them, and pumps each
/// one's hub subscription into its wire `send`.
pub struct ChannelManager {
    channels: Vec<Arc<dyn BaseChannel>>,
    pumps: Vec<tokio::task::JoinHandle<()>>,
}

impl ChannelManager {
    pub fn new(config: &Config, inbound_tx: mpsc::Sender<crate::bus::InboundMessage>) -> Self {
        let mut channels: Vec<Arc<dyn BaseChannel>> = Vec::new();

        if config.channels.telegram.enabled && !config.channels.telegram.token.is_empty() {
            channels.push(Arc::new(TelegramChannel::new(
                config.channels.telegram.clone(),
                inbound_tx.clone(),
            )));
            info!("Telegram channel enabled");
        }

        if config.channels.discord.enabled && !config.channels.discord.token.is_empty() {
            channels.push(Arc::new(DiscordChannel::new(
                config.channels.discord.clone(),
                inbound_tx.clone(),
            )));
            info!("Discord channel enabled");
        }

        Self {
            channels,
            pumps: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_channels(channels: Vec<Arc<dyn BaseChannel>>) -> Self {
        Self {
            channels,
            pumps: Vec::new(),
        }
    }

    pub fn enabled_channels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Start every adapter and subscribe each to the hub's outbound side.
    pub async fn start_all(&mut self, hub: &Hub) -> Result<()> {
        for channel in &self.channels {
            channel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start channel {}: {}", channel.name(), e))?;

            let mut rx = hub.subscribe(channel.name());
            let channel = channel.clone();
            self.pumps.push(tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if let Err(e) = channel.send(&msg).await {
                        warn!(
                            "failed to deliver outbound to {} (chat_id={}): {}",
                            channel.name(),
                            msg.chat_id,
                            e
                        );
                    }
                }
                info!("outbound pump for {} stopped", channel.name());
            }));
        }
        Ok(())
    }

    pub async fn stop_all(&mut self) {
        for channel in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!("error stopping channel {}: {}", channel.name(), e);
            }
        }
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}
