use crate::bus::{InboundMessage, OutboundMessage};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_CAPACITY: usize = 100;

/// In-process message bus between front-ends and the agent loop.
///
/// Two bounded queues: inbound (many producers, one consumer) and outbound
/// (one producer, fanned out by a router task to per-channel subscribers).
/// Inbound sends block when the queue is full - backpressure to producers,
/// user messages are never dropped. Outbound fan-out never blocks the
/// router: each subscriber has its own bounded queue and overflow drops
/// the message with a warning.
pub struct Hub {
    inbound_tx: Mutex<Option<mpsc::Sender<InboundMessage>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: Mutex<Option<mpsc::Sender<OutboundMessage>>>,
    outbound_rx: Mutex<Option<mpsc::Receiver<OutboundMessage>>>,
    subscribers: Arc<Mutex<HashMap<String, mpsc::Sender<OutboundMessage>>>>,
    capacity: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        Self {
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx: Mutex::new(Some(outbound_tx)),
            outbound_rx: Mutex::new(Some(outbound_rx)),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            capacity,
        }
    }

    /// Clone of the inbound sender for producers (channels, cron,
    /// heartbeat). Fails once the hub is closed.
    pub fn inbound_sender(&self) -> Result<mpsc::Sender<InboundMessage>> {
        lock(&self.inbound_tx).clone().context("hub is closed")
    }

    /// Clone of the outbound sender (the agent loop is the only
    /// producer). Fails once the hub is closed.
    pub fn outbound_sender(&self) -> Result<mpsc::Sender<OutboundMessage>> {
        lock(&self.outbound_tx).clone().context("hub is closed")
    }

    /// Enqueue an inbound message, blocking while the queue is full.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<()> {
        let tx = self.inbound_sender()?;
        let channel = msg.channel.clone();
        let sender_id = msg.sender_id.clone();
        tx.send(msg).await.context("inbound queue closed")?;
        debug!(
            "inbound message queued: channel={}, sender={}",
            channel, sender_id
        );
        Ok(())
    }

    /// Take the single inbound receiver. The agent loop calls this once.
    pub fn take_inbound_rx(&self) -> Option<mpsc::Receiver<InboundMessage>> {
        lock(&self.inbound_rx).take()
    }

    /// Register a subscriber for a channel id and get its delivery queue.
    ///
    /// The queue capacity equals the outbound buffer capacity. Subscribing
    /// twice for the same channel id replaces the previous subscriber; the
    /// old receiver observes end-of-stream.
    pub fn subscribe(&self, channel: &str) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = lock(&self.subscribers);
        if subs.insert(channel.to_string(), tx).is_some() {
            warn!("hub: replacing existing subscriber for channel '{}'", channel);
        }
        rx
    }

    /// Start the router task draining the outbound queue.
    ///
    /// Messages for channels without a subscriber are dropped with a
    /// warning - the router never blocks on a missing or slow consumer.
    pub fn start_router(&self) -> tokio::task::JoinHandle<()> {
        let mut outbound_rx = lock(&self.outbound_rx)
            .take()
            .expect("hub router already started or hub closed");
        let subscribers = self.subscribers.clone();

        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let tx = lock(&subscribers).get(&msg.channel).cloned();
                let Some(tx) = tx else {
                    warn!(
                        "hub: dropping outbound for unregistered channel '{}' (chat_id={})",
                        msg.channel, msg.chat_id
                    );
                    continue;
                };
                let channel = msg.channel.clone();
                match tx.try_send(msg) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            "hub: subscriber queue full for channel '{}', dropping message",
                            channel
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!(
                            "hub: subscriber for channel '{}' is gone, removing",
                            channel
                        );
                        lock(&subscribers).remove(&channel);
                    }
                }
            }
            // Outbound queue closed: drop subscriber senders so every
            // subscriber observes end-of-stream.
            lock(&subscribers).clear();
            info!("hub router stopped");
        })
    }

    /// Close both queues.
    ///
    /// Drops the hub's queue handles: `inbound_sender`/`outbound_sender`
    /// fail from now on, and subscribers observe end-of-stream. If the
    /// inbound receiver is still held by the hub (no consumer took it),
    /// dropping it makes every previously handed-out producer clone fail
    /// on send; once a consumer has taken the receiver, that side closes
    /// when the consumer drops it (the run-mode shutdown sequence stops
    /// the agent loop for exactly this reason).
    pub fn close(&self) {
        lock(&self.inbound_tx).take();
        lock(&self.outbound_tx).take();
        lock(&self.inbound_rx).take();
        lock(&self.outbound_rx).take();
        lock(&self.subscribers).clear();
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests;
