use crate::bus::InboundMessage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const HEARTBEAT_FILE: &str = "HEARTBEAT.md";

/// Periodic prompt injector: every interval, the contents of
/// `HEARTBEAT.md` in the workspace are enqueued as a system-originated
/// inbound message, letting the agent run standing natural-language
/// tasks. A missing or empty file is a no-op tick.
pub struct HeartbeatService {
    workspace: PathBuf,
    interval_s: u64,
    inbound_tx: mpsc::Sender<InboundMessage>,
    running: Arc<AtomicBool>,
}

impl HeartbeatService {
    pub fn new(
        workspace: impl Into<PathBuf>,
        interval_s: u64,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Self {
        Self {
            workspace: workspace.into(),
            interval_s: interval_s.max(1),
            inbound_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let interval = std::time::Duration::from_secs(self.interval_s);
        let path = self.workspace.join(HEARTBEAT_FILE);
        let inbound_tx = self.inbound_tx.clone();

        let handle = tokio::spawn(async move {
            info!("heartbeat started (every {:?})", interval);
            loop {
                tokio::time::sleep(interval).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let content = match std::fs::read_to_string(&path) {
                    Ok(content) => content,
                    Err(_) => {
                        debug!("no heartbeat file at {}", path.display());
                        continue;
                    }
                };
                let content = content.trim();
                if content.is_empty() {
                    continue;
                }

                let msg = InboundMessage::new("heartbeat", "system", "heartbeat", content);
                if inbound_tx.send(msg).await.is_err() {
                    warn!("inbound queue closed, stopping heartbeat");
                    break;
                }
            }
            info!("heartbeat stopped");
        });
        handle
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
