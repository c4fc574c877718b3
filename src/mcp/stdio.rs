use crate::config::McpServerConfig;
use crate::mcp::protocol::{IncomingMessage, Notification, Request, RpcError};
use crate::mcp::{Transport, SHUTDOWN_TIMEOUT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Pending = Arc<Mutex<HashMap<i64, oneshot::Sender<Result<Value, RpcError>>>>>;

/// Newline-delimited JSON-RPC 2.0 over a child process's stdin/stdout.
///
/// One reader task owns stdout and demultiplexes responses into the
/// pending-call table by id. Stdin writes are serialized by a mutex that
/// guards only the write+flush critical section. Stderr lines are
/// forwarded to the host log.
pub struct StdioTransport {
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: Pending,
    closed: AtomicBool,
    reader: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    stderr_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StdioTransport {
    pub fn spawn(cfg: &McpServerConfig) -> Result<Self> {
        let command = cfg
            .command
            .as_deref()
            .context("stdio transport requires 'command'")?;

        let mut cmd = tokio::process::Command::new(command);
        cmd.args(&cfg.args);
        for (k, v) in &cfg.env {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to start MCP server '{}'", command))?;

        let stdin = child.stdin.take().context("child stdin unavailable")?;
        let stdout = child.stdout.take().context("child stdout unavailable")?;
        let stderr = child.stderr.take().context("child stderr unavailable")?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));

        // Forward server diagnostics to the host log.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if !line.is_empty() {
                    info!("[MCP Server] {}", line);
                }
            }
        });

        // The single stdout reader.
        let pending_for_reader = pending.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => Self::dispatch_line(&pending_for_reader, &line),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("[MCP] response reader error: {}", e);
                        break;
                    }
                }
            }
            // Fail any callers still waiting: dropping the senders makes
            // their receivers resolve with a closed-transport error.
            let mut map = pending_for_reader
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.clear();
        });

        Ok(Self {
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            child: tokio::sync::Mutex::new(Some(child)),
            pending,
            closed: AtomicBool::new(false),
            reader: tokio::sync::Mutex::new(Some(reader)),
            stderr_task: tokio::sync::Mutex::new(Some(stderr_task)),
        })
    }

    /// Route one stdout line: responses go to their pending call,
    /// notifications are logged and dropped, malformed lines are skipped.
    fn dispatch_line(pending: &Pending, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let msg: IncomingMessage = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[MCP] failed to parse message: {}", e);
                return;
            }
        };
        if msg.is_notification() {
            debug!(
                "[MCP] server notification: {}",
                msg.method.as_deref().unwrap_or("")
            );
            return;
        }
        let Some(id) = msg.id else {
            warn!("[MCP] message with neither id nor method, skipping");
            return;
        };
        let sender = {
            let mut map = pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.remove(&id)
        };
        match sender {
            Some(tx) => {
                // Receiver may have timed out already; nothing to do then.
                let _ = tx.send(msg.into_outcome());
            }
            None => warn!("[MCP] unexpected response id {} (no pending call)", id),
        }
    }

    async fn write_frame(&self, frame: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().context("transport is closed")?;
        stdin.write_all(frame.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("transport is closed");
        }

        let req = Request::new(method, params);
        let id = req.id;
        let frame = serde_json::to_string(&req)?;

        // Register before writing so a fast response can't race the table.
        let (tx, rx) = oneshot::channel();
        {
            let mut map = self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.insert(id, tx);
        }

        if let Err(e) = self.write_frame(&frame).await {
            let mut map = self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome.map_err(Into::into),
            Ok(Err(_)) => anyhow::bail!("transport is closed"),
            Err(_) => {
                let mut map = self
                    .pending
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                map.remove(&id);
                anyhow::bail!(
                    "MCP request '{}' timed out after {:?}",
                    method,
                    timeout
                );
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("transport is closed");
        }
        let frame = serde_json::to_string(&Notification::new(method, params))?;
        self.write_frame(&frame).await
    }

    async fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        // Closing stdin signals EOF - the graceful exit path.
        self.stdin.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    warn!("[MCP] server did not exit within {:?}, killing", SHUTDOWN_TIMEOUT);
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        if let Some(reader) = self.reader.lock().await.take() {
            let _ = reader.await;
        }
        if let Some(task) = self.stderr_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
