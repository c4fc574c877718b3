use crate::mcp::protocol::{
    IncomingMessage, Notification, Request, PROTOCOL_VERSION,
};
use crate::mcp::Transport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

const PROTOCOL_VERSION_HEADER: &str = "Mcp-Protocol-Version";
const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// JSON-RPC over HTTP POST with SSE responses and session resumption.
///
/// Requests go to `POST <base>/mcp`. A session id learned from any
/// response header is replayed on subsequent requests; the most recent
/// SSE `id:` line is kept for `Last-Event-ID` resumption on the
/// server-initiated notification stream.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
    last_event_id: RwLock<Option<String>>,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(url: &str) -> Self {
        Self {
            base_url: url.trim_end_matches('/').to_string(),
            // No client-level timeout - each call sets its own.
            client: reqwest::Client::new(),
            session_id: RwLock::new(None),
            last_event_id: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/mcp", self.base_url)
    }

    fn session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn learn_session(&self, resp: &reqwest::Response) {
        if let Some(session) = resp
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut guard = self
                .session_id
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *guard = Some(session.to_string());
        }
    }

    fn store_event_id(&self, id: &str) {
        let mut guard = self
            .last_event_id
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Some(id.to_string());
    }

    fn apply_session(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session_id() {
            Some(session) => builder.header(SESSION_ID_HEADER, session),
            None => builder,
        }
    }

    /// Read an SSE body until a `data:` frame decodes to the response
    /// with the expected id. `id:` lines update the resumption cursor.
    async fn read_sse_response(
        &self,
        resp: reqwest::Response,
        expected_id: i64,
    ) -> Result<Value> {
        let mut stream = resp.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("SSE read error")?;
            buf.extend_from_slice(&chunk);

            while let Some(line) = take_line(&mut buf) {
                let line = line.trim().to_string();
                if let Some(event_id) = line.strip_prefix("id:") {
                    self.store_event_id(event_id.trim());
                    continue;
                }
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                let msg: IncomingMessage = match serde_json::from_str(data) {
                    Ok(msg) => msg,
                    Err(_) => {
                        debug!("[MCP HTTP] skipping non-response SSE event: {}", data);
                        continue;
                    }
                };
                if msg.id == Some(expected_id) {
                    return msg.into_outcome().map_err(Into::into);
                }
            }
        }

        anyhow::bail!("no response received in SSE stream")
    }

    /// Open the server-initiated notification stream (`GET <base>/mcp`).
    ///
    /// Frames whose payload has a `method` but no `id` are dispatched to
    /// the handler from a background task.
    pub async fn start_event_stream<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(String, Option<Value>) + Send + Sync + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("transport is closed");
        }

        let mut req = self
            .client
            .get(self.endpoint())
            .header("Accept", "text/event-stream");
        req = self.apply_session(req);
        if let Some(last) = self.last_event_id() {
            req = req.header(LAST_EVENT_ID_HEADER, last);
        }

        let resp = req.send().await.context("SSE request failed")?;
        if resp.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            anyhow::bail!("server does not support SSE stream");
        }
        if !resp.status().is_success() {
            anyhow::bail!("SSE request failed with status {}", resp.status());
        }

        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buf: Vec<u8> = Vec::new();
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                buf.extend_from_slice(&chunk);
                while let Some(line) = take_line(&mut buf) {
                    let line = line.trim().to_string();
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<IncomingMessage>(data) {
                        Ok(msg) if msg.is_notification() => {
                            handler(msg.method.unwrap_or_default(), msg.params);
                        }
                        Ok(_) => {}
                        Err(e) => warn!("[MCP HTTP] failed to parse SSE message: {}", e),
                    }
                }
            }
        });

        Ok(())
    }
}

/// Pop one `\n`-terminated line off the front of the buffer.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buf.drain(..=pos).collect();
    Some(String::from_utf8_lossy(&line[..line.len() - 1]).to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("transport is closed");
        }

        let req = Request::new(method, params);
        let expected_id = req.id;

        let mut builder = self
            .client
            .post(self.endpoint())
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);
        builder = self.apply_session(builder);

        let resp = builder
            .json(&req)
            .send()
            .await
            .context("HTTP request failed")?;

        self.learn_session(&resp);

        if !resp.status().is_success() {
            anyhow::bail!("MCP server returned status {}", resp.status());
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            return self.read_sse_response(resp, expected_id).await;
        }

        // application/json (or anything else - try JSON anyway)
        let msg: IncomingMessage = resp
            .json()
            .await
            .context("failed to parse JSON-RPC response")?;
        if msg.id != Some(expected_id) {
            anyhow::bail!(
                "unexpected response id: got {:?}, want {}",
                msg.id,
                expected_id
            );
        }
        msg.into_outcome().map_err(Into::into)
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("transport is closed");
        }

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION);
        builder = self.apply_session(builder);

        let resp = builder
            .json(&Notification::new(method, params))
            .send()
            .await
            .context("HTTP request failed")?;

        self.learn_session(&resp);

        // Notifications are acknowledged with 202 Accepted (200 tolerated).
        let status = resp.status();
        if status != reqwest::StatusCode::ACCEPTED && status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("unexpected status {} for notification: {}", status, body);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        // Best-effort session termination.
        if let Some(session) = self.session_id() {
            let result = self
                .client
                .delete(self.endpoint())
                .timeout(Duration::from_secs(5))
                .header(SESSION_ID_HEADER, session)
                .send()
                .await;
            if let Err(e) = result {
                warn!("[MCP HTTP] failed to terminate session: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
