use crate::bus::{Hub, InboundMessage, OutboundMessage};
use crate::config::{load_config, save_config, Config};
use crate::cron::{CronJob, Scheduler};
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

const SSE_KEEPALIVE: Duration = Duration::from_secs(15);
/// Ring size for the outbound fan-out to SSE clients.
const EVENT_BUFFER: usize = 256;

/// Shared state behind the Web UI HTTP API.
#[derive(Clone)]
pub struct GatewayState {
    inbound_tx: tokio::sync::mpsc::Sender<InboundMessage>,
    /// Outbound "web" messages fanned out to any number of SSE clients.
    web_events: broadcast::Sender<OutboundMessage>,
    scheduler: Arc<Scheduler>,
    config_path: Option<PathBuf>,
}

impl GatewayState {
    /// Build the state and start forwarding the hub's "web" subscription
    /// into the SSE broadcast. Fails if the hub is already closed.
    pub fn new(
        hub: &Hub,
        scheduler: Arc<Scheduler>,
        config_path: Option<PathBuf>,
    ) -> Result<Self> {
        let inbound_tx = hub.inbound_sender()?;
        let (web_events, _) = broadcast::channel(EVENT_BUFFER);

        let mut web_rx = hub.subscribe("web");
        let events_tx = web_events.clone();
        tokio::spawn(async move {
            while let Some(msg) = web_rx.recv().await {
                // No subscribers is fine - send only fails then.
                let _ = events_tx.send(msg);
            }
            debug!("web event forwarder stopped");
        });

        Ok(Self {
            inbound_tx,
            web_events,
            scheduler,
            config_path,
        })
    }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/chat/stream", get(chat_stream))
        .route("/api/config", get(get_config).post(post_config))
        .route("/api/cron", get(list_cron).post(create_cron))
        .route("/api/cron/{id}", delete(delete_cron))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(state: GatewayState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("web UI listening on http://{}", addr);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    text: String,
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// POST /api/chat - enqueue a web message for the agent.
async fn post_chat(
    State(state): State<GatewayState>,
    Json(payload): Json<ChatPayload>,
) -> impl IntoResponse {
    let msg = InboundMessage::new(
        "web",
        payload.session_id.clone(),
        payload.session_id,
        payload.text,
    );
    match state.inbound_tx.send(msg).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!("web chat enqueue failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// GET /api/chat/stream?session=<id> - SSE stream of replies for one
/// session, with a keepalive comment every 15 seconds.
async fn chat_stream(
    State(state): State<GatewayState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = params.get("session").cloned().unwrap_or_default();
    let rx = state.web_events.subscribe();

    let stream = futures::stream::unfold(rx, move |mut rx| {
        let session = session.clone();
        async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        if msg.chat_id != session {
                            continue;
                        }
                        let data = serde_json::json!({
                            "channel": msg.channel,
                            "chatId": msg.chat_id,
                            "content": msg.content,
                            "replyTo": msg.reply_to,
                        });
                        let event = Ok(Event::default().data(data.to_string()));
                        return Some((event, rx));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("sse client lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEPALIVE)
            .text("keepalive"),
    )
}

/// GET /api/config - the config document as stored on disk.
async fn get_config(State(state): State<GatewayState>) -> impl IntoResponse {
    match load_config(state.config_path.as_deref()) {
        Ok(config) => Json(config).into_response(),
        Err(e) => {
            error!("config read failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// POST /api/config - replace the config document.
async fn post_config(
    State(state): State<GatewayState>,
    Json(config): Json<Config>,
) -> impl IntoResponse {
    if let Err(e) = config.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match save_config(&config, state.config_path.as_deref()) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!("config write failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /api/cron - all scheduled jobs.
async fn list_cron(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.scheduler.list())
}

#[derive(Debug, Deserialize)]
struct CreateJobPayload {
    #[serde(default)]
    name: String,
    message: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default, rename = "chatId")]
    chat_id: Option<String>,
    #[serde(default, rename = "fireAt")]
    fire_at: Option<i64>,
    #[serde(default)]
    recurring: bool,
    #[serde(default)]
    interval: Option<i64>,
}

/// POST /api/cron - schedule a job. `fireAt` defaults to one interval
/// from now (or now for one-shots).
async fn create_cron(
    State(state): State<GatewayState>,
    Json(payload): Json<CreateJobPayload>,
) -> impl IntoResponse {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let fire_at = payload
        .fire_at
        .unwrap_or_else(|| now_ms + payload.interval.unwrap_or(0).max(0));

    let job = CronJob {
        id: String::new(),
        name: payload.name,
        message: payload.message,
        channel: payload.channel.unwrap_or_else(|| "cron".to_string()),
        chat_id: payload.chat_id.unwrap_or_else(|| "cron".to_string()),
        fire_at_ms: fire_at,
        recurring: payload.recurring,
        interval_ms: payload.interval,
    };

    match state.scheduler.schedule(job) {
        Ok(stored) => (StatusCode::OK, Json(stored)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// DELETE /api/cron/{id} - 200 on success, 404 if unknown.
async fn delete_cron(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.scheduler.cancel(&id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}
