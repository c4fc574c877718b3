use crate::agent::context::ContextBuilder;
use crate::agent::memory::{LlmRecallRanker, MemoryStore, RecallRanker};
use crate::agent::skills::SkillManager;
use crate::agent::tools::exec::ExecTool;
use crate::agent::tools::filesystem::FilesystemTool;
use crate::agent::tools::memory::{ReadMemoryTool, ScopedMemory, WriteMemoryTool};
use crate::agent::tools::skill::{
    CreateSkillTool, DeleteSkillTool, ListSkillsTool, ReadSkillTool,
};
use crate::agent::tools::web::WebTool;
use crate::agent::tools::ToolRegistry;
use crate::bus::{Hub, InboundMessage, OutboundMessage};
use crate::config::McpConfig;
use crate::mcp::proxy::register_mcp_tools;
use crate::mcp::McpManager;
use crate::providers::base::{ChatRequest, LLMProvider, Message};
use crate::session::SessionManager;
use anyhow::{Context, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, error, info, warn};

/// Fallback text when the provider fails mid-conversation.
const PROVIDER_FAILURE_REPLY: &str =
    "Sorry, I ran into a problem talking to the language model. Please try again in a moment.";

/// Pattern stripped from final responses when think-tag stripping is on.
const DEFAULT_THINK_PATTERN: &str = r"(?s)<think[^>]*>.*?</think>";

/// Configuration for creating an [`AgentLoop`].
pub struct AgentLoopConfig {
    pub provider: Arc<dyn LLMProvider>,
    pub workspace: PathBuf,
    pub model: Option<String>,
    pub max_tool_iterations: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_s: u64,
    pub exec_timeout_s: u64,
    pub strip_think_tags: bool,
    pub think_tag_pattern: Option<String>,
    pub mcp: McpConfig,
    /// Optional ranker override; defaults to the LLM-based ranker.
    pub ranker: Option<Arc<dyn RecallRanker>>,
}

impl AgentLoopConfig {
    /// Minimal config for tests: stub-friendly timeouts, no MCP.
    #[doc(hidden)]
    pub fn test_defaults(provider: Arc<dyn LLMProvider>, workspace: PathBuf) -> Self {
        Self {
            provider,
            workspace,
            model: None,
            max_tool_iterations: 10,
            max_tokens: 1024,
            temperature: 0.0,
            request_timeout_s: 10,
            exec_timeout_s: 5,
            strip_think_tags: true,
            think_tag_pattern: None,
            mcp: McpConfig::default(),
            ranker: None,
        }
    }
}

/// The orchestration core: consumes inbound messages one at a time,
/// drives the provider/tool loop, and emits replies.
///
/// Processing is sequential by construction (a single consumer task),
/// which keeps per-conversation state consistent across multi-step tool
/// calls.
pub struct AgentLoop {
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    provider: Arc<dyn LLMProvider>,
    model: String,
    max_iterations: usize,
    max_tokens: u32,
    temperature: f32,
    request_timeout: Duration,
    workspace: PathBuf,
    sessions: SessionManager,
    context: Mutex<ContextBuilder>,
    scoped_memory: ScopedMemory,
    tools: Arc<ToolRegistry>,
    mcp: Option<Arc<McpManager>>,
    think_patterns: Vec<Regex>,
    shutdown: Notify,
}

impl AgentLoop {
    pub async fn new(hub: &Hub, config: AgentLoopConfig) -> Result<Self> {
        let inbound_rx = hub
            .take_inbound_rx()
            .context("inbound receiver already taken")?;
        let outbound_tx = hub.outbound_sender()?;

        let model = config
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| config.provider.default_model().to_string());

        let ranker: Arc<dyn RecallRanker> = config.ranker.unwrap_or_else(|| {
            Arc::new(LlmRecallRanker::new(config.provider.clone(), model.clone()))
        });

        let sessions = SessionManager::new(&config.workspace)?;
        let skills = Arc::new(SkillManager::open(&config.workspace)?);
        let context = ContextBuilder::new(&config.workspace, ranker, skills.clone())?;

        // Native tools
        let scoped_memory = ScopedMemory::new();
        let tools = Arc::new(ToolRegistry::new());
        tools
            .register(Arc::new(FilesystemTool::new(&config.workspace)?))
            .await;
        tools
            .register(Arc::new(ExecTool::with_workspace(
                config.exec_timeout_s,
                &config.workspace,
            )))
            .await;
        tools.register(Arc::new(WebTool::new())).await;
        tools
            .register(Arc::new(WriteMemoryTool::new(scoped_memory.clone())))
            .await;
        tools
            .register(Arc::new(ReadMemoryTool::new(scoped_memory.clone())))
            .await;
        tools
            .register(Arc::new(CreateSkillTool::new(skills.clone())))
            .await;
        tools
            .register(Arc::new(ListSkillsTool::new(skills.clone())))
            .await;
        tools
            .register(Arc::new(ReadSkillTool::new(skills.clone())))
            .await;
        tools
            .register(Arc::new(DeleteSkillTool::new(skills)))
            .await;

        // MCP tools, namespaced mcp_<server>_<tool>
        let mcp = if config.mcp.servers.is_empty() {
            None
        } else {
            let manager = Arc::new(McpManager::connect(&config.mcp).await);
            register_mcp_tools(&manager, &tools).await;
            Some(manager)
        };

        let mut think_patterns = Vec::new();
        if config.strip_think_tags {
            think_patterns
                .push(Regex::new(DEFAULT_THINK_PATTERN).expect("invalid think-tag pattern"));
            if let Some(extra) = &config.think_tag_pattern {
                match Regex::new(extra) {
                    Ok(re) => think_patterns.push(re),
                    Err(e) => warn!("invalid thinkTagPattern '{}': {}", extra, e),
                }
            }
        }

        Ok(Self {
            inbound_rx: Mutex::new(Some(inbound_rx)),
            outbound_tx,
            provider: config.provider,
            model,
            max_iterations: config.max_tool_iterations,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            request_timeout: Duration::from_secs(config.request_timeout_s),
            workspace: config.workspace,
            sessions,
            context: Mutex::new(context),
            scoped_memory,
            tools,
            mcp,
            think_patterns,
            shutdown: Notify::new(),
        })
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Consume the inbound queue until it closes or `stop` is called.
    pub async fn run(&self) -> Result<()> {
        let mut rx = self
            .inbound_rx
            .lock()
            .await
            .take()
            .context("agent loop already running")?;
        info!("agent loop started, waiting for messages");

        loop {
            let msg = tokio::select! {
                msg = rx.recv() => msg,
                () = self.shutdown.notified() => {
                    info!("agent loop received shutdown signal");
                    break;
                }
            };
            let Some(msg) = msg else {
                info!("inbound queue closed, stopping agent loop");
                break;
            };

            info!(
                "processing inbound: channel={}, sender={}, chat_id={}, content_len={}",
                msg.channel,
                msg.sender_id,
                msg.chat_id,
                msg.content.len()
            );
            match self.process_message(msg).await {
                Ok(Some(outbound)) => {
                    if let Err(e) = self.outbound_tx.send(outbound).await {
                        error!("failed to send outbound message: {}", e);
                    }
                }
                Ok(None) => debug!("no outbound message produced"),
                Err(e) => error!("error processing message: {}", e),
            }
        }

        info!("agent loop stopped");
        Ok(())
    }

    /// Finish the current iteration, then stop and shut down MCP.
    pub async fn stop(&self) {
        // notify_one stores a permit, so a stop issued before run()
        // reaches its select point is not lost.
        self.shutdown.notify_one();
        if let Some(ref mcp) = self.mcp {
            mcp.shutdown().await;
        }
    }

    /// Synchronous entry used by the web adapter and tests: runs the
    /// same pipeline as hub consumption and returns the final text.
    pub async fn process_direct(&self, text: &str, timeout: Duration) -> Result<String> {
        let msg = InboundMessage::new("web", "direct", "direct", text);
        let outbound = tokio::time::timeout(timeout, self.process_message(msg))
            .await
            .map_err(|_| anyhow::anyhow!("process_direct timed out after {:?}", timeout))??;
        Ok(outbound.map(|o| o.content).unwrap_or_default())
    }

    async fn process_message(&self, msg: InboundMessage) -> Result<Option<OutboundMessage>> {
        // Rotate the memory scope BEFORE anything else so every tool
        // call in this iteration sees only this conversation's notes.
        let memory = Arc::new(MemoryStore::for_conversation(
            &self.workspace,
            &msg.channel,
            &msg.chat_id,
        )?);
        self.scoped_memory.set(memory.clone());

        // Fast-path: "remember <payload>" writes long-term memory with
        // no LLM round-trip.
        if let Some(payload) = remember_payload(&msg.content) {
            memory.append_long_term(payload)?;
            let mut session = self
                .sessions
                .get_or_create(&msg.channel, &msg.chat_id)
                .await?;
            session.add_turn("user", msg.content.as_str());
            session.add_turn("assistant", "Noted, I'll remember that.");
            self.sessions
                .save(&msg.channel, &msg.chat_id, &session)
                .await?;
            return Ok(Some(OutboundMessage::new(
                msg.channel,
                msg.chat_id,
                "Noted, I'll remember that.",
            )));
        }

        let mut session = self
            .sessions
            .get_or_create(&msg.channel, &msg.chat_id)
            .await?;

        let messages = {
            let mut ctx = self.context.lock().await;
            ctx.build_messages(
                &memory,
                session.history(),
                &msg.content,
                &msg.channel,
                &msg.chat_id,
            )
            .await?
        };

        let final_text = self.run_tool_loop(messages, &mut session).await;

        session.add_turn("user", msg.content.as_str());
        session.add_turn("assistant", final_text.as_str());
        self.sessions
            .save(&msg.channel, &msg.chat_id, &session)
            .await?;

        Ok(Some(OutboundMessage::new(
            msg.channel,
            msg.chat_id,
            final_text,
        )))
    }

    /// Iterate provider calls and tool executions until the provider
    /// returns plain text or the iteration cap is hit.
    async fn run_tool_loop(
        &self,
        mut messages: Vec<Message>,
        session: &mut crate::session::Session,
    ) -> String {
        let tool_defs = self.tools.definitions().await;

        for iteration in 1..=self.max_iterations {
            let response = tokio::time::timeout(
                self.request_timeout,
                self.provider.chat(ChatRequest {
                    messages: messages.clone(),
                    tools: Some(tool_defs.clone()),
                    model: Some(&self.model),
                    max_tokens: self.max_tokens,
                    temperature: self.temperature,
                }),
            )
            .await;

            let response = match response {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    // Provider failure is terminal for this message; the
                    // user gets an apology rather than silence.
                    error!("provider call failed on iteration {}: {}", iteration, e);
                    return PROVIDER_FAILURE_REPLY.to_string();
                }
                Err(_) => {
                    error!(
                        "provider call timed out after {:?} on iteration {}",
                        self.request_timeout, iteration
                    );
                    return PROVIDER_FAILURE_REPLY.to_string();
                }
            };

            if response.has_tool_calls() {
                messages.push(Message::assistant(
                    response.content.clone().unwrap_or_default(),
                    Some(response.tool_calls.clone()),
                ));

                // Execute in declaration order; results are appended in
                // that same order. A failed tool becomes an error-flagged
                // tool result so the model can observe and recover.
                for tc in &response.tool_calls {
                    let (text, is_error) =
                        match self.tools.execute(&tc.name, tc.arguments.clone()).await {
                            Ok(result) => (result, false),
                            Err(e) => (e.to_string(), true),
                        };
                    messages.push(Message::tool_result(tc.id.as_str(), text.as_str(), is_error));
                    session.add_turn("tool", format!("{}: {}", tc.name, text));
                }
                continue;
            }

            if let Some(content) = response.content {
                return self.sanitize(&content);
            }

            warn!("provider returned neither text nor tool calls, stopping");
            return PROVIDER_FAILURE_REPLY.to_string();
        }

        warn!(
            "tool iteration limit ({}) reached without a final answer",
            self.max_iterations
        );
        format!(
            "I hit the tool iteration limit ({}) before finishing. Please try a simpler request.",
            self.max_iterations
        )
    }

    /// Output-path sanitation: strip `<think>` blocks (and any
    /// user-configured pattern), then trim.
    fn sanitize(&self, content: &str) -> String {
        let mut out = content.to_string();
        for re in &self.think_patterns {
            out = re.replace_all(&out, "").to_string();
        }
        out.trim().to_string()
    }
}

/// Case-insensitive "remember" prefix followed by a non-empty payload.
fn remember_payload(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.len() < 8
        || !trimmed.is_char_boundary(8)
        || !trimmed[..8].eq_ignore_ascii_case("remember")
    {
        return None;
    }
    let rest = &trimmed[8..];
    // "remembering ..." is not the keyword; require a separator.
    if !rest.is_empty() && !rest.starts_with([' ', '\t', ':', ',']) {
        return None;
    }
    let payload = rest.trim_start_matches([':', ',']).trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}
