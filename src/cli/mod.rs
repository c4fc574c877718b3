use crate::agent::skills::SkillManager;
use crate::agent::tools::exec::ExecTool;
use crate::agent::tools::filesystem::FilesystemTool;
use crate::agent::tools::memory::{ReadMemoryTool, ScopedMemory, WriteMemoryTool};
use crate::agent::tools::skill::{
    CreateSkillTool, DeleteSkillTool, ListSkillsTool, ReadSkillTool,
};
use crate::agent::tools::web::WebTool;
use crate::agent::tools::ToolRegistry;
use crate::agent::{AgentLoop, AgentLoopConfig};
use crate::bus::Hub;
use crate::channels::ChannelManager;
use crate::config::{get_config_path, load_config, save_config, Config};
use crate::cron::Scheduler;
use crate::gateway::GatewayState;
use crate::heartbeat::HeartbeatService;
use crate::mcp::proxy::register_mcp_tools;
use crate::mcp::McpManager;
use crate::providers::{LLMProvider, OpenAIProvider};
use crate::utils::{ensure_dir, get_picobot_home};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "picobot")]
#[command(about = "A tiny multi-channel AI agent", version)]
pub struct Cli {
    /// Path to the config file (default: ~/.picobot/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and workspace scaffolding
    Onboard,
    /// List registered tools
    Tools {
        /// Also connect configured MCP servers and list their tools
        #[arg(long)]
        mcp: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Onboard) => onboard(cli.config.as_deref()),
        Some(Commands::Tools { mcp }) => list_tools(cli.config.as_deref(), mcp).await,
        None => run_agent(cli.config.as_deref()).await,
    }
}

/// Bootstrap files written into a fresh workspace.
const WORKSPACE_SEEDS: &[(&str, &str)] = &[
    (
        "SOUL.md",
        "# Soul\n\nYou are a friendly, pragmatic assistant. Keep replies short.\n",
    ),
    (
        "AGENTS.md",
        "# Agent Instructions\n\nUse tools when they help. Ask before destructive actions.\n",
    ),
    ("USER.md", "# User\n\n(Describe yourself here.)\n"),
    (
        "TOOLS.md",
        "# Tools\n\nfilesystem, exec, web, read_memory, write_memory, \
         create_skill, list_skills, read_skill, delete_skill - plus any MCP tools.\n",
    ),
    ("HEARTBEAT.md", ""),
];

fn onboard(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => get_config_path()?,
    };
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }

    let config = Config::default();
    save_config(&config, Some(&path))?;
    println!("Wrote default config to {}", path.display());

    let workspace = config.workspace_path();
    ensure_dir(&workspace)?;
    ensure_dir(workspace.join("memory"))?;
    ensure_dir(workspace.join("sessions"))?;
    ensure_dir(workspace.join("skills"))?;
    for (name, content) in WORKSPACE_SEEDS {
        let file = workspace.join(name);
        if !file.exists() {
            std::fs::write(&file, content)?;
        }
    }
    println!("Workspace ready at {}", workspace.display());
    println!("Add your provider API key, then run `picobot` to start.");
    Ok(())
}

async fn list_tools(config_path: Option<&Path>, with_mcp: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let workspace = config.workspace_path();
    ensure_dir(&workspace)?;

    let registry = ToolRegistry::new();
    let scoped_memory = ScopedMemory::new();
    registry
        .register(Arc::new(FilesystemTool::new(&workspace)?))
        .await;
    registry
        .register(Arc::new(ExecTool::with_workspace(
            config.agents.defaults.exec_timeout_s,
            &workspace,
        )))
        .await;
    registry.register(Arc::new(WebTool::new())).await;
    registry
        .register(Arc::new(WriteMemoryTool::new(scoped_memory.clone())))
        .await;
    registry
        .register(Arc::new(ReadMemoryTool::new(scoped_memory)))
        .await;
    let skills = Arc::new(SkillManager::open(&workspace)?);
    registry
        .register(Arc::new(CreateSkillTool::new(skills.clone())))
        .await;
    registry
        .register(Arc::new(ListSkillsTool::new(skills.clone())))
        .await;
    registry
        .register(Arc::new(ReadSkillTool::new(skills.clone())))
        .await;
    registry
        .register(Arc::new(DeleteSkillTool::new(skills)))
        .await;

    // Keep the manager alive until after printing so definitions resolve.
    let _mcp = if with_mcp && !config.mcp.servers.is_empty() {
        let manager = Arc::new(McpManager::connect(&config.mcp).await);
        register_mcp_tools(&manager, &registry).await;
        Some(manager)
    } else {
        None
    };

    for def in registry.definitions().await {
        println!("{:<28} {}", def.name, def.description);
    }

    if let Some(manager) = _mcp {
        manager.shutdown().await;
    }
    Ok(())
}

/// Default run mode: hub, channels, agent loop, scheduler, heartbeat,
/// and the web UI, wired together until ctrl-c.
async fn run_agent(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let workspace = config.workspace_path();
    ensure_dir(&workspace)?;

    if config.providers.openai.api_key.is_empty() {
        warn!("providers.openai.apiKey is empty - LLM calls will fail");
    }

    let defaults = &config.agents.defaults;
    let provider: Arc<dyn LLMProvider> = Arc::new(OpenAIProvider::new(
        config.providers.openai.api_key.clone(),
        config.providers.openai.api_base.clone(),
        Some(defaults.model.clone()),
        defaults.request_timeout_s,
    ));

    let hub = Arc::new(Hub::new(crate::bus::hub::DEFAULT_CAPACITY));

    let agent = Arc::new(
        AgentLoop::new(
            &hub,
            AgentLoopConfig {
                provider,
                workspace: workspace.clone(),
                model: Some(defaults.model.clone()),
                max_tool_iterations: defaults.max_tool_iterations,
                max_tokens: defaults.max_tokens,
                temperature: defaults.temperature,
                request_timeout_s: defaults.request_timeout_s,
                exec_timeout_s: defaults.exec_timeout_s,
                strip_think_tags: defaults.strip_think_tags,
                think_tag_pattern: defaults.think_tag_pattern.clone(),
                mcp: config.mcp.clone(),
                ranker: None,
            },
        )
        .await
        .context("failed to build agent loop")?,
    );

    let cron_store = get_picobot_home().ok().map(|home| home.join("cron.json"));
    let scheduler = Arc::new(Scheduler::new(hub.inbound_sender()?, cron_store));

    let heartbeat = HeartbeatService::new(
        &workspace,
        defaults.heartbeat_interval_s,
        hub.inbound_sender()?,
    );

    let mut channels = ChannelManager::new(&config, hub.inbound_sender()?);
    info!("enabled channels: {:?}", channels.enabled_channels());

    // Wire everything up.
    channels.start_all(&hub).await?;
    let router = hub.start_router();
    let scheduler_worker = scheduler.start();
    let heartbeat_worker = heartbeat.start();

    if config.web.enabled {
        let state = GatewayState::new(
            &hub,
            scheduler.clone(),
            config_path.map(Path::to_path_buf),
        )?;
        let host = config.web.host.clone();
        let port = config.web.port;
        tokio::spawn(async move {
            if let Err(e) = crate::gateway::serve(state, &host, port).await {
                tracing::error!("web UI server failed: {}", e);
            }
        });
    }

    let agent_for_run = agent.clone();
    let agent_task = tokio::spawn(async move { agent_for_run.run().await });

    info!("picobot v{} running - press ctrl-c to stop", crate::VERSION);
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // Shutdown order: agent (which closes MCP), producers, then the hub.
    agent.stop().await;
    scheduler.stop();
    heartbeat.stop();
    channels.stop_all().await;
    hub.close();

    let _ = scheduler_worker.await;
    heartbeat_worker.abort();
    router.abort();
    let _ = agent_task.await;

    Ok(())
}
