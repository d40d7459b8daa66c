//! robun entry point: load configuration, wire the kernel together, run
//! until ctrl-c, then stop everything in dependency order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use robun_config::{ConfigLoader, RobunConfig};
use robun_core::{MessageBus, OutboundEvent, RobunError};
use robun_llm::{LlmProvider, OpenAiProvider};
use robun_runtime::tools::{OutboundPublisher, builtin_registry};
use robun_runtime::{
    AgentLoop, AgentOptions, Consolidator, ContextBuilder, CronJob, CronService,
    HeartbeatService, MemoryStore, OnJob, SessionStore, SubAgentManager,
};
use robun_server::AppState;

#[derive(Parser)]
#[command(name = "robun", version, about = "Multi-channel conversational agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the agent runtime and HTTP gateway.
    Start {
        /// Path to robun.toml (defaults to ROBUN_CONFIG or ~/.robun/robun.toml).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Start { config } => start(config).await,
    }
}

fn init_tracing(config: &RobunConfig) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.init(),
    }
}

fn build_provider(config: &RobunConfig) -> Arc<dyn LlmProvider> {
    // Prefer an explicit `openai` provider entry, else the first configured.
    let entry = config
        .providers
        .get("openai")
        .cloned()
        .or_else(|| config.providers.values().next().cloned())
        .unwrap_or_default();

    if entry.api_key.is_none() {
        warn!("no provider api_key configured — LLM calls will fail");
    }
    let mut provider = OpenAiProvider::new(entry.api_key.unwrap_or_default());
    if let Some(base) = entry.api_base {
        provider = provider.with_api_base(base, "openai-compatible");
    }
    if !entry.extra_headers.is_empty() {
        provider = provider.with_extra_headers(entry.extra_headers);
    }
    Arc::new(provider)
}

async fn start(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = ConfigLoader::load(config_path.as_deref()).context("loading configuration")?;
    init_tracing(&config);

    let workspace = config.agents.workspace.clone();
    std::fs::create_dir_all(&workspace).context("creating workspace")?;
    info!(workspace = %workspace.display(), "starting robun");

    let bus = Arc::new(MessageBus::new());
    let provider = build_provider(&config);
    let sessions = Arc::new(SessionStore::new(workspace.join("sessions"))?);
    let memory = Arc::new(MemoryStore::new(&workspace));
    let consolidator = Arc::new(Consolidator::new(
        provider.clone(),
        memory.clone(),
        sessions.clone(),
        &config.agents.model,
        config.agents.memory_window,
    ));
    let subagents = Arc::new(SubAgentManager::new(
        provider.clone(),
        bus.clone(),
        workspace.clone(),
        config.tools.clone(),
        &config.agents.model,
        config.agents.max_tokens,
        config.agents.temperature,
    ));

    // The cron callback needs the agent loop, which needs the registry,
    // which needs the cron service — resolved through a one-shot slot.
    let agent_slot: Arc<OnceCell<Arc<AgentLoop>>> = Arc::new(OnceCell::new());
    let on_job: OnJob = {
        let slot = agent_slot.clone();
        let bus = bus.clone();
        Arc::new(move |job: CronJob| {
            let slot = slot.clone();
            let bus = bus.clone();
            Box::pin(async move {
                let agent = slot
                    .get()
                    .ok_or_else(|| RobunError::Cron("agent loop not ready".into()))?;
                let reply = agent
                    .process_direct(
                        &job.payload.message,
                        &format!("cron:{}", job.id),
                        job.payload.channel.as_deref(),
                        job.payload.to.as_deref(),
                    )
                    .await?;
                if job.payload.deliver {
                    if let (Some(channel), Some(to)) =
                        (job.payload.channel.as_deref(), job.payload.to.as_deref())
                    {
                        bus.publish_outbound(OutboundEvent::new(channel, to, &reply));
                    }
                }
                Ok(reply)
            })
        })
    };
    let cron = Arc::new(
        CronService::new(workspace.join("cron").join("jobs.json"), on_job).await?,
    );

    let publish: OutboundPublisher = {
        let bus = bus.clone();
        Arc::new(move |event| bus.publish_outbound(event))
    };
    let registry = Arc::new(builtin_registry(
        workspace.clone(),
        &config.tools,
        publish,
        subagents.clone(),
        cron.clone(),
    ));

    let agent = Arc::new(AgentLoop::new(
        bus.clone(),
        provider,
        registry,
        sessions.clone(),
        memory,
        consolidator,
        ContextBuilder::new(workspace.clone()),
        AgentOptions::from(&config.agents),
    ));
    agent_slot
        .set(agent.clone())
        .map_err(|_| anyhow::anyhow!("agent slot already set"))?;

    let heartbeat = {
        let agent = agent.clone();
        let handler: robun_runtime::heartbeat::HeartbeatHandler = Arc::new(move |prompt| {
            let agent = agent.clone();
            Box::pin(async move {
                agent
                    .process_direct(&prompt, robun_runtime::HEARTBEAT_SESSION_KEY, None, None)
                    .await
            })
        });
        Arc::new(HeartbeatService::new(
            workspace.clone(),
            config.heartbeat.interval_secs,
            handler,
        ))
    };

    // Launch everything.
    cron.start().await?;
    if config.heartbeat.enabled {
        heartbeat.start().await;
    }
    let dispatcher = {
        let bus = bus.clone();
        tokio::spawn(async move { bus.dispatch_outbound().await })
    };
    let run_loop = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.run().await })
    };
    let gateway = {
        let state = Arc::new(AppState {
            config: config.clone(),
            agent: agent.clone(),
            sessions,
            cron: cron.clone(),
            subagents: subagents.clone(),
            started: Instant::now(),
        });
        tokio::spawn(async move {
            if let Err(e) = robun_server::serve(state).await {
                warn!(error = %e, "gateway exited");
            }
        })
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");

    heartbeat.stop().await;
    cron.stop().await;
    agent.stop();
    let _ = run_loop.await;
    subagents.shutdown(Duration::from_secs(10)).await;
    bus.stop();
    let _ = dispatcher.await;
    gateway.abort();

    info!("goodbye");
    Ok(())
}
