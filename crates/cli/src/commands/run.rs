//! `goalclaw run`: one goal, one agent, one session directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use goalclaw_agent::{
    Agent, AgentProfile, AgentSelector, AgentVariables, ChatLog, ChatSnapshot, LoopConfig, LoopOutcome,
    LoopResult,
};
use goalclaw_config::AppConfig;
use goalclaw_core::embedding::EmbeddingApi;
use goalclaw_core::function::{AgentOutput, OutputKind};
use goalclaw_core::message::Message;
use goalclaw_core::provider::Provider;
use goalclaw_core::storage::{Workspace, join};
use goalclaw_memory::{FsWorkspace, VectorStore};
use goalclaw_telemetry::{DebugLog, DebugProvider};
use goalclaw_tools::FunctionContext;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::CliResult;

/// Session files the agent's own functions should leave alone.
const INTERNAL_DIR: &str = ".goalclaw";

#[derive(Args)]
pub struct RunArgs {
    /// What the agent should achieve
    #[arg(required_unless_present = "messages")]
    pub goal: Option<String>,

    /// Use this agent instead of selecting one for the goal
    #[arg(short, long)]
    pub agent: Option<String>,

    /// Session name (defaults to the current date and time)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Stop the run after this many seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Record goal, step and request timings in the session directory
    #[arg(long)]
    pub debug: bool,

    /// Preload the chat from a saved snapshot (chat.json)
    #[arg(short, long)]
    pub messages: Option<PathBuf>,

    /// Override the storage root (defaults to workspace.root_dir)
    #[arg(long)]
    pub root: Option<PathBuf>,
}

/// Where one run keeps its files.
pub struct Session {
    pub config: AppConfig,
    pub name: String,
    pub dir: PathBuf,
}

impl Session {
    pub fn open(args: &RunArgs) -> CliResult<Self> {
        let config = super::load_config(args.root.clone())?;
        let name = args.session.clone().unwrap_or_else(default_session_name);
        let dir = config.workspace.sessions_path().join(&name);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { config, name, dir })
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.join(INTERNAL_DIR).join("chat.log")
    }
}

/// `2024-3-7_9-5-12`: no zero padding, local time.
fn default_session_name() -> String {
    chrono::Local::now().format("%Y-%-m-%-d_%-H-%-M-%-S").to_string()
}

pub async fn run(session: Session, args: RunArgs) -> CliResult<()> {
    let config = &session.config;
    info!(session = %session.name, dir = %session.dir.display(), "Opening session");

    let providers = goalclaw_providers::build_from_config(config)?;
    let tokenizer = super::tokenizer()?;
    let embeddings: Arc<dyn EmbeddingApi> = Arc::new(super::embedding_client(
        config,
        providers.embeddings.clone(),
        tokenizer.clone(),
    ));

    let workspace: Arc<dyn Workspace> = Arc::new(FsWorkspace::new(&session.dir));
    let storage: Arc<dyn Workspace> = Arc::new(FsWorkspace::new(&config.workspace.root_dir));
    let collections = Arc::new(VectorStore::new(
        storage,
        config.workspace.collections_dir.clone(),
        embeddings.clone(),
    ));

    let debug_log = args
        .debug
        .then(|| Arc::new(DebugLog::new(workspace.clone(), INTERNAL_DIR)));
    let mut provider: Arc<dyn Provider> = providers.completion.clone();
    if let Some(log) = &debug_log {
        provider = Arc::new(DebugProvider::new(provider, log.clone()));
    }

    let profile = match (&args.agent, &args.goal) {
        (Some(name), _) => AgentProfile::find(name)
            .ok_or_else(|| format!("Unknown agent '{name}' (see `goalclaw agents`)"))?,
        (None, Some(goal)) => {
            let selector = AgentSelector::new(embeddings.clone(), AgentProfile::builtin())?;
            selector.select(goal).await?.clone()
        }
        (None, None) => return Err("--agent is required when resuming without a goal".into()),
    };
    println!("🤖 Agent: {}", profile.name);

    let mut chat = ChatLog::for_window(tokenizer, config.context_window_tokens, config.max_response_tokens);
    let restored = match &args.messages {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            let snapshot: ChatSnapshot = serde_json::from_str(&raw)?;
            chat.restore(snapshot)?;
            info!(messages = chat.len(), "Chat restored");
            true
        }
        None => false,
    };

    let ctx = FunctionContext::new(&profile.name, workspace.clone(), provider, &config.model)
        .with_embeddings(embeddings)
        .with_collections(collections)
        .with_search_results(config.agent.search_results);

    let mut loop_config = LoopConfig::from_config(config);
    if let Some(secs) = args.timeout {
        loop_config = loop_config.with_timeout(Duration::from_secs(secs));
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_outputs(rx));

    let variables = AgentVariables::new(config.agent.variable_threshold_chars);
    let mut agent = Agent::new(profile, ctx, chat, variables, loop_config).with_output_sink(tx);
    if let Some(log) = &debug_log {
        agent = agent.with_debug_log(log.clone());
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the agent");
            interrupt.cancel();
        }
    });

    let result = if restored {
        if let Some(goal) = &args.goal {
            agent.chat_mut().persistent(Message::user(goal.as_str()))?;
        }
        agent.run_with_chat(&cancel).await
    } else {
        let goal = args.goal.as_deref().ok_or("a goal is required")?;
        agent.run(goal, &cancel).await?
    };

    let snapshot = serde_json::to_string_pretty(&agent.chat().snapshot())?;
    let chat_path = join(INTERNAL_DIR, "chat.json");
    if let Err(e) = workspace.write(&chat_path, &snapshot).await {
        warn!(error = %e, "Failed to save chat snapshot");
    }

    drop(agent);
    let _ = printer.await;

    report(&result);
    if result.outcome.is_success() {
        Ok(())
    } else {
        Err(result.outcome.message().unwrap_or("agent did not finish").to_string().into())
    }
}

async fn print_outputs(mut rx: mpsc::UnboundedReceiver<AgentOutput>) {
    while let Some(output) = rx.recv().await {
        let icon = match output.kind {
            OutputKind::Message => "💬",
            OutputKind::Success => "✅",
            OutputKind::Error => "❌",
        };
        println!("{icon} {}", output.title);
        if let Some(content) = &output.content {
            for line in content.lines() {
                println!("   {line}");
            }
        }
    }
}

fn report(result: &LoopResult) {
    println!();
    match &result.outcome {
        LoopOutcome::Succeeded(message) => println!("🎯 Goal achieved: {message}"),
        LoopOutcome::Failed { kind, message } => println!("❌ Goal failed ({kind:?}): {message}"),
        LoopOutcome::Stopped(reason) => println!("⏹️  Stopped: {reason}"),
        LoopOutcome::Running => {}
    }
    println!("   Model requests: {}", result.iterations);
}
