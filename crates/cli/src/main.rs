//! GoalClaw CLI: the main entry point.
//!
//! Commands:
//! - `run`          Give a goal to an agent and stream its outputs
//! - `agents`       List the built-in agent profiles
//! - `collections`  Manage the vector store of embedded documents
//! - `config`       Show, initialize or locate the configuration

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

#[derive(Parser)]
#[command(
    name = "goalclaw",
    about = "GoalClaw: goal-driven agents that call functions until the goal is met",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an agent on a goal
    Run(commands::run::RunArgs),

    /// List the available agents
    Agents,

    /// Manage document collections
    Collections {
        /// Override the storage root (defaults to workspace.root_dir)
        #[arg(long, global = true)]
        root: Option<PathBuf>,

        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List collections and their document counts
    List,
    /// Create an empty collection (replaces an existing one)
    New { name: String },
    /// Embed a document and add it to a collection
    Add {
        name: String,
        /// Document text; reads --file when omitted
        text: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Show the documents most similar to a query
    Query {
        name: String,
        query: String,
        #[arg(short = 'k', long, default_value_t = 5)]
        limit: usize,
    },
    /// Delete a collection
    Remove { name: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Write a default config.toml if none exists
    Init,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let session = commands::run::Session::open(&args)?;
            init_tracing(cli.verbose, Some(&session.log_path()))?;
            commands::run::run(session, args).await?
        }
        Commands::Agents => {
            init_tracing(cli.verbose, None)?;
            commands::agents::run().await?
        }
        Commands::Collections { root, action } => {
            init_tracing(cli.verbose, None)?;
            let collections = commands::collections::open(root).await?;
            match action {
                CollectionAction::List => collections.list().await?,
                CollectionAction::New { name } => collections.create(&name).await?,
                CollectionAction::Add { name, text, file } => collections.add(&name, text, file).await?,
                CollectionAction::Query { name, query, limit } => {
                    collections.query(&name, &query, limit).await?
                }
                CollectionAction::Remove { name } => collections.remove(&name).await?,
            }
        }
        Commands::Config { action } => {
            init_tracing(cli.verbose, None)?;
            match action {
                ConfigAction::Show => commands::config_cmd::show().await?,
                ConfigAction::Init => commands::config_cmd::init().await?,
                ConfigAction::Path => commands::config_cmd::path().await?,
            }
        }
    }

    Ok(())
}

/// Install the stderr subscriber and, for goal runs, a plain-text copy of
/// the log in the session directory. A previous session log is replaced.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            let file = File::create(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}
