//! Citewise CLI
//!
//! Ask questions of an indexed document corpus and get answers with
//! citations.

mod commands;

use clap::{Parser, Subcommand};
use citewise_core::{config::AppConfig, logging};
use commands::{AskCommand, DocumentsCommand, IndexCommand, RouteCommand, SearchCommand};
use std::path::PathBuf;

/// Citewise - citation-grounded answers from institutional documents
#[derive(Parser, Debug)]
#[command(name = "citewise")]
#[command(about = "Citation-grounded answers from institutional documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CITEWISE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CITEWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, mock)
    #[arg(short, long, global = true, env = "CITEWISE_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "CITEWISE_MODEL")]
    model: Option<String>,

    /// Seconds to wait for the language model
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question from the indexed documents
    Ask(AskCommand),

    /// Show the chunks retrieval ranks for a question
    Search(SearchCommand),

    /// Show how a question would be routed
    Route(RouteCommand),

    /// Index chunk files (JSON lines)
    Index(IndexCommand),

    /// List indexed documents
    Documents(DocumentsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );
    if cli.timeout.is_some() {
        config.timeout_secs = cli.timeout;
    }
    config.validate()?;

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::debug!(workspace = ?config.workspace, provider = %config.provider, model = %config.model, "Citewise starting");

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Search(_) => "search",
        Commands::Route(_) => "route",
        Commands::Index(_) => "index",
        Commands::Documents(_) => "documents",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Route(cmd) => cmd.execute(&config),
        Commands::Index(cmd) => cmd.execute(&config).await,
        Commands::Documents(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
