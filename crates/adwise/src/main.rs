//! adwise - threshold rules and run memory for paid-search accounts
//!
//! Main entry point for the adwise CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{analyze, index_run, ingest, init, prompt, recall, reindex, stats};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// adwise - threshold rules and run memory for paid-search accounts
#[derive(Parser)]
#[command(name = "adwise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: ~/.config/adwise)
    #[arg(long, global = true, env = "ADWISE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Metrics database (overrides [metrics] database)
    #[arg(long, global = true)]
    pub metrics_db: Option<PathBuf>,

    /// Memory database (overrides [memory] database)
    #[arg(long, global = true)]
    pub memory_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or upgrade the metrics and memory databases
    Init(init::InitArgs),

    /// Load daily metric rows from a JSON file
    Ingest(ingest::IngestArgs),

    /// Run the threshold rules and write the analysis JSON
    Analyze(analyze::AnalyzeArgs),

    /// Build the recommendation prompt for an analysis
    Prompt(prompt::PromptArgs),

    /// Store a finished run (analysis + recommendations) in memory
    IndexRun(index_run::IndexRunArgs),

    /// Search memory for prior runs
    Recall(recall::RecallArgs),

    /// Re-embed memory with the configured embedding model
    Reindex(reindex::ReindexArgs),

    /// Show metrics and memory statistics
    Stats(stats::StatsArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "adwise=debug,adwise_rules=debug,adwise_embed=debug,adwise_memory=debug,adwise_rag=debug,adwise_config=debug,info"
    } else {
        "adwise=info,adwise_rules=warn,adwise_embed=warn,adwise_memory=warn,adwise_rag=warn,warn"
    };

    let log_dir = cli
        .config_dir
        .clone()
        .or_else(adwise_config::xdg_config_dir)
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "adwise.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "adwise=trace,adwise_rules=debug,adwise_embed=debug,adwise_memory=debug,adwise_rag=debug,adwise_config=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context::load(
        cli.config_dir,
        cli.metrics_db,
        cli.memory_db,
        cli.json,
        cli.verbose,
    )?;

    // Dispatch to command handlers
    match cli.command {
        Commands::Init(args) => init::run(args, &ctx).await,
        Commands::Ingest(args) => ingest::run(args, &ctx).await,
        Commands::Analyze(args) => analyze::run(args, &ctx).await,
        Commands::Prompt(args) => prompt::run(args, &ctx).await,
        Commands::IndexRun(args) => index_run::run(args, &ctx).await,
        Commands::Recall(args) => recall::run(args, &ctx).await,
        Commands::Reindex(args) => reindex::run(args, &ctx).await,
        Commands::Stats(args) => stats::run(args, &ctx).await,
    }
}
