//! Index-run command - store a finished run in memory.

use std::path::PathBuf;

use adwise_rag::{RunIndexer, RunSources, SummaryLimits};
use adwise_rules::AnalysisReport;
use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::Args;
use console::Style;

use super::{Context, read_input, today};

/// Arguments for the index-run command.
#[derive(Args, Debug)]
pub struct IndexRunArgs {
    /// Analysis JSON the recommendations were written from
    #[arg(short, long)]
    pub analysis: PathBuf,

    /// Recommendation text for the run
    #[arg(short, long)]
    pub recommendations: PathBuf,

    /// Run date recorded on the documents (default: today)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Run the index-run command.
pub async fn run(args: IndexRunArgs, ctx: &Context) -> Result<()> {
    let raw = read_input(&args.analysis).context("index-run")?;
    let analysis = AnalysisReport::from_json(&raw).with_context(|| {
        format!("index-run: {} is not an analysis report", args.analysis.display())
    })?;
    let recommendations = read_input(&args.recommendations).context("index-run")?;

    let store = ctx.open_memory().context("index-run: memory store")?;
    let indexer = RunIndexer::new(
        store,
        ctx.embedding_provider(),
        ctx.embedding_model(),
        ctx.embedding_dimensions(),
    )
    .with_limits(SummaryLimits::from(&ctx.config.indexer()));

    let sources = RunSources {
        analysis: args.analysis.display().to_string(),
        recommendations: args.recommendations.display().to_string(),
    };
    let run_date = args.date.unwrap_or_else(today);

    let report = indexer
        .index_run(&analysis, &recommendations, &sources, run_date)
        .await
        .context("index-run: indexing")?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let green = Style::new().green();
        println!("{} {}", green.apply_to("✓"), report);
    }
    Ok(())
}
