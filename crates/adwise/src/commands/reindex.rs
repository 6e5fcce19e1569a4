//! Reindex command - re-embed memory after an embedding model change.

use adwise_rag::{RunIndexer, SummaryLimits};
use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;

use super::Context;

/// Arguments for the reindex command.
#[derive(Args, Debug)]
pub struct ReindexArgs {}

/// Run the reindex command.
///
/// Only documents whose embedding is missing or stale are re-embedded; the
/// switch to the configured model happens in the same transaction.
pub async fn run(_args: ReindexArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_memory().context("reindex: memory store")?;
    let indexer = RunIndexer::new(
        store,
        ctx.embedding_provider(),
        ctx.embedding_model(),
        ctx.embedding_dimensions(),
    )
    .with_limits(SummaryLimits::from(&ctx.config.indexer()));

    let report = indexer.reindex().await.context("reindex: re-embedding")?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let green = Style::new().green();
        println!("{} {}", green.apply_to("✓"), report);
    }
    Ok(())
}
