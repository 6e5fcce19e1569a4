//! Stats command - metrics and memory counts.

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use serde_json::json;

use super::Context;

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {}

/// Run the stats command.
pub async fn run(_args: StatsArgs, ctx: &Context) -> Result<()> {
    let metrics = ctx
        .open_metrics()
        .and_then(|db| Ok(db.count_rows()?))
        .context("stats: metrics store")?;
    let memory = ctx
        .open_memory()
        .and_then(|store| Ok(store.stats()?))
        .context("stats: memory store")?;

    if ctx.json_output {
        let out = json!({ "metrics": metrics, "memory": memory });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let dim = Style::new().dim();

    println!("{}", style("Metrics").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!("  Database:          {}", ctx.metrics_db.display());
    println!("  Campaign days:     {}", metrics.campaign_days);
    println!("  Search term days:  {}", metrics.search_term_days);
    println!();

    println!("{}", style("Memory").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!("  Database:          {}", ctx.memory_db.display());
    println!("  Schema version:    {}", memory.schema_version);
    println!("  Documents:         {}", memory.documents);
    for (doc_type, count) in &memory.documents_by_type {
        println!("    {:<16} {}", doc_type.as_str(), count);
    }
    println!("  Embeddings:        {}", memory.embeddings);
    match (&memory.embedding_model, memory.embedding_dimensions) {
        (Some(model), Some(dims)) => println!("  Embedding model:   {} ({} dims)", model, dims),
        _ => println!("  Embedding model:   {}", dim.apply_to("(not configured)")),
    }
    Ok(())
}
