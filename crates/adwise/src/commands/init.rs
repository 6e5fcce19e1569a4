//! Init command - create or upgrade the databases.

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use serde_json::json;

use super::Context;

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {}

/// Run the init command.
///
/// Opening a store creates its schema; running twice is harmless.
pub async fn run(_args: InitArgs, ctx: &Context) -> Result<()> {
    let metrics = ctx.open_metrics().context("init: metrics store")?;
    let memory = ctx.open_memory().context("init: memory store")?;

    let counts = metrics.count_rows().context("init: metrics store")?;
    let stats = memory.stats().context("init: memory store")?;

    if ctx.json_output {
        let out = json!({
            "metrics_db": ctx.metrics_db,
            "memory_db": ctx.memory_db,
            "schema_version": stats.schema_version,
            "campaign_days": counts.campaign_days,
            "search_term_days": counts.search_term_days,
            "documents": stats.documents,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let green = Style::new().green();
    println!(
        "{} Metrics database: {}",
        green.apply_to("✓"),
        ctx.metrics_db.display()
    );
    println!(
        "{} Memory store:     {} {}",
        green.apply_to("✓"),
        ctx.memory_db.display(),
        dim.apply_to(format!("(schema v{})", stats.schema_version))
    );
    println!();
    println!(
        "{}",
        style(format!(
            "{} campaign days, {} search term days, {} documents",
            counts.campaign_days, counts.search_term_days, stats.documents
        ))
        .dim()
    );
    Ok(())
}
