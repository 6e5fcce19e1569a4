//! Ingest command - load daily metric rows.

use std::path::PathBuf;

use adwise_rules::MetricsBatch;
use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use serde_json::json;
use tracing::info;

use super::{Context, read_input};

/// Arguments for the ingest command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// JSON file with `campaigns` and `search_terms` arrays
    pub file: PathBuf,
}

/// Run the ingest command.
///
/// Rows are keyed by date and ids, so re-ingesting a file replaces rather
/// than duplicates.
pub async fn run(args: IngestArgs, ctx: &Context) -> Result<()> {
    let raw = read_input(&args.file).context("ingest")?;
    let batch: MetricsBatch = serde_json::from_str(&raw)
        .with_context(|| format!("ingest: {} is not a valid metrics batch", args.file.display()))?;

    let db = ctx.open_metrics().context("ingest")?;
    let campaigns = db
        .upsert_campaign_days(&batch.campaigns)
        .context("ingest: campaign rows")?;
    let search_terms = db
        .upsert_search_term_days(&batch.search_terms)
        .context("ingest: search term rows")?;

    info!(
        file = %args.file.display(),
        campaigns,
        search_terms,
        "Ingested metric rows"
    );

    if ctx.json_output {
        let out = json!({ "campaigns": campaigns, "search_terms": search_terms });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let green = Style::new().green();
        println!(
            "{} Ingested {} campaign rows and {} search term rows",
            green.apply_to("✓"),
            campaigns,
            search_terms
        );
    }
    Ok(())
}
