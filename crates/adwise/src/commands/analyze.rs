//! Analyze command - run the threshold rules over the decision window.

use std::path::PathBuf;

use adwise_rules::RuleEngine;
use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::Args;
use console::Style;

use super::{Context, today, write_atomic};

/// Arguments for the analyze command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Threshold profile (default: [analysis] profile)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Restrict to one customer account (default: [metrics] customer_id)
    #[arg(short, long)]
    pub customer: Option<String>,

    /// Where to write the analysis JSON
    #[arg(short, long, default_value = "analysis_output.json")]
    pub output: PathBuf,

    /// Evaluate as of this date instead of today (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

/// Run the analyze command.
///
/// The analysis JSON goes to stdout; status lines go to stderr.
pub async fn run(args: AnalyzeArgs, ctx: &Context) -> Result<()> {
    let engine = RuleEngine::from_config(&ctx.config, args.profile.as_deref())
        .context("analyze: threshold profile")?;

    let customer = args.customer.or_else(|| ctx.config.metrics().customer_id);
    let as_of = args.date.unwrap_or_else(today);

    if ctx.verbose {
        let dim = Style::new().dim();
        eprintln!(
            "{}",
            dim.apply_to(format!(
                "Profile '{}' from {} to {}",
                engine.profile_name(),
                engine.window_start(as_of),
                as_of
            ))
        );
    }

    let db = ctx.open_metrics().context("analyze")?;
    let report = engine
        .analyze_store(&db, as_of, customer.as_deref())
        .context("analyze: loading metrics window")?;

    let json = report.to_json_pretty()?;
    write_atomic(&args.output, &json).context("analyze: writing output")?;
    println!("{}", json);

    if !ctx.json_output {
        let green = Style::new().green();
        eprintln!(
            "{} {} campaign actions, {} search term actions -> {}",
            green.apply_to("✓"),
            report.campaign_actions.len(),
            report.search_term_actions.len(),
            args.output.display()
        );
    }
    Ok(())
}
