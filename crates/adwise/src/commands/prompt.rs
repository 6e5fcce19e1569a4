//! Prompt command - build the recommendation prompt for an analysis.

use std::path::PathBuf;

use adwise_rag::{RecallContext, RecommendationPrompt, Retriever, RetrieverConfig};
use adwise_rules::AnalysisReport;
use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;

use super::{Context, read_input, write_atomic};

/// Arguments for the prompt command.
#[derive(Args, Debug)]
pub struct PromptArgs {
    /// Analysis JSON produced by `adwise analyze`
    #[arg(short, long)]
    pub analysis: PathBuf,

    /// Write the prompt here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip prior-run retrieval
    #[arg(long)]
    pub no_context: bool,
}

/// Run the prompt command.
///
/// Retrieval problems never fail the command; the prompt then says no
/// prior context was available.
pub async fn run(args: PromptArgs, ctx: &Context) -> Result<()> {
    let raw = read_input(&args.analysis).context("prompt")?;
    let analysis = AnalysisReport::from_json(&raw).with_context(|| {
        format!("prompt: {} is not an analysis report", args.analysis.display())
    })?;

    let context = if args.no_context {
        RecallContext::default()
    } else {
        recall_prior_runs(&analysis, ctx).await?
    };

    if let Some(warning) = &context.warning
        && !ctx.json_output
    {
        let yellow = Style::new().yellow();
        eprintln!("{} {}", yellow.apply_to("Warning:"), warning);
    }

    let prompt = RecommendationPrompt::build(&analysis, &context).context("prompt: rendering")?;

    match &args.output {
        Some(path) => {
            write_atomic(path, prompt.as_str()).context("prompt: writing output")?;
            if !ctx.json_output {
                let green = Style::new().green();
                eprintln!(
                    "{} Prompt with {} prior snippets -> {}",
                    green.apply_to("✓"),
                    context.snippets.len(),
                    path.display()
                );
            }
        }
        None => println!("{}", prompt),
    }
    Ok(())
}

async fn recall_prior_runs(analysis: &AnalysisReport, ctx: &Context) -> Result<RecallContext> {
    let store = ctx.open_memory().context("prompt: memory store")?;
    let retriever = Retriever::new(
        store,
        ctx.embedding_provider(),
        RetrieverConfig::from_config(&ctx.config),
    );
    let doc_types = ctx.default_doc_types().context("prompt: [retrieval] doc_types")?;
    let query = RecommendationPrompt::context_query(analysis);

    Ok(retriever
        .recall_context(&query, ctx.config.retrieval().top_k, &doc_types)
        .await)
}
