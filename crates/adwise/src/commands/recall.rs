//! Recall command - search memory for prior runs.

use adwise_rag::{Retriever, RetrieverConfig, truncate_chars};
use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};

use super::{Context, parse_doc_types};

/// Arguments for the recall command.
#[derive(Args, Debug)]
pub struct RecallArgs {
    /// Search query
    pub query: String,

    /// Maximum results to return (default: [retrieval] top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Document type to search; repeatable (default: [retrieval] doc_types)
    #[arg(short = 't', long = "doc-type")]
    pub doc_types: Vec<String>,
}

/// Run the recall command.
///
/// Unlike prompt building, recall surfaces retrieval errors.
pub async fn run(args: RecallArgs, ctx: &Context) -> Result<()> {
    let doc_types = if args.doc_types.is_empty() {
        ctx.default_doc_types().context("recall: [retrieval] doc_types")?
    } else {
        parse_doc_types(&args.doc_types).context("recall")?
    };
    let top_k = args.top_k.unwrap_or_else(|| ctx.config.retrieval().top_k);

    let dim = Style::new().dim();
    if ctx.verbose && !ctx.json_output {
        let names: Vec<&str> = doc_types.iter().map(|t| t.as_str()).collect();
        println!(
            "{}",
            dim.apply_to(format!(
                "Searching: \"{}\" (top_k: {}, types: {})",
                args.query,
                top_k,
                names.join(", ")
            ))
        );
        println!();
    }

    let store = ctx.open_memory().context("recall: memory store")?;
    let retriever = Retriever::new(
        store,
        ctx.embedding_provider(),
        RetrieverConfig::from_config(&ctx.config),
    );
    let results = retriever
        .retrieve(&args.query, top_k, &doc_types)
        .await
        .context("recall: retrieval")?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", dim.apply_to("No results found"));
        return Ok(());
    }

    println!("{}", style("Recall Results").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    println!();

    for (i, snippet) in results.iter().enumerate() {
        let first_line = snippet.content.lines().next().unwrap_or_default();
        println!(
            "{}. [{}] {} {}",
            style(i + 1).cyan(),
            snippet.doc_type,
            snippet.created_at,
            truncate_chars(first_line, 70)
        );
        println!(
            "   {}",
            dim.apply_to(format!(
                "(score: {:.4}, doc {}, source {})",
                snippet.score, snippet.doc_id, snippet.source
            ))
        );
        println!();
    }
    Ok(())
}
