//! Retrieval-augmented memory for adwise runs.
//!
//! - [`Retriever`]: ranks recent stored documents against a query
//! - [`RunIndexer`]: writes a finished run (analysis, recommendations,
//!   summary) into memory
//! - [`RecommendationPrompt`]: renders the consultant prompt from an
//!   analysis plus recalled context

pub mod error;
pub mod indexer;
pub mod prompt;
pub mod retrieve;

pub use error::{RagError, Result};
pub use indexer::{
    IndexReport, ReindexReport, RunIndexer, RunSources, SummaryLimits, build_run_summary,
};
pub use prompt::RecommendationPrompt;
pub use retrieve::{RecallContext, Retriever, RetrieverConfig, ScoredSnippet, truncate_chars};
