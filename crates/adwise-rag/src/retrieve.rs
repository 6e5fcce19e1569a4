//! Exact nearest-neighbour retrieval over recent memory.
//!
//! The query is embedded with the configured model and scored by dot
//! product against at most `candidate_limit` of the most recent documents.
//! Vectors are unit length, so the dot product is the cosine similarity.

use std::sync::Arc;

use adwise_config::AdwiseConfig;
use adwise_embed::{EmbeddingProvider, dot};
use adwise_memory::{Candidate, DocType, DocumentId, MemoryStore};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// Retrieval limits and the model queries are embedded with.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Embedding model; must match the model stored documents used.
    pub model_id: String,
    /// Most recent documents scanned per query.
    pub candidate_limit: usize,
    /// Character budget per returned snippet.
    pub content_chars: usize,
}

impl RetrieverConfig {
    /// Defaults for `model_id`: 200 candidates, 2500 characters.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            candidate_limit: 200,
            content_chars: 2500,
        }
    }

    /// Build from the `[embedding]` and `[retrieval]` sections.
    pub fn from_config(config: &AdwiseConfig) -> Self {
        let retrieval = config.retrieval();
        Self {
            model_id: config.embedding().model,
            candidate_limit: retrieval.candidate_limit,
            content_chars: retrieval.content_chars,
        }
    }
}

/// One ranked document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSnippet {
    pub score: f32,
    pub doc_id: DocumentId,
    pub doc_type: DocType,
    pub source: String,
    pub created_at: NaiveDate,
    /// Content cut to the configured character budget.
    pub content: String,
}

/// Retrieved context plus the reason it is empty, if retrieval failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecallContext {
    pub snippets: Vec<ScoredSnippet>,
    /// Set when retrieval failed and the caller continues without memory.
    pub warning: Option<String>,
}

impl RecallContext {
    /// Whether there is nothing to show.
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

/// Ranks stored documents against a query.
pub struct Retriever {
    store: Arc<MemoryStore>,
    provider: Arc<EmbeddingProvider>,
    config: RetrieverConfig,
}

impl Retriever {
    /// Create a retriever over `store`.
    pub fn new(
        store: Arc<MemoryStore>,
        provider: Arc<EmbeddingProvider>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    /// The retriever's configuration.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Top `top_k` documents of `doc_types` by similarity to `query`.
    ///
    /// Ties keep recency order (newer first). An empty store yields an empty
    /// list. Fails if any candidate was embedded with another model or
    /// dimensionality.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        doc_types: &[DocType],
    ) -> Result<Vec<ScoredSnippet>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let candidates = self
            .store
            .recent_candidates(doc_types, self.config.candidate_limit)?;
        if candidates.is_empty() {
            debug!("No stored documents to retrieve from");
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed(query, &self.config.model_id).await?;
        for candidate in &candidates {
            self.check_compatible(candidate, query_vector.len())?;
        }

        // Candidates arrive newest first; the stable sort keeps that order on ties
        let mut scored: Vec<(f32, Candidate)> = candidates
            .into_iter()
            .map(|c| (dot(&query_vector, &c.embedding.vector), c))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        debug!(
            query_chars = query.len(),
            returned = scored.len(),
            top_score = ?scored.first().map(|s| s.0),
            "retrieval complete"
        );

        Ok(scored
            .into_iter()
            .map(|(score, c)| ScoredSnippet {
                score,
                doc_id: c.document.id,
                doc_type: c.document.doc_type,
                source: c.document.source,
                created_at: c.document.created_at,
                content: truncate_chars(&c.document.content, self.config.content_chars),
            })
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve), but never fails: errors are
    /// logged and returned as a warning with no snippets.
    pub async fn recall_context(
        &self,
        query: &str,
        top_k: usize,
        doc_types: &[DocType],
    ) -> RecallContext {
        match self.retrieve(query, top_k, doc_types).await {
            Ok(snippets) => RecallContext {
                snippets,
                warning: None,
            },
            Err(e) => {
                if e.is_model_unavailable() {
                    warn!(error = %e, "Embedding model unavailable, continuing without prior context");
                } else {
                    warn!(error = %e, "Retrieval failed, continuing without prior context");
                }
                RecallContext {
                    snippets: Vec::new(),
                    warning: Some(e.to_string()),
                }
            }
        }
    }

    fn check_compatible(&self, candidate: &Candidate, query_dim: usize) -> Result<()> {
        let embedding = &candidate.embedding;
        if embedding.model != self.config.model_id || embedding.dim != query_dim {
            return Err(RagError::ModelMismatch {
                doc_id: candidate.document.id,
                stored_model: embedding.model.clone(),
                stored_dim: embedding.dim,
                query_model: self.config.model_id.clone(),
                query_dim,
            });
        }
        Ok(())
    }
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
