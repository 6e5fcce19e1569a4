//! Writes a finished run into memory.
//!
//! One run becomes three documents, each with its own embedding:
//!
//! | doc_type          | content                  | embedded text                   |
//! |-------------------|--------------------------|---------------------------------|
//! | `analysis`        | analysis JSON            | run summary                     |
//! | `recommendations` | full recommendation text | first 8000 characters           |
//! | `run_summary`     | run summary              | run summary                     |
//!
//! All embeddings are computed before anything is written, and the three
//! documents are inserted in one transaction, so a failed run leaves no
//! trace in memory.

use std::sync::Arc;

use adwise_config::IndexerConfig;
use adwise_embed::EmbeddingProvider;
use adwise_memory::{
    ConsistencyError, DocType, Document, DocumentId, MemoryError, MemoryStore, PendingDocument,
};
use adwise_rules::{Action, AnalysisReport};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::{RagError, Result};
use crate::retrieve::truncate_chars;

// ─────────────────────────────────────────────────────────────────────────────
// Run Summary
// ─────────────────────────────────────────────────────────────────────────────

/// Caps applied when condensing a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLimits {
    pub max_campaign_actions: usize,
    pub max_search_term_actions: usize,
    pub recommendation_head_lines: usize,
    pub recommendation_embed_chars: usize,
}

impl Default for SummaryLimits {
    fn default() -> Self {
        Self::from(&IndexerConfig::default())
    }
}

impl From<&IndexerConfig> for SummaryLimits {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            max_campaign_actions: config.max_campaign_actions,
            max_search_term_actions: config.max_search_term_actions,
            recommendation_head_lines: config.recommendation_head_lines,
            recommendation_embed_chars: config.recommendation_embed_chars,
        }
    }
}

/// Condensed digest of one run, stored as the `run_summary` document.
pub fn build_run_summary(
    analysis: &AnalysisReport,
    recommendations: &str,
    run_date: NaiveDate,
    limits: &SummaryLimits,
) -> String {
    let campaign_lines: Vec<String> = analysis
        .campaign_actions
        .iter()
        .take(limits.max_campaign_actions)
        .map(action_line)
        .collect();
    let term_lines: Vec<String> = analysis
        .search_term_actions
        .iter()
        .take(limits.max_search_term_actions)
        .map(action_line)
        .collect();
    let head: Vec<&str> = recommendations
        .trim()
        .lines()
        .take(limits.recommendation_head_lines)
        .collect();

    format!(
        "RUN SUMMARY\n\
         date: {run_date}\n\
         mode: {mode}\n\
         window_days: {window_days}\n\
         \n\
         campaign_actions: {campaign_count}\n\
         search_term_actions: {term_count}\n\
         \n\
         TOP CAMPAIGN ACTIONS\n\
         {campaigns}\n\
         TOP SEARCH TERM ACTIONS\n\
         {terms}\n\
         RECOMMENDATIONS (first {head_lines} lines)\n\
         {head}\n",
        mode = analysis.mode,
        window_days = analysis.window_days,
        campaign_count = analysis.campaign_actions.len(),
        term_count = analysis.search_term_actions.len(),
        campaigns = bullet_block(&campaign_lines),
        terms = bullet_block(&term_lines),
        head_lines = limits.recommendation_head_lines,
        head = head.join("\n"),
    )
}

/// One line per entry, each newline-terminated; `- (none)` when empty.
fn bullet_block(lines: &[String]) -> String {
    if lines.is_empty() {
        return "- (none)\n".to_string();
    }
    lines.iter().map(|line| format!("{line}\n")).collect()
}

fn action_line(action: &Action) -> String {
    match action {
        Action::NegativeKeywordCandidate {
            search_term,
            clicks,
            cost,
            ..
        } => format!(
            "- {}: {} (clicks={}, cost={:.2})",
            action.type_tag(),
            search_term,
            clicks,
            cost
        ),
        Action::ScaleCandidate {
            campaign,
            cost,
            conversions,
            roas,
            ..
        } => format!(
            "- {}: {} (cost={:.2}, conv={:.2}, roas={:.2})",
            action.type_tag(),
            campaign,
            cost,
            conversions,
            roas
        ),
        Action::PauseCandidate {
            campaign,
            cost,
            conversions,
            ..
        } => format!(
            "- {}: {} (cost={:.2}, conv={:.2})",
            action.type_tag(),
            campaign,
            cost,
            conversions
        ),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Index Report
// ─────────────────────────────────────────────────────────────────────────────

/// Where the run's inputs came from, recorded as document sources.
#[derive(Debug, Clone)]
pub struct RunSources {
    pub analysis: String,
    pub recommendations: String,
}

/// Ids written for one indexed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub analysis_id: DocumentId,
    pub recommendations_id: DocumentId,
    pub summary_id: DocumentId,
    /// Embedding model used for all three documents.
    pub model: String,
    pub dimensions: usize,
}

impl std::fmt::Display for IndexReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Indexed run: analysis={}, recommendations={}, summary={} ({}, {} dims)",
            self.analysis_id, self.recommendations_id, self.summary_id, self.model, self.dimensions
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run Indexer
// ─────────────────────────────────────────────────────────────────────────────

/// Documents re-embedded by [`RunIndexer::reindex`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReindexReport {
    pub documents: usize,
    pub model: String,
    pub dimensions: usize,
}

impl std::fmt::Display for ReindexReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Re-embedded {} documents with {} ({} dims)",
            self.documents, self.model, self.dimensions
        )
    }
}

/// The only writer into run memory.
pub struct RunIndexer {
    store: Arc<MemoryStore>,
    provider: Arc<EmbeddingProvider>,
    model_id: String,
    dimensions: usize,
    limits: SummaryLimits,
}

impl RunIndexer {
    /// Create an indexer embedding with `model_id` into `dimensions`.
    ///
    /// Vectors of any other length are rejected before anything is written.
    pub fn new(
        store: Arc<MemoryStore>,
        provider: Arc<EmbeddingProvider>,
        model_id: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            store,
            provider,
            model_id: model_id.into(),
            dimensions,
            limits: SummaryLimits::default(),
        }
    }

    /// Override the summary caps.
    pub fn with_limits(mut self, limits: SummaryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Get a reference to the underlying memory store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Index one completed run.
    ///
    /// Must only be called once recommendation text exists; empty text is
    /// rejected so stored recommendations always belong to finished runs.
    /// Fails without writing if memory holds embeddings from another model
    /// or dimensionality; [`reindex`](Self::reindex) them first.
    pub async fn index_run(
        &self,
        analysis: &AnalysisReport,
        recommendations: &str,
        sources: &RunSources,
        run_date: NaiveDate,
    ) -> Result<IndexReport> {
        if recommendations.trim().is_empty() {
            return Err(RagError::EmptyRecommendations);
        }

        let summary = build_run_summary(analysis, recommendations, run_date, &self.limits);
        let analysis_json = analysis.to_json_pretty()?;
        let rec_excerpt = truncate_chars(recommendations, self.limits.recommendation_embed_chars);

        let [summary_vec, rec_vec]: [Vec<f32>; 2] = self
            .embed_checked(&[summary.as_str(), rec_excerpt.as_str()])
            .await?
            .try_into()
            .map_err(|v: Vec<_>| {
                adwise_embed::EmbedError::Encoding(format!("expected 2 embeddings, got {}", v.len()))
            })?;

        let pending = [
            PendingDocument {
                doc_type: DocType::Analysis,
                source: sources.analysis.clone(),
                content: analysis_json,
                created_at: run_date,
                model: self.model_id.clone(),
                vector: summary_vec.clone(),
            },
            PendingDocument {
                doc_type: DocType::Recommendations,
                source: sources.recommendations.clone(),
                content: recommendations.to_string(),
                created_at: run_date,
                model: self.model_id.clone(),
                vector: rec_vec,
            },
            PendingDocument {
                doc_type: DocType::RunSummary,
                source: format!("run:{run_date}"),
                content: summary,
                created_at: run_date,
                model: self.model_id.clone(),
                vector: summary_vec,
            },
        ];

        let ids = self
            .store
            .index_documents(&self.model_id, self.dimensions, &pending)?;
        let report = IndexReport {
            analysis_id: ids[0],
            recommendations_id: ids[1],
            summary_id: ids[2],
            model: self.model_id.clone(),
            dimensions: self.dimensions,
        };

        info!(
            analysis = %report.analysis_id,
            recommendations = %report.recommendations_id,
            summary = %report.summary_id,
            "Run indexed into memory"
        );
        Ok(report)
    }

    /// Re-embed every document whose embedding is missing or came from
    /// another model or dimensionality, then switch memory to this model.
    ///
    /// All vectors are computed first and written in one transaction, so a
    /// failure leaves memory as it was.
    pub async fn reindex(&self) -> Result<ReindexReport> {
        let stale = self
            .store
            .documents_needing_embedding(&self.model_id, self.dimensions)?;

        let mut texts = Vec::with_capacity(stale.len());
        for doc in &stale {
            texts.push(self.embedding_text(doc)?);
        }
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = if refs.is_empty() {
            Vec::new()
        } else {
            self.embed_checked(&refs).await?
        };

        let pairs: Vec<(DocumentId, Vec<f32>)> =
            stale.iter().map(|d| d.id).zip(vectors).collect();
        self.store
            .replace_embeddings(&self.model_id, self.dimensions, &pairs)?;

        info!(documents = pairs.len(), model = %self.model_id, "Memory re-indexed");
        Ok(ReindexReport {
            documents: pairs.len(),
            model: self.model_id.clone(),
            dimensions: self.dimensions,
        })
    }

    /// Text a stored document is embedded from, matching [`index_run`](Self::index_run).
    ///
    /// An analysis shares its run summary's embedding; the summary is the
    /// document written two ids later in the same run.
    fn embedding_text(&self, doc: &Document) -> Result<String> {
        match doc.doc_type {
            DocType::RunSummary => Ok(doc.content.clone()),
            DocType::Recommendations => Ok(truncate_chars(
                &doc.content,
                self.limits.recommendation_embed_chars,
            )),
            DocType::Analysis => {
                let summary = self.store.get_document(DocumentId(doc.id.0 + 2))?;
                Ok(match summary {
                    Some(s) if s.doc_type == DocType::RunSummary && s.created_at == doc.created_at => {
                        s.content
                    }
                    _ => doc.content.clone(),
                })
            }
        }
    }

    /// Embed `texts` and reject any vector not of the configured length.
    async fn embed_checked(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.provider.embed_batch(texts, &self.model_id).await?;
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimensions) {
            return Err(MemoryError::from(ConsistencyError::DimensionMismatch {
                expected: self.dimensions,
                actual: bad.len(),
            })
            .into());
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieve::{Retriever, RetrieverConfig};
    use adwise_config::ThresholdProfile;
    use adwise_embed::{
        EmbedError, EmbedderKind, EmbedderSpec, HashEmbedder, ModelLoader, SharedEmbedder,
    };
    use adwise_rules::action::SCALE_SUGGESTION;

    const MODEL: &str = "hash-32";

    fn run_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 6).unwrap()
    }

    fn sources() -> RunSources {
        RunSources {
            analysis: "analysis_output.json".to_string(),
            recommendations: "reports/recommendations_2026-04-06.md".to_string(),
        }
    }

    fn analysis(winners: usize, negatives: usize) -> AnalysisReport {
        let mut report = AnalysisReport::empty("weekly", &ThresholdProfile::weekly(), run_date());
        for i in 0..winners {
            report.campaign_actions.push(Action::ScaleCandidate {
                campaign: format!("Campaign {i}"),
                cost: 250.0,
                conversions: 3.0,
                conversions_value: 400.0,
                roas: 1.6,
                suggestion: SCALE_SUGGESTION.to_string(),
            });
        }
        for i in 0..negatives {
            report.search_term_actions.push(Action::NegativeKeywordCandidate {
                search_term: format!("term {i}"),
                clicks: 25,
                cost: 40.0,
                why: "w".to_string(),
            });
        }
        report
    }

    fn indexer(store: Arc<MemoryStore>) -> RunIndexer {
        hash_indexer(store, 32, 32)
    }

    /// Indexer expecting `dims` over a hash model producing `produced`.
    fn hash_indexer(store: Arc<MemoryStore>, produced: usize, dims: usize) -> RunIndexer {
        let provider = Arc::new(EmbeddingProvider::from_spec(EmbedderSpec::new(
            EmbedderKind::Hash,
            produced,
        )));
        RunIndexer::new(store, provider, MODEL, dims)
    }

    #[test]
    fn test_summary_format() {
        let report = analysis(1, 1);
        let summary = build_run_summary(
            &report,
            "\n# Priority Summary\n## High\n- Campaign 0\n",
            run_date(),
            &SummaryLimits::default(),
        );

        assert_eq!(
            summary,
            "RUN SUMMARY\n\
             date: 2026-04-06\n\
             mode: weekly\n\
             window_days: 7\n\
             \n\
             campaign_actions: 1\n\
             search_term_actions: 1\n\
             \n\
             TOP CAMPAIGN ACTIONS\n\
             - SCALE_WINNER: Campaign 0 (cost=250.00, conv=3.00, roas=1.60)\n\
             \n\
             TOP SEARCH TERM ACTIONS\n\
             - ADD_NEGATIVE: term 0 (clicks=25, cost=40.00)\n\
             \n\
             RECOMMENDATIONS (first 40 lines)\n\
             # Priority Summary\n\
             ## High\n\
             - Campaign 0\n"
        );
    }

    #[test]
    fn test_summary_caps_and_none() {
        let report = analysis(12, 0);
        let recs: String = (0..60).map(|i| format!("line {i}\n")).collect();
        let summary = build_run_summary(&report, &recs, run_date(), &SummaryLimits::default());

        assert_eq!(summary.matches("SCALE_WINNER").count(), 8);
        assert!(summary.contains("campaign_actions: 12"));
        assert!(summary.contains("TOP SEARCH TERM ACTIONS\n- (none)\n"));
        assert!(summary.contains("line 39\n"));
        assert!(!summary.contains("line 40"));
    }

    #[tokio::test]
    async fn test_index_run_writes_three_documents() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let indexer = indexer(Arc::clone(&store));

        let report = indexer
            .index_run(&analysis(2, 1), "Pause nothing. Scale Campaign 0.", &sources(), run_date())
            .await
            .unwrap();

        assert_eq!(store.count_documents().unwrap(), 3);
        assert_eq!(store.count_embeddings().unwrap(), 3);
        assert_eq!(report.dimensions, 32);

        let analysis_doc = store.get_document(report.analysis_id).unwrap().unwrap();
        assert_eq!(analysis_doc.doc_type, DocType::Analysis);
        assert_eq!(analysis_doc.source, "analysis_output.json");
        assert!(AnalysisReport::from_json(&analysis_doc.content).is_ok());

        let summary_doc = store.get_document(report.summary_id).unwrap().unwrap();
        assert_eq!(summary_doc.source, "run:2026-04-06");

        // The analysis document is embedded with the summary text
        let a = store.get_embedding(report.analysis_id).unwrap().unwrap();
        let s = store.get_embedding(report.summary_id).unwrap().unwrap();
        assert_eq!(a.vector, s.vector);
        assert_eq!(a.model, MODEL);

        let stats = store.stats().unwrap();
        assert_eq!(stats.embedding_model.as_deref(), Some(MODEL));
    }

    #[tokio::test]
    async fn test_empty_recommendations_rejected() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let indexer = indexer(Arc::clone(&store));

        let err = indexer
            .index_run(&analysis(1, 0), "  \n ", &sources(), run_date())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmptyRecommendations));
        assert_eq!(store.count_documents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_vectors_of_wrong_length_are_rejected() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let indexer = hash_indexer(Arc::clone(&store), 16, 384);

        let err = indexer
            .index_run(&analysis(1, 0), "recs", &sources(), run_date())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::Memory(MemoryError::Consistency(ConsistencyError::DimensionMismatch {
                expected: 384,
                actual: 16
            }))
        ));

        let stats = store.stats().unwrap();
        assert_eq!(stats.documents, 0);
        assert!(stats.embedding_dimensions.is_none());
    }

    #[tokio::test]
    async fn test_dimension_change_requires_reindex() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        hash_indexer(Arc::clone(&store), 16, 16)
            .index_run(&analysis(1, 1), "first run", &sources(), run_date())
            .await
            .unwrap();

        let wider = hash_indexer(Arc::clone(&store), 32, 32);
        let err = wider
            .index_run(&analysis(1, 1), "second run", &sources(), run_date())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::Memory(MemoryError::Consistency(ConsistencyError::StaleEmbeddings {
                dim: 32,
                stale: 3,
                ..
            }))
        ));
        let stats = store.stats().unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.embedding_dimensions, Some(16));

        let reindexed = wider.reindex().await.unwrap();
        assert_eq!(reindexed.documents, 3);
        assert_eq!(store.stats().unwrap().embedding_dimensions, Some(32));

        // Analysis keeps sharing the summary's vector after re-embedding
        let a = store.get_embedding(DocumentId(1)).unwrap().unwrap();
        let s = store.get_embedding(DocumentId(3)).unwrap().unwrap();
        assert_eq!(a.dim, 32);
        assert_eq!(a.vector, s.vector);

        let second = wider
            .index_run(&analysis(1, 1), "second run", &sources(), run_date())
            .await
            .unwrap();
        assert_eq!(second.dimensions, 32);

        let provider = Arc::new(EmbeddingProvider::new(HashLoader));
        let retriever = Retriever::new(store, provider, RetrieverConfig::new(MODEL));
        let results = retriever
            .retrieve("first run", 10, &DocType::ALL)
            .await
            .unwrap();
        assert_eq!(results.len(), 6);
    }

    #[tokio::test]
    async fn test_reindex_with_nothing_stale() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let indexer = indexer(Arc::clone(&store));
        indexer
            .index_run(&analysis(0, 0), "recs", &sources(), run_date())
            .await
            .unwrap();

        assert_eq!(indexer.reindex().await.unwrap().documents, 0);
        assert_eq!(store.count_embeddings().unwrap(), 3);
    }

    /// Loader whose model never loads.
    struct BrokenLoader;

    impl ModelLoader for BrokenLoader {
        fn load(&self, model_id: &str) -> adwise_embed::Result<SharedEmbedder> {
            Err(EmbedError::unavailable(model_id, "model.onnx missing"))
        }
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let indexer = RunIndexer::new(
            Arc::clone(&store),
            Arc::new(EmbeddingProvider::new(BrokenLoader)),
            MODEL,
            32,
        );

        let err = indexer
            .index_run(&analysis(1, 0), "recs", &sources(), run_date())
            .await
            .unwrap_err();
        assert!(err.is_model_unavailable());
        assert_eq!(store.count_documents().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_indexed_summary_is_retrievable() {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        let indexer = indexer(Arc::clone(&store));
        let report = analysis(1, 1);
        let recs = "Add term 0 as a negative keyword.";

        let indexed = indexer
            .index_run(&report, recs, &sources(), run_date())
            .await
            .unwrap();

        let provider = Arc::new(EmbeddingProvider::new(HashLoader));
        let retriever = Retriever::new(store, provider, RetrieverConfig::new(MODEL));
        let summary = build_run_summary(&report, recs, run_date(), &SummaryLimits::default());
        let results = retriever
            .retrieve(&summary, 1, &[DocType::RunSummary])
            .await
            .unwrap();

        assert_eq!(results[0].doc_id, indexed.summary_id);
        assert!((results[0].score - 1.0).abs() < 1e-4);
    }

    /// Same vectors as the indexer's provider, from a separate cache.
    struct HashLoader;

    impl ModelLoader for HashLoader {
        fn load(&self, model_id: &str) -> adwise_embed::Result<SharedEmbedder> {
            Ok(Arc::new(HashEmbedder::new(model_id, 32)))
        }
    }
}
