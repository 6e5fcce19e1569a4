//! Document and embedding records.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Store-assigned document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Document Type
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of document kept in run memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// Raw analysis JSON of one run.
    Analysis,
    /// Full recommendation text of one run.
    Recommendations,
    /// Condensed digest of one run.
    RunSummary,
}

impl DocType {
    /// All document types, in schema order.
    pub const ALL: [DocType; 3] = [
        DocType::Analysis,
        DocType::Recommendations,
        DocType::RunSummary,
    ];

    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Analysis => "analysis",
            DocType::Recommendations => "recommendations",
            DocType::RunSummary => "run_summary",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(DocType::Analysis),
            "recommendations" => Ok(DocType::Recommendations),
            "run_summary" => Ok(DocType::RunSummary),
            other => Err(MemoryError::InvalidData(format!(
                "unknown document type '{other}' (expected analysis, recommendations or run_summary)"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A stored document. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub doc_type: DocType,
    /// Free-text provenance, e.g. `analysis_output.json:2026-01-05`.
    pub source: String,
    pub content: String,
    pub created_at: NaiveDate,
}

/// The single embedding attached to a document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub doc_id: DocumentId,
    pub model: String,
    pub dim: usize,
    pub vector: Vec<f32>,
}

/// A document plus its embedding, written together by
/// [`MemoryStore::insert_documents_with_embeddings`](crate::MemoryStore::insert_documents_with_embeddings).
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub doc_type: DocType,
    pub source: String,
    pub content: String,
    pub created_at: NaiveDate,
    pub model: String,
    pub vector: Vec<f32>,
}

/// A recent document joined with its embedding, ready for scoring.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub document: Document,
    pub embedding: StoredEmbedding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_type_roundtrip() {
        for doc_type in DocType::ALL {
            assert_eq!(doc_type.as_str().parse::<DocType>().unwrap(), doc_type);
        }
    }

    #[test]
    fn test_doc_type_unknown() {
        let err = "summary".parse::<DocType>().unwrap_err();
        assert!(err.to_string().contains("unknown document type"));
    }
}
