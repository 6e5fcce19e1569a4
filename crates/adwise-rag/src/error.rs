//! Error types for retrieval and indexing.

use adwise_embed::EmbedError;
use adwise_memory::{DocumentId, MemoryError};
use thiserror::Error;

/// Result type alias for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors from retrieval, indexing and prompt building.
#[derive(Debug, Error)]
pub enum RagError {
    /// Embedding model could not be loaded or failed to encode.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// Memory store read or write failed.
    #[error("memory store error: {0}")]
    Memory(#[from] MemoryError),

    /// A stored vector was produced by a different model than the query.
    #[error(
        "document {doc_id} was embedded with '{stored_model}' ({stored_dim} dims) \
         but queries use '{query_model}' ({query_dim} dims); re-index memory"
    )]
    ModelMismatch {
        doc_id: DocumentId,
        stored_model: String,
        stored_dim: usize,
        query_model: String,
        query_dim: usize,
    },

    /// A run cannot be indexed without recommendation text.
    #[error("recommendation text is empty; nothing to index")]
    EmptyRecommendations,

    /// JSON rendering of the analysis failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether the failure came from the embedding model being unreachable.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, RagError::Embedding(e) if e.is_unavailable())
    }
}
