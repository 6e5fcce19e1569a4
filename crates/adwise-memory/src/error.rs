//! Error types for the memory crate.

use thiserror::Error;

use crate::types::DocumentId;

/// Errors that can occur in the memory crate.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A write would break a store invariant; the write was not applied.
    #[error("Store consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    /// Filesystem operation failed (creating the database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Violations of the document/embedding invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConsistencyError {
    /// Vector length differs from the configured dimensionality.
    #[error("embedding has {actual} dimensions, store is configured for {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector was produced by a different model than the configured one.
    #[error("embedding model '{actual}' does not match configured model '{expected}'")]
    ModelMismatch { expected: String, actual: String },

    /// Embedding references a document that does not exist.
    #[error("document {0} does not exist")]
    DocumentNotFound(DocumentId),

    /// Stored vector bytes do not match the recorded dimensionality.
    #[error("stored vector for document {doc_id} is {bytes} bytes, expected {dim} f32 values")]
    CorruptVector {
        doc_id: DocumentId,
        dim: i64,
        bytes: usize,
    },

    /// Stored embeddings were produced by another model or dimensionality.
    #[error(
        "{stale} stored embeddings do not match '{model}' ({dim} dims); re-index memory before switching models"
    )]
    StaleEmbeddings { model: String, dim: usize, stale: u64 },

    /// Vector is empty, non-finite or not unit length.
    #[error("invalid embedding values: {0}")]
    InvalidValues(String),
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
