//! Run memory for adwise.
//!
//! Stores free-text documents (analysis JSON, recommendation text, run
//! summaries) together with one embedding vector per document, in SQLite.
//!
//! # Guarantees
//!
//! - Documents are append-only; only their embedding can be replaced.
//! - An embedding row is written whole inside a transaction, so readers never
//!   see a partial vector.
//! - Schema creation is idempotent (`PRAGMA user_version`).
//!
//! # Example
//!
//! ```no_run
//! use adwise_memory::{DocType, MemoryStore};
//! use chrono::NaiveDate;
//!
//! let store = MemoryStore::open("rag.sqlite")?;
//! store.configure_embeddings("hash-4", 4)?;
//! let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
//! let id = store.insert_document(DocType::RunSummary, "run_summary:2026-01-05", "RUN SUMMARY", date)?;
//! store.upsert_embedding(id, "hash-4", &[1.0, 0.0, 0.0, 0.0])?;
//! # Ok::<(), adwise_memory::MemoryError>(())
//! ```

pub mod error;
pub mod store;
pub mod types;
pub mod vector;

pub use error::{ConsistencyError, MemoryError, Result};
pub use store::{MemoryStore, StoreStats};
pub use types::{Candidate, DocType, Document, DocumentId, PendingDocument, StoredEmbedding};
