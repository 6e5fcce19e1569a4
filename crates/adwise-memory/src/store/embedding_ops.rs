//! Embedding writes and candidate scans.

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, info, warn};

use crate::error::{ConsistencyError, MemoryError, Result};
use crate::types::{Candidate, DocType, Document, DocumentId, PendingDocument, StoredEmbedding};
use crate::vector::{decode_vector, encode_vector, validate_vector};

use super::document_ops::{document_exists, insert_document, row_to_document};
use super::{
    META_EMBEDDING_DIMENSIONS, META_EMBEDDING_MODEL, MemoryStore, configured_embeddings, set_meta,
};

impl MemoryStore {
    /// Record the embedding model and dimensionality that writes must match.
    ///
    /// Refused while stored embeddings were produced by a different model or
    /// dimensionality; [`replace_embeddings`](Self::replace_embeddings) is
    /// the explicit way to switch.
    pub fn configure_embeddings(&self, model: &str, dims: usize) -> Result<()> {
        check_embedding_config(model, dims)?;
        self.with_transaction(|conn| claim_embeddings(conn, model, dims))
    }

    /// Switch to `model`/`dims` and write the re-embedded vectors.
    ///
    /// The configuration change and every vector share one transaction.
    /// Documents not listed keep their old embedding and stay stale until
    /// they are re-embedded too.
    pub fn replace_embeddings(
        &self,
        model: &str,
        dims: usize,
        vectors: &[(DocumentId, Vec<f32>)],
    ) -> Result<()> {
        check_embedding_config(model, dims)?;
        self.with_transaction(|conn| {
            let (old_model, old_dims) = configured_embeddings(conn)?;
            if let (Some(m), Some(d)) = (old_model.as_deref(), old_dims)
                && (m != model || d != dims)
            {
                warn!(
                    "Embedding model changed from {} ({} dims) to {} ({} dims)",
                    m, d, model, dims
                );
            }
            set_meta(conn, META_EMBEDDING_MODEL, model)?;
            set_meta(conn, META_EMBEDDING_DIMENSIONS, &dims.to_string())?;

            for (doc_id, vector) in vectors {
                write_embedding(conn, *doc_id, model, vector)?;
            }
            info!(count = vectors.len(), model, dims, "Embeddings replaced");
            Ok(())
        })
    }

    /// Documents with no embedding, or one from another model or dimensionality.
    ///
    /// Ordered by id.
    pub fn documents_needing_embedding(&self, model: &str, dims: usize) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT d.id, d.doc_type, d.source, d.content, d.created_at
             FROM rag_documents d
             LEFT JOIN rag_embeddings e ON e.doc_id = d.id
             WHERE e.doc_id IS NULL OR e.model != ?1 OR e.dim != ?2
             ORDER BY d.id",
        )?;
        let rows = stmt.query_map(params![model, dims as i64], row_to_document)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(row?);
        }
        Ok(docs)
    }

    /// Attach `vector` to a document, replacing any previous embedding.
    ///
    /// The existence check and the write share one transaction, so the
    /// embedding row is either fully written or untouched.
    pub fn upsert_embedding(&self, doc_id: DocumentId, model: &str, vector: &[f32]) -> Result<()> {
        self.with_transaction(|conn| write_embedding(conn, doc_id, model, vector))
    }

    /// Insert documents and their embeddings in a single transaction.
    ///
    /// Either every pair is written or none is.
    pub fn insert_documents_with_embeddings(
        &self,
        pending: &[PendingDocument],
    ) -> Result<Vec<DocumentId>> {
        self.with_transaction(|conn| insert_pending(conn, pending))
    }

    /// Claim `model`/`dims` and insert documents with their embeddings.
    ///
    /// Configuration and inserts share one transaction: a rejected batch
    /// leaves both the documents and the configured model untouched.
    pub fn index_documents(
        &self,
        model: &str,
        dims: usize,
        pending: &[PendingDocument],
    ) -> Result<Vec<DocumentId>> {
        check_embedding_config(model, dims)?;
        self.with_transaction(|conn| {
            claim_embeddings(conn, model, dims)?;
            insert_pending(conn, pending)
        })
    }

    /// Get the embedding attached to a document.
    pub fn get_embedding(&self, doc_id: DocumentId) -> Result<Option<StoredEmbedding>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT model, dim, vector FROM rag_embeddings WHERE doc_id = ?1",
                params![doc_id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((model, dim, bytes)) => {
                let vector = decode_vector(doc_id, dim, &bytes)?;
                Ok(Some(StoredEmbedding {
                    doc_id,
                    model,
                    dim: vector.len(),
                    vector,
                }))
            }
            None => Ok(None),
        }
    }

    /// Number of stored embeddings.
    pub fn count_embeddings(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM rag_embeddings", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// The most recent embedded documents of the given types.
    ///
    /// Ordered by `created_at` descending, then id descending, so later
    /// inserts on the same day come first. Documents without an embedding
    /// are skipped. An empty `doc_types` selects nothing.
    pub fn recent_candidates(&self, doc_types: &[DocType], limit: usize) -> Result<Vec<Candidate>> {
        if doc_types.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; doc_types.len()].join(", ");
        let sql = format!(
            "SELECT d.id, d.doc_type, d.source, d.content, d.created_at,
                    e.model, e.dim, e.vector
             FROM rag_documents d
             JOIN rag_embeddings e ON e.doc_id = d.id
             WHERE d.doc_type IN ({placeholders})
             ORDER BY d.created_at DESC, d.id DESC
             LIMIT {limit}"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(doc_types.iter().map(|t| t.as_str())), |row| {
            Ok((
                row_to_document(row)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Vec<u8>>(7)?,
            ))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (document, model, dim, bytes) = row?;
            let vector = decode_vector(document.id, dim, &bytes)?;
            candidates.push(Candidate {
                embedding: StoredEmbedding {
                    doc_id: document.id,
                    model,
                    dim: vector.len(),
                    vector,
                },
                document,
            });
        }

        debug!(
            count = candidates.len(),
            limit, "loaded retrieval candidates"
        );
        Ok(candidates)
    }
}

fn check_embedding_config(model: &str, dims: usize) -> Result<()> {
    if model.is_empty() {
        return Err(MemoryError::InvalidData(
            "embedding model id must not be empty".to_string(),
        ));
    }
    if dims == 0 {
        return Err(MemoryError::InvalidData(
            "embedding dimensions must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Record `model`/`dims` unless stored embeddings disagree with them.
fn claim_embeddings(conn: &Connection, model: &str, dims: usize) -> Result<()> {
    let (old_model, old_dims) = configured_embeddings(conn)?;
    if old_model.as_deref() == Some(model) && old_dims == Some(dims) {
        return Ok(());
    }

    let stale: i64 = conn.query_row(
        "SELECT COUNT(*) FROM rag_embeddings WHERE model != ?1 OR dim != ?2",
        params![model, dims as i64],
        |row| row.get(0),
    )?;
    if stale > 0 {
        return Err(ConsistencyError::StaleEmbeddings {
            model: model.to_string(),
            dim: dims,
            stale: stale as u64,
        }
        .into());
    }

    info!("Embedding model configured: {} ({} dims)", model, dims);
    set_meta(conn, META_EMBEDDING_MODEL, model)?;
    set_meta(conn, META_EMBEDDING_DIMENSIONS, &dims.to_string())?;
    Ok(())
}

fn insert_pending(conn: &Connection, pending: &[PendingDocument]) -> Result<Vec<DocumentId>> {
    let mut ids = Vec::with_capacity(pending.len());
    for doc in pending {
        let id = insert_document(conn, doc.doc_type, &doc.source, &doc.content, doc.created_at)?;
        write_embedding(conn, id, &doc.model, &doc.vector)?;
        ids.push(id);
    }
    Ok(ids)
}

/// Validate and write one embedding inside an open transaction.
fn write_embedding(
    conn: &Connection,
    doc_id: DocumentId,
    model: &str,
    vector: &[f32],
) -> Result<()> {
    if !document_exists(conn, doc_id)? {
        return Err(ConsistencyError::DocumentNotFound(doc_id).into());
    }

    let (configured_model, configured_dims) = configured_embeddings(conn)?;
    if let Some(expected) = configured_model
        && expected != model
    {
        return Err(ConsistencyError::ModelMismatch {
            expected,
            actual: model.to_string(),
        }
        .into());
    }
    if let Some(expected) = configured_dims
        && expected != vector.len()
    {
        return Err(ConsistencyError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }
        .into());
    }
    validate_vector(vector)?;

    conn.execute(
        "INSERT INTO rag_embeddings (doc_id, model, dim, vector)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(doc_id) DO UPDATE SET
             model = excluded.model,
             dim = excluded.dim,
             vector = excluded.vector",
        params![doc_id.0, model, vector.len() as i64, encode_vector(vector)],
    )?;

    debug!(doc_id = %doc_id, model, dim = vector.len(), "embedding written");
    Ok(())
}
