//! Document insert and lookup.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::error::Result;
use crate::types::{DocType, Document, DocumentId};

use super::MemoryStore;

/// Storage format of `created_at`.
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

impl MemoryStore {
    /// Append a document and return its id.
    pub fn insert_document(
        &self,
        doc_type: DocType,
        source: &str,
        content: &str,
        created_at: NaiveDate,
    ) -> Result<DocumentId> {
        let conn = self.conn.lock();
        insert_document(&conn, doc_type, source, content, created_at)
    }

    /// Get a document by id.
    pub fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT id, doc_type, source, content, created_at
                 FROM rag_documents WHERE id = ?1",
                params![id.0],
                row_to_document,
            )
            .optional()?)
    }

    /// Number of stored documents.
    pub fn count_documents(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM rag_documents", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

pub(crate) fn insert_document(
    conn: &Connection,
    doc_type: DocType,
    source: &str,
    content: &str,
    created_at: NaiveDate,
) -> Result<DocumentId> {
    conn.execute(
        "INSERT INTO rag_documents (doc_type, source, content, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            doc_type.as_str(),
            source,
            content,
            created_at.format(DATE_FORMAT).to_string()
        ],
    )?;
    let id = DocumentId(conn.last_insert_rowid());
    debug!(doc_id = %id, doc_type = %doc_type, chars = content.len(), "document inserted");
    Ok(id)
}

pub(crate) fn document_exists(conn: &Connection, id: DocumentId) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM rag_documents WHERE id = ?1",
            params![id.0],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Map columns `id, doc_type, source, content, created_at` starting at 0.
pub(crate) fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let doc_type: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    Ok(Document {
        id: DocumentId(row.get(0)?),
        doc_type: doc_type
            .parse()
            .map_err(|e| conversion_error(1, Box::new(e)))?,
        source: row.get(2)?,
        content: row.get(3)?,
        created_at: NaiveDate::parse_from_str(&created_at, DATE_FORMAT)
            .map_err(|e| conversion_error(4, Box::new(e)))?,
    })
}

fn conversion_error(
    column: usize,
    err: Box<dyn std::error::Error + Send + Sync + 'static>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn test_insert_and_get_document() {
        let store = MemoryStore::open_in_memory().unwrap();
        let id = store
            .insert_document(
                DocType::Analysis,
                "analysis_output.json:2026-01-05",
                "{\"mode\":\"weekly\"}",
                date(5),
            )
            .unwrap();

        let doc = store.get_document(id).unwrap().unwrap();
        assert_eq!(doc.id, id);
        assert_eq!(doc.doc_type, DocType::Analysis);
        assert_eq!(doc.source, "analysis_output.json:2026-01-05");
        assert_eq!(doc.created_at, date(5));
        assert_eq!(store.count_documents().unwrap(), 1);
    }

    #[test]
    fn test_ids_are_increasing() {
        let store = MemoryStore::open_in_memory().unwrap();
        let a = store
            .insert_document(DocType::RunSummary, "s", "a", date(1))
            .unwrap();
        let b = store
            .insert_document(DocType::RunSummary, "s", "b", date(1))
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_get_missing_document() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(store.get_document(DocumentId(42)).unwrap().is_none());
    }

    #[test]
    fn test_documents_are_immutable() {
        let store = MemoryStore::open_in_memory().unwrap();
        let id = store
            .insert_document(DocType::Recommendations, "r", "original", date(2))
            .unwrap();

        let conn = store.conn.lock();
        let result = conn.execute(
            "UPDATE rag_documents SET content = 'changed' WHERE id = ?1",
            params![id.0],
        );
        assert!(result.is_err());
    }
}
