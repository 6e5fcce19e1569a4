//! Memory store implementation using SQLite.
//!
//! Documents and their embeddings live in two tables:
//!
//! - `rag_documents(id, doc_type, source, content, created_at)`: append-only
//! - `rag_embeddings(doc_id, model, dim, vector)`: at most one row per document
//!
//! plus a `meta` key/value table recording the configured embedding model.

mod document_ops;
mod embedding_ops;

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{MemoryError, Result};
use crate::types::DocType;

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Meta key holding the configured embedding model.
pub(crate) const META_EMBEDDING_MODEL: &str = "embedding.model";

/// Meta key holding the configured embedding dimensionality.
pub(crate) const META_EMBEDDING_DIMENSIONS: &str = "embedding.dimensions";

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// Document and embedding store backed by SQLite.
///
/// Uses WAL mode so readers are not blocked by the indexer's write
/// transaction.
pub struct MemoryStore {
    /// The SQLite connection.
    pub(crate) conn: Mutex<Connection>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

/// Counts and configuration reported by [`MemoryStore::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Schema version of the database.
    pub schema_version: i32,
    /// Total documents.
    pub documents: u64,
    /// Documents per type, in [`DocType::ALL`] order.
    pub documents_by_type: Vec<(DocType, u64)>,
    /// Total embeddings.
    pub embeddings: u64,
    /// Configured embedding model, if any.
    pub embedding_model: Option<String>,
    /// Configured embedding dimensionality, if any.
    pub embedding_dimensions: Option<usize>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Open or create a memory store at the given path.
    ///
    /// Creates the database file and initializes the schema if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        info!("Memory store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        debug!("In-memory store created");
        Ok(store)
    }

    /// Apply pragmas and create the schema. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        create_schema(&conn)
    }
}

/// Create the database schema.
fn create_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current_version >= SCHEMA_VERSION {
        debug!("Schema up to date (version {})", current_version);
        return Ok(());
    }

    info!(
        "Migrating schema from version {} to {}",
        current_version, SCHEMA_VERSION
    );

    conn.execute_batch(
        r#"
        -- Documents: append-only run memory
        CREATE TABLE IF NOT EXISTS rag_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_type TEXT NOT NULL
                CHECK (doc_type IN ('analysis', 'recommendations', 'run_summary')),
            source TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- Recency scan per type
        CREATE INDEX IF NOT EXISTS idx_rag_documents_recent
            ON rag_documents(doc_type, created_at DESC, id DESC);

        CREATE TRIGGER IF NOT EXISTS rag_documents_no_update
            BEFORE UPDATE ON rag_documents
            BEGIN
                SELECT RAISE(ABORT, 'rag_documents rows are immutable');
            END;

        -- Embeddings: one per document, replaced on re-embed
        CREATE TABLE IF NOT EXISTS rag_embeddings (
            doc_id INTEGER PRIMARY KEY REFERENCES rag_documents(id),
            model TEXT NOT NULL,
            dim INTEGER NOT NULL CHECK (dim > 0),
            vector BLOB NOT NULL
        );

        -- Schema metadata
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!("Schema created (version {})", SCHEMA_VERSION);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Execute a function within a transaction.
    ///
    /// All operations within the closure are executed atomically.
    /// If the closure returns an error, all changes are rolled back.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        // Dropping an uncommitted transaction rolls it back
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Operations
// ─────────────────────────────────────────────────────────────────────────────

impl MemoryStore {
    /// Get a metadata value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        get_meta(&conn, key)
    }

    /// Set a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        set_meta(&conn, key, value)
    }

    /// Collect document/embedding counts and embedding configuration.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock();

        let schema_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        let documents = count(&conn, "SELECT COUNT(*) FROM rag_documents")?;
        let embeddings = count(&conn, "SELECT COUNT(*) FROM rag_embeddings")?;

        let mut documents_by_type = Vec::with_capacity(DocType::ALL.len());
        for doc_type in DocType::ALL {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM rag_documents WHERE doc_type = ?1",
                params![doc_type.as_str()],
                |row| row.get(0),
            )?;
            documents_by_type.push((doc_type, n as u64));
        }

        let (embedding_model, embedding_dimensions) = configured_embeddings(&conn)?;

        Ok(StoreStats {
            schema_version,
            documents,
            documents_by_type,
            embeddings,
            embedding_model,
            embedding_dimensions,
        })
    }
}

pub(crate) fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

pub(crate) fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// The `(model, dimensions)` recorded by `configure_embeddings`, if any.
pub(crate) fn configured_embeddings(conn: &Connection) -> Result<(Option<String>, Option<usize>)> {
    let model = get_meta(conn, META_EMBEDDING_MODEL)?;
    let dims = match get_meta(conn, META_EMBEDDING_DIMENSIONS)? {
        Some(raw) => Some(raw.parse::<usize>().map_err(|_| {
            MemoryError::InvalidData(format!("meta {META_EMBEDDING_DIMENSIONS} is not a number: {raw}"))
        })?),
        None => None,
    };
    Ok((model, dims))
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as u64)
}
