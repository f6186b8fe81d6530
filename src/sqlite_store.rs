//! SQLite-backed [`CorpusStore`].
//!
//! Each [`SqliteCorpus`] owns one `SqliteConnection`; the service's
//! [`ConnectionPool`](crate::pool::ConnectionPool) hands them out through
//! [`SqliteManager`]. Vector search is brute-force cosine similarity over
//! the `embedding` BLOBs, keyword search goes through the `chunks_fts`
//! FTS5 index.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Row};

use compliance_harness_core::embedding::{blob_to_vec, cosine_similarity};
use compliance_harness_core::error::StoreError;
use compliance_harness_core::lexicon::{contains_term, normalize};
use compliance_harness_core::models::{DocStatus, DocType, DocumentChunk};
use compliance_harness_core::scorer::Candidate;
use compliance_harness_core::store::{CorpusStore, StoreFilter};

use crate::pool::ConnectionManager;

const CHUNK_COLUMNS: &str = "c.id, c.source, c.page, c.content, c.snippet, c.section, c.clause, \
     c.doc_type, c.status, c.priority, c.trade, c.phase, c.version_label, c.embedding, \
     c.created_at, c.updated_at";

/// Map a driver error onto the store taxonomy. Busy/locked databases and
/// I/O failures are worth a retry; everything else is not.
pub fn store_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::transient(e.to_string()),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // SQLITE_BUSY, SQLITE_LOCKED
            Some("5") | Some("6") => StoreError::transient(e.to_string()),
            _ => StoreError::fatal(e.to_string()),
        },
        _ => StoreError::fatal(e.to_string()),
    }
}

pub fn chunk_from_row(row: &SqliteRow) -> Result<DocumentChunk, sqlx::Error> {
    let page: i64 = row.try_get("page")?;
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    let doc_type: String = row.try_get("doc_type")?;
    let status: String = row.try_get("status")?;
    Ok(DocumentChunk {
        source: row.try_get("source")?,
        page: u32::try_from(page).unwrap_or(0),
        content: row.try_get("content")?,
        snippet: row.try_get("snippet")?,
        section: row.try_get("section")?,
        clause: row.try_get("clause")?,
        embedding: embedding.map(|b| blob_to_vec(&b)).unwrap_or_default(),
        doc_type: DocType::from(doc_type),
        status: DocStatus::from(status),
        priority: row.try_get::<i64, _>("priority")? as i32,
        trade: row.try_get("trade")?,
        phase: row.try_get("phase")?,
        version_label: row.try_get("version_label")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// One pooled connection to the corpus database.
pub struct SqliteCorpus {
    conn: SqliteConnection,
    dims: Option<usize>,
}

impl SqliteCorpus {
    pub async fn open(options: &SqliteConnectOptions) -> Result<Self, StoreError> {
        let mut conn = options.connect().await.map_err(store_error)?;
        let dims = corpus_dims(&mut conn).await?;
        Ok(Self { conn, dims })
    }

    /// Embedding dimension recorded at import time.
    pub fn dims(&self) -> Option<usize> {
        self.dims
    }
}

/// Dimension stored in `corpus_meta`, if the corpus has embeddings yet.
pub async fn corpus_dims(conn: &mut SqliteConnection) -> Result<Option<usize>, StoreError> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM corpus_meta WHERE key = 'embedding_dims'")
            .fetch_optional(&mut *conn)
            .await
            .map_err(store_error)?;
    Ok(value.and_then(|v| v.parse().ok()))
}

/// FTS5 query matching any of `terms`, each quoted as a phrase.
fn fts_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[async_trait]
impl CorpusStore for SqliteCorpus {
    async fn nearest_neighbors(
        &mut self,
        vector: &[f32],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        if let Some(expected) = self.dims {
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let sql = format!(
            "SELECT {} FROM chunks c WHERE c.embedding IS NOT NULL",
            CHUNK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(store_error)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = chunk_from_row(row).map_err(store_error)?;
            if !filter.admits(&chunk) {
                continue;
            }
            let similarity = cosine_similarity(vector, &chunk.embedding) as f64;
            candidates.push(Candidate { chunk, similarity });
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk.source.cmp(&b.chunk.source))
                .then(a.chunk.page.cmp(&b.chunk.page))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn keyword_search(
        &mut self,
        terms: &[String],
        filter: &StoreFilter,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError> {
        let terms: Vec<String> = terms
            .iter()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}
            FROM chunks_fts f
            JOIN chunks c ON c.id = f.chunk_id
            WHERE chunks_fts MATCH ?
            ORDER BY f.rank
            LIMIT ?
            "#,
            CHUNK_COLUMNS
        );
        // Over-fetch; the filter runs after the FTS ranking.
        let rows = sqlx::query(&sql)
            .bind(fts_query(&terms))
            .bind((limit * 4) as i64)
            .fetch_all(&mut self.conn)
            .await
            .map_err(store_error)?;

        let mut candidates = Vec::new();
        for row in &rows {
            let chunk = chunk_from_row(row).map_err(store_error)?;
            if !filter.admits(&chunk) {
                continue;
            }
            let text = normalize(&chunk.content);
            let hits = terms.iter().filter(|t| contains_term(&text, t)).count();
            candidates.push(Candidate {
                similarity: hits as f64 / terms.len() as f64,
                chunk,
            });
            if candidates.len() == limit {
                break;
            }
        }
        Ok(candidates)
    }

    async fn exact_match(
        &mut self,
        source: &str,
        page: u32,
    ) -> Result<Option<DocumentChunk>, StoreError> {
        let sql = format!(
            "SELECT {} FROM chunks c WHERE c.source = ? AND c.page = ? ORDER BY c.id LIMIT 1",
            CHUNK_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(source)
            .bind(page as i64)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(store_error)?;
        row.as_ref()
            .map(chunk_from_row)
            .transpose()
            .map_err(store_error)
    }
}

/// Opens [`SqliteCorpus`] connections for the pool.
pub struct SqliteManager {
    options: SqliteConnectOptions,
}

impl SqliteManager {
    pub fn new(options: SqliteConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ConnectionManager for SqliteManager {
    type Connection = SqliteCorpus;

    async fn connect(&self) -> Result<Self::Connection, StoreError> {
        SqliteCorpus::open(&self.options).await
    }
}
