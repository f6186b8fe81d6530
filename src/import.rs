//! JSONL corpus import.
//!
//! The ingestion pipeline upstream produces one [`DocumentChunk`] per line.
//! Import is append-only: rows are inserted, never updated. Metadata may be
//! partial; missing fields take their serde defaults. Every embedded row must
//! match the corpus dimension, which the first embedded row fixes.

use anyhow::{Context, Result};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use compliance_harness_core::embedding::vec_to_blob;
use compliance_harness_core::models::DocumentChunk;

use crate::config::Config;
use crate::db;
use crate::migrate::migrate_pool;

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub imported: usize,
    pub embedded: usize,
    /// Rows whose embedding dimension differed from the corpus.
    pub rejected_dims: usize,
    /// Lines that did not parse as a chunk.
    pub malformed: usize,
}

/// Import a JSONL file and print a summary.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let stats = import_file(config, path).await?;
    println!("import {}", path.display());
    println!("  imported: {}", stats.imported);
    println!("  embedded: {}", stats.embedded);
    if stats.rejected_dims > 0 {
        println!("  rejected (dimension mismatch): {}", stats.rejected_dims);
    }
    if stats.malformed > 0 {
        println!("  malformed lines: {}", stats.malformed);
    }
    Ok(())
}

pub async fn import_file(config: &Config, path: &Path) -> Result<ImportStats> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open import file: {}", path.display()))?;

    let mut chunks = Vec::new();
    let mut malformed = 0;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DocumentChunk>(&line) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping malformed chunk");
                malformed += 1;
            }
        }
    }

    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    let mut stats = import_chunks(&pool, chunks).await?;
    stats.malformed = malformed;
    pool.close().await;

    info!(
        path = %path.display(),
        imported = stats.imported,
        rejected = stats.rejected_dims,
        malformed = stats.malformed,
        "import finished"
    );
    Ok(stats)
}

/// Append chunks in one transaction.
pub async fn import_chunks(pool: &SqlitePool, chunks: Vec<DocumentChunk>) -> Result<ImportStats> {
    let mut tx = pool.begin().await?;
    let mut dims = stored_dims(&mut tx).await?;
    let mut stats = ImportStats::default();
    let now = chrono::Utc::now().timestamp();

    for chunk in chunks {
        if !chunk.embedding.is_empty() {
            match dims {
                Some(d) if d != chunk.embedding.len() => {
                    warn!(
                        source = %chunk.source,
                        page = chunk.page,
                        expected = d,
                        actual = chunk.embedding.len(),
                        "rejecting chunk with mismatched embedding dimension"
                    );
                    stats.rejected_dims += 1;
                    continue;
                }
                Some(_) => {}
                None => {
                    let d = chunk.embedding.len();
                    sqlx::query(
                        "INSERT INTO corpus_meta (key, value) VALUES ('embedding_dims', ?)",
                    )
                    .bind(d.to_string())
                    .execute(&mut *tx)
                    .await?;
                    dims = Some(d);
                }
            }
            stats.embedded += 1;
        }

        insert_chunk(&mut tx, &chunk, now).await?;
        stats.imported += 1;
    }

    tx.commit().await?;
    Ok(stats)
}

async fn stored_dims(tx: &mut Transaction<'_, Sqlite>) -> Result<Option<usize>> {
    let value: Option<String> =
        sqlx::query_scalar("SELECT value FROM corpus_meta WHERE key = 'embedding_dims'")
            .fetch_optional(&mut **tx)
            .await?;
    Ok(value.and_then(|v| v.parse().ok()))
}

async fn insert_chunk(
    tx: &mut Transaction<'_, Sqlite>,
    chunk: &DocumentChunk,
    now: i64,
) -> Result<()> {
    let created_at = if chunk.created_at > 0 { chunk.created_at } else { now };
    let updated_at = if chunk.updated_at > 0 { chunk.updated_at } else { created_at };
    let embedding = (!chunk.embedding.is_empty()).then(|| vec_to_blob(&chunk.embedding));

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO chunks (source, page, content, snippet, section, clause, doc_type, status,
                            priority, trade, phase, version_label, embedding, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&chunk.source)
    .bind(chunk.page as i64)
    .bind(&chunk.content)
    .bind(chunk.display_snippet())
    .bind(&chunk.section)
    .bind(&chunk.clause)
    .bind(chunk.doc_type.as_str())
    .bind(chunk.status.as_str())
    .bind(chunk.priority as i64)
    .bind(&chunk.trade)
    .bind(&chunk.phase)
    .bind(&chunk.version_label)
    .bind(embedding)
    .bind(created_at)
    .bind(updated_at)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query("INSERT INTO chunks_fts (chunk_id, content) VALUES (?, ?)")
        .bind(id)
        .bind(&chunk.content)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
