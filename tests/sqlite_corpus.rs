//! Import into a temporary SQLite corpus and retrieve from it.

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{at_similarity, FixedEmbedder};
use compliance_harness::config::Config;
use compliance_harness::import::{import_chunks, import_file};
use compliance_harness::service::RetrievalService;
use compliance_harness::sqlite_store::{SqliteCorpus, SqliteManager};
use compliance_harness::{db, migrate};
use compliance_harness_core::embedding::DisabledProvider;
use compliance_harness_core::error::StoreError;
use compliance_harness_core::models::{DocType, DocumentChunk};
use compliance_harness_core::store::{CorpusStore, StoreFilter};

fn temp_config() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::with_db(tmp.path().join("data").join("corpus.sqlite"));
    config.retrieval.retry_backoff_ms = 5;
    (tmp, config)
}

fn jsonl_line(source: &str, page: u32, doc_type: &str, priority: i32, content: &str, sim: f32) -> String {
    serde_json::json!({
        "source": source,
        "page": page,
        "content": content,
        "doc_type": doc_type,
        "priority": priority,
        "embedding": at_similarity(sim),
    })
    .to_string()
}

fn write_fixture(tmp: &TempDir) -> std::path::PathBuf {
    let lines = [
        jsonl_line(
            "E2/AS1",
            90,
            "acceptable_solution_current",
            90,
            "Clause 9.1.3 apron flashing cover shall be a minimum of 150 mm",
            0.80,
        ),
        jsonl_line(
            "NZ Metal Roofing",
            40,
            "industry_code_of_practice",
            75,
            "apron flashing cover recommendations",
            0.84,
        ),
        // Metadata-light row: only the required fields.
        r#"{"source": "Site Notes", "page": 2, "content": "apron flashing photos"}"#.to_string(),
        "{ not json".to_string(),
        // Three dimensions against a two-dimensional corpus.
        r#"{"source": "Bad Dims", "page": 1, "content": "apron", "embedding": [0.1, 0.2, 0.3]}"#
            .to_string(),
    ];
    let path = tmp.path().join("chunks.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[tokio::test]
async fn import_counts_rows_and_rejects_bad_ones() {
    let (tmp, config) = temp_config();
    let path = write_fixture(&tmp);

    let stats = import_file(&config, &path).await.unwrap();
    assert_eq!(stats.imported, 3);
    assert_eq!(stats.embedded, 2);
    assert_eq!(stats.rejected_dims, 1);
    assert_eq!(stats.malformed, 1);

    let mut store = SqliteCorpus::open(&db::connect_options(&config).unwrap())
        .await
        .unwrap();
    assert_eq!(store.dims(), Some(2));

    let notes = store.exact_match("Site Notes", 2).await.unwrap().unwrap();
    assert_eq!(notes.doc_type, DocType::Unclassified);
    assert!(notes.embedding.is_empty());
    assert_eq!(notes.snippet, "apron flashing photos");
    assert!(store.exact_match("Site Notes", 3).await.unwrap().is_none());
}

#[tokio::test]
async fn import_is_append_only_and_enforces_dims_across_runs() {
    let (_tmp, config) = temp_config();
    migrate::run_migrations(&config).await.unwrap();
    // Running migrations twice is harmless.
    migrate::run_migrations(&config).await.unwrap();

    let pool = db::connect(&config).await.unwrap();
    let mut first = DocumentChunk::new("B1/AS1", 3, "bracing units");
    first.embedding = vec![1.0, 0.0];
    let stats = import_chunks(&pool, vec![first.clone()]).await.unwrap();
    assert_eq!(stats.imported, 1);

    let mut wider = DocumentChunk::new("B1/AS1", 4, "bracing lines");
    wider.embedding = vec![1.0, 0.0, 0.0];
    let stats = import_chunks(&pool, vec![first, wider]).await.unwrap();
    assert_eq!(stats.imported, 1);
    assert_eq!(stats.rejected_dims, 1);

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 2);
    pool.close().await;
}

#[tokio::test]
async fn vector_search_checks_dimension() {
    let (tmp, config) = temp_config();
    import_file(&config, &write_fixture(&tmp)).await.unwrap();

    let mut store = SqliteCorpus::open(&db::connect_options(&config).unwrap())
        .await
        .unwrap();
    let err = store
        .nearest_neighbors(&[1.0, 0.0, 0.0], &StoreFilter::default(), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DimensionMismatch { expected: 2, actual: 3 }));

    let hits = store
        .nearest_neighbors(&[1.0, 0.0], &StoreFilter::default(), 5)
        .await
        .unwrap();
    let sources: Vec<&str> = hits.iter().map(|c| c.chunk.source.as_str()).collect();
    assert_eq!(sources, vec!["NZ Metal Roofing", "E2/AS1"]);

    let only_as = StoreFilter {
        doc_types: Some(vec![DocType::AcceptableSolutionCurrent]),
        exclude_expired: true,
    };
    let hits = store.nearest_neighbors(&[1.0, 0.0], &only_as, 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.source, "E2/AS1");
}

#[tokio::test]
async fn keyword_search_uses_fts_index() {
    let (tmp, config) = temp_config();
    import_file(&config, &write_fixture(&tmp)).await.unwrap();

    let mut store = SqliteCorpus::open(&db::connect_options(&config).unwrap())
        .await
        .unwrap();
    let hits = store
        .keyword_search(&["apron".into(), "minimum".into()], &StoreFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 3);
    let e2 = hits.iter().find(|c| c.chunk.source == "E2/AS1").unwrap();
    assert!((e2.similarity - 1.0).abs() < 1e-9);
    let notes = hits.iter().find(|c| c.chunk.source == "Site Notes").unwrap();
    assert!((notes.similarity - 0.5).abs() < 1e-9);

    assert!(store
        .keyword_search(&["bracing".into()], &StoreFilter::default(), 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn service_retrieves_from_sqlite() {
    let (tmp, config) = temp_config();
    import_file(&config, &write_fixture(&tmp)).await.unwrap();

    let manager = SqliteManager::new(db::connect_options(&config).unwrap());
    let svc = RetrievalService::new(config.clone(), manager, Arc::new(FixedEmbedder::unit()))
        .unwrap();
    svc.init().await.unwrap();

    let r = svc.retrieve("minimum apron flashing cover", 0, None).await.unwrap();
    assert!(!r.is_degraded(), "{:?}", r.degraded);
    assert_eq!(r.results[0].source, "E2/AS1");
    assert_eq!(r.citations[0].display_text, "E2/AS1 clause 9.1.3 (p.90)");

    let again = svc.retrieve("minimum apron flashing cover", 0, None).await.unwrap();
    assert!(again.cache_hit);
    svc.shutdown();

    // Keyword-only over the same file when embeddings are switched off.
    let manager = SqliteManager::new(db::connect_options(&config).unwrap());
    let svc = RetrievalService::new(config, manager, Arc::new(DisabledProvider)).unwrap();
    let r = svc.retrieve("minimum apron flashing cover", 0, None).await.unwrap();
    assert!(r.has_degradation("keyword_only"));
    assert_eq!(r.results[0].source, "E2/AS1");
}
