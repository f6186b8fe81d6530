//! HTTP server over the retrieval service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/retrieve` | Ranked passages and citations for a question |
//! | `POST` | `/classify` | Classified intent for a question |
//! | `GET`  | `/health` | Status, version and pool counters |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embeddings_unavailable` (503),
//! `pool_exhausted` (503), `unavailable` (503), `store_error` (500),
//! `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use compliance_harness_core::error::RetrievalError;
use compliance_harness_core::models::{IntentCategory, QueryIntent, RetrievalResponse};

use crate::config::Config;
use crate::db;
use crate::embedding::create_provider;
use crate::pool::{ConnectionManager, PoolStats};
use crate::service::{RetrievalService, RetrieveOptions};
use crate::sqlite_store::SqliteManager;

/// Starts the HTTP server on `[server].bind`.
///
/// Runs until Ctrl-C, then shuts the service down.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let embedder = create_provider(&config.embedding)?;
    let manager = SqliteManager::new(db::connect_options(config)?);
    let service = Arc::new(RetrievalService::new(config.clone(), manager, embedder)?);
    service.init().await?;

    let app = router(Arc::clone(&service));

    println!("compliance harness listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    service.shutdown();
    Ok(())
}

/// Routes over a shared service.
pub fn router<M: ConnectionManager>(service: Arc<RetrievalService<M>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/retrieve", post(handle_retrieve::<M>))
        .route("/classify", post(handle_classify::<M>))
        .route("/health", get(handle_health::<M>))
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        let message = err.to_string();
        match err {
            RetrievalError::EmptyQuery => bad_request(message),
            RetrievalError::EmbeddingUnavailable(_) => {
                app_error(StatusCode::SERVICE_UNAVAILABLE, "embeddings_unavailable", message)
            }
            RetrievalError::PoolExhausted { .. } => {
                app_error(StatusCode::SERVICE_UNAVAILABLE, "pool_exhausted", message)
            }
            RetrievalError::PoolClosed => {
                app_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
            }
            RetrievalError::Store(_) => {
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", message)
            }
            RetrievalError::Configuration(_) => {
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

// ============ POST /retrieve ============

#[derive(Debug, Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(default)]
    k: usize,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    explain: bool,
}

async fn handle_retrieve<M: ConnectionManager>(
    State(service): State<Arc<RetrievalService<M>>>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrievalResponse>, AppError> {
    let intent = req
        .intent
        .as_deref()
        .map(str::parse::<IntentCategory>)
        .transpose()
        .map_err(bad_request)?;

    let options = RetrieveOptions {
        k: req.k,
        intent,
        explain: req.explain,
    };
    let response = service.retrieve_with(&req.query, &options).await?;
    Ok(Json(response))
}

// ============ POST /classify ============

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    query: String,
}

async fn handle_classify<M: ConnectionManager>(
    State(service): State<Arc<RetrievalService<M>>>,
    Json(req): Json<ClassifyRequest>,
) -> Result<Json<QueryIntent>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    Ok(Json(service.classify(&req.query)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    pool: PoolStats,
    cached: u64,
}

async fn handle_health<M: ConnectionManager>(
    State(service): State<Arc<RetrievalService<M>>>,
) -> Json<HealthResponse> {
    let status = if service.pool().is_closed() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pool: service.stats(),
        cached: service.cached_entries(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use compliance_harness_core::error::StoreError;
    use std::time::Duration;

    #[test]
    fn test_error_mapping() {
        let e = AppError::from(RetrievalError::EmptyQuery);
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "bad_request");

        let e = AppError::from(RetrievalError::PoolExhausted {
            waited: Duration::from_millis(5),
        });
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.code, "pool_exhausted");

        let e = AppError::from(RetrievalError::Store(StoreError::fatal("bad row")));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.message.contains("bad row"));
    }

    #[test]
    fn test_retrieve_request_defaults() {
        let req: RetrieveRequest = serde_json::from_str(r#"{"query": "apron cover"}"#).unwrap();
        assert_eq!(req.k, 0);
        assert!(req.intent.is_none());
        assert!(!req.explain);
    }
}
