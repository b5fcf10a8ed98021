//! HTTP server.
//!
//! Exposes sync and search as JSON endpoints so agents can refresh and query
//! their memory without shelling out to the CLI.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/tools/sync` | Run a sync; body `{ "full": bool }` is optional |
//! | `POST` | `/tools/search` | Hybrid search |
//! | `GET`  | `/tools/status` | Index statistics |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `internal` (500). A failed sync is not
//! an HTTP error: it returns 200 with `"status": "failed"` in the report.
//!
//! Syncs are serialized behind one lock; searches run concurrently.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use memdex_core::sync::SyncReport;

use crate::config::Config;
use crate::ingest::sync_index;
use crate::search::{search_index, SearchOptions, SearchResponse};
use crate::stats::{index_status, StatusResponse};

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// Held for the duration of a sync.
    sync_lock: Arc<Mutex<()>>,
}

/// Build the router with all routes and CORS applied.
pub fn router(config: Config) -> Router {
    let state = AppState {
        config: Arc::new(config),
        sync_lock: Arc::new(Mutex::new(())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/tools/sync", post(handle_sync))
        .route("/tools/search", post(handle_search))
        .route("/tools/status", get(handle_status))
        .layer(cors)
        .with_state(state)
}

/// Bind to `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "memdex server listening");
    axum::serve(listener, app).await?;

    Ok(())
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

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

/// Parse an optional JSON body; an empty body yields `T::default()`.
fn parse_body<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /tools/sync ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncBody {
    full: bool,
}

async fn handle_sync(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SyncReport>, AppError> {
    let body: SyncBody = parse_body(&body)?;

    let _guard = state.sync_lock.lock().await;
    let report = sync_index(&state.config, body.full).await;
    info!(
        ok = report.is_ok(),
        indexed = report.indexed,
        deleted = report.deleted,
        "sync via http"
    );
    Ok(Json(report))
}

// ============ POST /tools/search ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchBody {
    query: String,
    max_results: Option<usize>,
    min_score: Option<f64>,
    source: Option<String>,
    explain: bool,
}

async fn handle_search(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SearchResponse>, AppError> {
    let body: SearchBody = parse_body(&body)?;
    if body.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if body.max_results == Some(0) {
        return Err(bad_request("max_results must be >= 1"));
    }

    let opts = SearchOptions {
        query: body.query,
        max_results: body.max_results,
        min_score: body.min_score,
        source: body.source,
        explain: body.explain,
    };
    let response = search_index(&state.config, &opts).await.map_err(internal)?;
    Ok(Json(response))
}

// ============ GET /tools/status ============

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let status = index_status(&state.config).await.map_err(internal)?;
    Ok(Json(status))
}
