//! HTTP surface for the document pipeline.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /` – Liveness probe.
//! - `POST /documents` – Admit a file already on disk into the pipeline;
//!   returns the run id immediately while processing continues in the
//!   background.
//! - `POST /documents/upload` – Store an uploaded file, then admit it.
//! - `GET /documents/{run_id}` – Inspect a run: lifecycle state, coarse
//!   status, attempts, failure message, and the final summary.
//! - `POST /documents/{run_id}/cancel` – Request cancellation of a live run.
//! - `POST /search` – Hybrid search over indexed chunks.
//! - `GET /metrics` – Observe ingestion counters.

use crate::config::get_config;
use crate::metrics::IngestMetrics;
use crate::pipeline::{Orchestrator, PipelineError, RunState, RunSummary, StageAttempts};
use crate::search::{HybridSearchService, MAX_LIMIT, SearchError, SearchQuery, SearchResult};
use crate::storage::{StorageError, save_upload};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Shared state behind every handler.
pub struct AppState {
    /// Pipeline orchestrator accepting and tracking runs.
    pub orchestrator: Arc<Orchestrator>,
    /// Hybrid search service.
    pub search: Arc<HybridSearchService>,
    /// Ingestion counters.
    pub metrics: Arc<IngestMetrics>,
}

/// Build the HTTP router exposing the pipeline and search surface.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/documents", post(start_document))
        .route("/documents/upload", post(upload_document))
        .route("/documents/:run_id", get(get_run))
        .route("/documents/:run_id/cancel", post(cancel_run))
        .route("/search", post(search))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "message": "Document pipeline is running" }))
}

/// Request body for `POST /documents`.
#[derive(Deserialize)]
struct StartRunRequest {
    /// Path of a file already present on local disk.
    file_path: String,
}

/// Success response for run-starting endpoints.
#[derive(Serialize)]
struct StartRunResponse {
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_path: Option<String>,
}

/// Admit a document already on disk into the pipeline.
async fn start_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    let run_id = state.orchestrator.start_run(&request.file_path).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            run_id,
            file_path: None,
        }),
    ))
}

/// Query parameters for `POST /documents/upload`.
#[derive(Deserialize)]
struct UploadParams {
    /// Original filename; its extension decides the document kind.
    file_name: String,
}

/// Store uploaded bytes and admit the stored file into the pipeline.
async fn upload_document(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    let storage_root = std::path::Path::new(&get_config().storage_path).to_path_buf();
    let path = save_upload(&storage_root, &params.file_name, &body).await?;
    let file_path = path.to_string_lossy().into_owned();
    let run_id = state.orchestrator.start_run(&file_path).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartRunResponse {
            run_id,
            file_path: Some(file_path),
        }),
    ))
}

/// Response body for `GET /documents/{run_id}`.
#[derive(Serialize)]
struct RunStatusResponse {
    run_id: String,
    doc_id: String,
    state: RunState,
    status: &'static str,
    attempts: StageAttempts,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<RunSummary>,
}

/// Inspect the current state of a run.
async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunStatusResponse>, AppError> {
    let run = state
        .orchestrator
        .run_snapshot(&run_id)
        .await
        .ok_or(AppError::RunNotFound)?;
    Ok(Json(RunStatusResponse {
        run_id: run.run_id,
        doc_id: run.document.id,
        state: run.state,
        status: run.state.status(),
        attempts: run.attempts,
        error: run.error,
        summary: run.summary,
    }))
}

/// Request cancellation of a live run.
async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.orchestrator.cancel(&run_id).await {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(AppError::RunNotFound)
    }
}

/// Response body for `POST /search`.
#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

/// Run a hybrid search over indexed chunks.
async fn search(
    State(state): State<Arc<AppState>>,
    Json(query): Json<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    validate_query(&query)?;
    let results = state.search.search(&query).await?;
    Ok(Json(SearchResponse { results }))
}

fn validate_query(query: &SearchQuery) -> Result<(), AppError> {
    if query.limit == 0 || query.limit > MAX_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }
    if !(0.0..=1.0).contains(&query.similarity_threshold) {
        return Err(AppError::Validation(
            "similarity_threshold must be between 0.0 and 1.0".into(),
        ));
    }
    if !(0.0..=1.0).contains(&query.hybrid_alpha) {
        return Err(AppError::Validation(
            "hybrid_alpha must be between 0.0 and 1.0".into(),
        ));
    }
    Ok(())
}

/// Return ingestion counters useful for observability dashboards.
async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

enum AppError {
    RunNotFound,
    Validation(String),
    Pipeline(PipelineError),
    Search(SearchError),
    Storage(StorageError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::RunNotFound => (StatusCode::NOT_FOUND, "Run not found".to_string()),
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message),
            Self::Pipeline(PipelineError::MissingFile(path)) => {
                (StatusCode::NOT_FOUND, format!("File not found: {path}"))
            }
            Self::Pipeline(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            Self::Search(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            Self::Storage(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        }
        .into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

impl From<SearchError> for AppError {
    fn from(inner: SearchError) -> Self {
        Self::Search(inner)
    }
}

impl From<StorageError> for AppError {
    fn from(inner: StorageError) -> Self {
        Self::Storage(inner)
    }
}
