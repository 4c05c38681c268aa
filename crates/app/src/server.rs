use crate::DynEmbedder;
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use docanswer_core::{AnswerPayload, DocumentFormat, ErrorKind, Pipeline, PipelineError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub type SharedPipeline = Arc<RwLock<Pipeline<DynEmbedder>>>;

#[derive(Clone)]
pub struct AppState {
    pipeline: SharedPipeline,
    data_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(pipeline: Pipeline<DynEmbedder>, data_dir: PathBuf) -> Self {
        Self {
            pipeline: Arc::new(RwLock::new(pipeline)),
            data_dir: Arc::new(data_dir),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadRequest {
    file_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct UploadResponse {
    message: String,
    total_chunks: usize,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
}

type ApiError = (StatusCode, Json<AnswerPayload>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/upload", post(upload))
        .route("/query", post(query))
        .with_state(state)
}

pub async fn run(bind: &str, data_dir: PathBuf, pipeline: Pipeline<DynEmbedder>) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let state = AppState::new(pipeline, data_dir.clone());
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "docanswer listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;

    let removed = clear_data_dir(&data_dir).await?;
    info!(removed, dir = %data_dir.display(), "uploads folder cleared on server shutdown");

    // the embedder may hold a blocking HTTP client, which must not be dropped on a runtime thread
    tokio::task::spawn_blocking(move || drop(state))
        .await
        .context("state teardown panicked")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(%error, "failed to listen for shutdown signal");
    }
}

pub async fn clear_data_dir(dir: &Path) -> anyhow::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(error) => return Err(error).context("failed to list data dir"),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    let source = PathBuf::from(&request.file_path);
    if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
        error!(path = %request.file_path, "file not found");
        return Err(api_error(StatusCode::NOT_FOUND, "File not found"));
    }
    if DocumentFormat::from_path(&source).is_none() {
        error!(path = %request.file_path, "invalid file format");
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Unsupported file format. Use TXT or PDF.",
        ));
    }

    if let Some(name) = source.file_name() {
        let destination = state.data_dir.join(name);
        if is_same_file(&source, &destination).await {
            info!(path = %request.file_path, "document already in data dir");
        } else {
            tokio::fs::copy(&source, &destination)
                .await
                .map_err(|error| {
                    error!(%error, "failed to copy upload into data dir");
                    internal_error("An internal error occurred while processing the document.")
                })?;
        }
    }

    let pipeline = state.pipeline.clone();
    let report = tokio::task::spawn_blocking(move || pipeline.write().ingest_path(&source))
        .await
        .map_err(|error| {
            error!(%error, "ingest task failed");
            internal_error("An internal error occurred while processing the document.")
        })?
        .map_err(|error| upload_error(&error))?;

    info!(path = %request.file_path, "document processed successfully");
    Ok(Json(UploadResponse {
        message: format!("Document {} processed successfully", request.file_path),
        total_chunks: report.total_chunks,
    }))
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<AnswerPayload>, ApiError> {
    let pipeline = state.pipeline.clone();
    let text = request.query;
    let outcome = tokio::task::spawn_blocking(move || pipeline.read().answer(&text))
        .await
        .map_err(|error| {
            error!(%error, "query task failed");
            internal_error("An internal error occurred while processing the query.")
        })?;

    match outcome {
        Ok(composed) => Ok(Json(AnswerPayload::success(composed.response))),
        Err(error @ (PipelineError::NoDocument | PipelineError::EmptyQuery)) => {
            warn!(%error, "query rejected");
            Err(api_error(StatusCode::BAD_REQUEST, error.to_string()))
        }
        Err(error) => Ok(Json(AnswerPayload::failed(error.to_string()))),
    }
}

/// Copying a file onto itself truncates it before the read starts.
async fn is_same_file(source: &Path, destination: &Path) -> bool {
    match (
        tokio::fs::canonicalize(source).await,
        tokio::fs::canonicalize(destination).await,
    ) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}

fn upload_error(error: &PipelineError) -> ApiError {
    error!(%error, "failed to process document");
    match error.kind() {
        ErrorKind::Validation => api_error(StatusCode::BAD_REQUEST, error.to_string()),
        ErrorKind::NotFound => api_error(StatusCode::NOT_FOUND, error.to_string()),
        ErrorKind::Capacity => api_error(StatusCode::TOO_MANY_REQUESTS, error.to_string()),
        ErrorKind::Mismatch | ErrorKind::Internal => {
            internal_error("An internal error occurred while processing the document.")
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(AnswerPayload::failed(message)))
}

fn internal_error(message: &str) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, message)
}
