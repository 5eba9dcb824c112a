//! HTTP API for submitting downloads, polling progress and retrieving
//! artifacts.
//!
//! Artifact retrieval is at-most-once: the file is deleted from disk as
//! soon as its response stream is dropped, whether the transfer finished
//! or the client went away.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;

use crate::core::error::AppError;
use crate::core::validation;
use crate::download::DownloadService;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Fetch(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            AppError::Validation(msg)
            | AppError::Fetch(msg)
            | AppError::NotFound(msg)
            | AppError::Busy(msg) => msg.clone(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ExtractRequest {
    url: String,
}

#[derive(Debug, Deserialize)]
struct DownloadRequest {
    url: String,
    #[serde(default = "default_format")]
    format_id: String,
}

fn default_format() -> String {
    "best".to_string()
}

pub fn router(service: Arc<DownloadService>) -> Router {
    Router::new()
        .route("/api/extract_info", post(extract_info_handler))
        .route("/api/download", post(download_handler))
        .route("/api/progress/{id}", get(progress_handler))
        .route("/api/download_file/{filename}", get(download_file_handler))
        .route("/api/cancel/{id}", post(cancel_handler))
        .route("/health", get(health_handler))
        .with_state(service)
}

/// Starts the HTTP server and blocks until it exits.
pub async fn serve(service: Arc<DownloadService>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(service);

    log::info!("Starting server on http://{}", addr);
    log::info!("  POST /api/extract_info          - Probe video metadata and formats");
    log::info!("  POST /api/download              - Submit a download job");
    log::info!("  GET  /api/progress/{{id}}         - Poll job progress");
    log::info!("  GET  /api/download_file/{{name}}  - Retrieve finished artifact (one-shot)");
    log::info!("  POST /api/cancel/{{id}}           - Cancel an active job");
    log::info!("  GET  /health                    - Health check");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// POST /api/extract_info — metadata and format catalog without downloading.
async fn extract_info_handler(
    State(service): State<Arc<DownloadService>>,
    Json(req): Json<ExtractRequest>,
) -> Result<Response, AppError> {
    let info = service.video_info(&req.url).await?;
    Ok(Json(info).into_response())
}

/// POST /api/download — submits a job, returns its ID immediately.
async fn download_handler(
    State(service): State<Arc<DownloadService>>,
    Json(req): Json<DownloadRequest>,
) -> Result<Response, AppError> {
    let id = service.submit(&req.url, &req.format_id).await?;
    Ok(Json(json!({ "download_id": id, "status": "started" })).into_response())
}

/// GET /api/progress/{id} — polls job status.
///
/// Unknown-but-valid IDs answer 200 with `not_found` so pollers can keep a
/// simple success path after a server restart swept their job.
async fn progress_handler(
    State(service): State<Arc<DownloadService>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    match service.status(&id).await? {
        Some(snapshot) => Ok(Json(snapshot).into_response()),
        None => Ok(Json(json!({ "status": "not_found", "message": "Download not found" })).into_response()),
    }
}

/// POST /api/cancel/{id} — cancels an active job.
async fn cancel_handler(
    State(service): State<Arc<DownloadService>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    if service.cancel(&id).await {
        Ok(Json(json!({ "cancelled": true })).into_response())
    } else {
        Err(AppError::NotFound("No active download with that ID".to_string()))
    }
}

/// GET /api/download_file/{filename} — streams a finished artifact and
/// deletes it afterwards.
async fn download_file_handler(
    State(service): State<Arc<DownloadService>>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let safe_name = validation::sanitize_artifact_name(&filename)?;
    let path = service.output_dir().join(&safe_name);

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| AppError::NotFound(format!("File not found: {}", safe_name)))?;
    let len = file.metadata().await.map(|m| m.len()).ok();

    info!("Serving artifact {} (will delete after transfer)", safe_name);
    let stream = DeleteOnDrop {
        inner: ReaderStream::new(file),
        path: Some(path),
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", safe_name),
        );
    if let Some(len) = len {
        response = response.header(header::CONTENT_LENGTH, len);
    }
    response
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Fetch(format!("Failed to build response: {}", e)))
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Byte stream that removes the underlying file once dropped, so a served
/// artifact cannot be fetched twice.
struct DeleteOnDrop {
    inner: ReaderStream<tokio::fs::File>,
    path: Option<PathBuf>,
}

impl futures_util::Stream for DeleteOnDrop {
    type Item = std::io::Result<bytes::Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => info!("Deleted served artifact {}", path.display()),
                Err(e) => warn!("Failed to delete served artifact {}: {}", path.display(), e),
            }
        }
    }
}
