//! HTTP surface: `POST /convert` takes multipart field `files` (loose
//! documents or a single zip bundle) and answers with the result archive.
//!
//! Handlers return `Result<_, ServerError>`. Validation problems come back as
//! `400` with their message; anything internal is logged in full and answered
//! with a generic `500`.

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ConvertConfig};
use crate::contract::{DocumentConverter, UploadedEntry};
use crate::error::PipelineError;
use crate::pipeline::run_request;
use crate::staging::StagedUpload;
use crate::workspace::Workspace;

/// Multipart field that carries the documents.
pub const FILES_FIELD: &str = "files";

pub const CONVERTED_COUNT_HEADER: HeaderName = HeaderName::from_static("x-converted-count");
pub const FAILED_COUNT_HEADER: HeaderName = HeaderName::from_static("x-failed-count");

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConvertConfig>,
    pub converter: Arc<dyn DocumentConverter>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("upload error: {0}")]
    Upload(#[from] MultipartError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PipelineError> for ServerError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Validation(msg) => ServerError::BadRequest(msg),
            other => {
                error!(error = ?other, "Conversion request failed");
                ServerError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ServerError::Upload(e) => {
                warn!(error = %e, "Rejected multipart upload");
                (e.status(), e.body_text()).into_response()
            }
            ServerError::Internal(msg) => {
                error!(message = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/convert", post(convert_upload))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn convert_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let workspace = Workspace::create(&state.config.workspace_root).map_err(|e| {
        ServerError::Internal(format!("failed to create request workspace: {e}"))
    })?;
    info!(request_id = %workspace.request_id(), "Received conversion request");

    let entries = match receive_uploads(&workspace, &mut multipart).await {
        Ok(entries) => entries,
        Err(e) => {
            workspace.cleanup().await;
            return Err(e);
        }
    };

    let (report, archive) =
        run_request(&state.config, state.converter.as_ref(), workspace, entries).await?;
    info!(
        request_id = %report.request_id,
        summary = %report.summary(),
        bytes = archive.len(),
        "Sending archive"
    );

    let disposition = format!("attachment; filename=\"{}\"", state.config.archive_name);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ServerError::Internal(format!("invalid archive name: {e}")))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
            (CONVERTED_COUNT_HEADER, HeaderValue::from(report.succeeded)),
            (FAILED_COUNT_HEADER, HeaderValue::from(report.failed)),
        ],
        archive,
    )
        .into_response())
}

/// Streams every `files` field into the workspace.
async fn receive_uploads(
    workspace: &Workspace,
    multipart: &mut Multipart,
) -> Result<Vec<UploadedEntry>, ServerError> {
    let mut entries = Vec::new();
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            debug!(field = ?field.name(), "Ignoring unexpected multipart field");
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().map(str::to_string);

        let mut staged = StagedUpload::create(workspace, entries.len(), &original_name, mime_type)
            .await
            .map_err(|e| ServerError::Internal(format!("failed to stage upload: {e}")))?;
        while let Some(chunk) = field.chunk().await? {
            staged
                .write_chunk(&chunk)
                .await
                .map_err(|e| ServerError::Internal(format!("failed to stage upload: {e}")))?;
        }
        let entry = staged
            .finish()
            .await
            .map_err(|e| ServerError::Internal(format!("failed to stage upload: {e}")))?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve_with_listener<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Binds the configured address and serves until Ctrl-C / SIGTERM.
pub async fn serve(config: AppConfig, converter: Arc<dyn DocumentConverter>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.server.listen).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    let state = AppState {
        config: Arc::new(config.convert),
        converter,
    };
    let app = router(state, config.server.max_upload_bytes);
    serve_with_listener(listener, app, shutdown_signal()).await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}
