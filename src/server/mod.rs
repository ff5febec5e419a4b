//! Browser UI and JSON API.
//!
//! Routes:
//! - `GET  /`                    - single-page UI
//! - `POST /api/evaluate`        - grade uploaded exams (multipart)
//! - `POST /api/report/pdf`      - render report markdown to a PDF download
//! - `GET  /api/samples`         - list sample PDFs
//! - `GET  /api/samples/{name}`  - download one sample PDF
//! - `GET  /api/health`          - liveness

mod handlers;
mod ui;

use crate::config::EvaluationConfig;
use crate::error::EvalError;
use crate::pipeline::llm::ChatBackend;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Default cap on one request body (all uploads together).
pub const DEFAULT_UPLOAD_LIMIT: usize = 50 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EvaluationConfig>,
    /// Backend used for grading. `None` resolves one from `config` per request.
    pub backend: Option<Arc<dyn ChatBackend>>,
    /// Directory of sample PDFs offered for download.
    pub samples_dir: Option<PathBuf>,
    pub upload_limit: usize,
}

impl AppState {
    pub fn new(config: EvaluationConfig) -> Self {
        Self {
            config: Arc::new(config),
            backend: None,
            samples_dir: None,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_samples_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.samples_dir = Some(dir.into());
        self
    }

    pub fn with_upload_limit(mut self, bytes: usize) -> Self {
        self.upload_limit = bytes;
        self
    }
}

/// Create the application router.
pub fn router(state: AppState) -> Router {
    let limit = state.upload_limit;
    Router::new()
        .route("/", get(ui::index))
        .route("/api/evaluate", post(handlers::evaluate))
        .route("/api/report/pdf", post(handlers::render_pdf))
        .route("/api/samples", get(handlers::list_samples))
        .route("/api/samples/{name}", get(handlers::download_sample))
        .route("/api/health", get(handlers::health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

/// JSON error body: `{ "error": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<EvalError> for ApiError {
    fn from(e: EvalError) -> Self {
        let status = match &e {
            EvalError::MismatchedCounts { .. }
            | EvalError::NoInput
            | EvalError::UnreadableUploads { .. }
            | EvalError::MalformedReport(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EvalError::NotAPdf { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            EvalError::ProviderNotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EvalError::AllPairsFailed { .. } | EvalError::FinalReportFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            e if e.is_user_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}: {}", self.status, self.message);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}
