use super::{ApiError, AppState};
use crate::config::EvaluationMode;
use crate::error::EvalError;
use crate::evaluate::{backend_from_config, evaluate_with_backend, report_pdf};
use crate::output::{EvaluationStats, ExamReport};
use crate::pipeline::input::{list_pdfs, PdfDocument};
use crate::report::{render_final_report_pdf, render_html, render_markdown_pdf};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// File name every report download is offered under.
pub const REPORT_FILE_NAME: &str = "report_card.pdf";

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub exam_name: String,
    pub scheme_name: String,
    pub markdown: String,
    pub html: String,
    pub error: Option<String>,
}

impl From<&ExamReport> for ReportView {
    fn from(r: &ExamReport) -> Self {
        Self {
            exam_name: r.exam_name.clone(),
            scheme_name: r.scheme_name.clone(),
            markdown: r.markdown.clone(),
            html: render_html(&r.markdown),
            error: r.error.as_ref().map(|e| e.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FinalReportView {
    pub markdown: String,
    pub html: String,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub reports: Vec<ReportView>,
    pub final_report: Option<FinalReportView>,
    pub stats: EvaluationStats,
    pub pdf_file_name: String,
    /// Base64 of the report PDF; `None` when it could not be laid out.
    pub pdf_base64: Option<String>,
    pub pdf_error: Option<String>,
}

/// `POST /api/evaluate`
///
/// Multipart fields: `exam_files` and `scheme_files` (repeatable, matched by
/// order), optional `mode` = `batch` | `individual`.
pub async fn evaluate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let mut exams: Vec<PdfDocument> = Vec::new();
    let mut schemes: Vec<PdfDocument> = Vec::new();
    let mut mode = state.config.mode;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;

        match name.as_str() {
            "exam_files" | "scheme_files" => {
                // Browsers send one empty part for an untouched file picker.
                if bytes.is_empty() && file_name.is_empty() {
                    continue;
                }
                let doc = PdfDocument::from_bytes(file_name, bytes.to_vec())?;
                if name == "exam_files" {
                    exams.push(doc);
                } else {
                    schemes.push(doc);
                }
            }
            "mode" => {
                mode = match std::str::from_utf8(&bytes).unwrap_or_default().trim() {
                    "individual" => EvaluationMode::Individual,
                    "batch" | "" => EvaluationMode::Batch,
                    other => {
                        return Err(ApiError::new(
                            StatusCode::BAD_REQUEST,
                            format!("Unknown mode '{}': expected batch or individual", other),
                        ))
                    }
                };
            }
            other => warn!("Ignoring unexpected multipart field '{}'", other),
        }
    }

    info!(
        "Evaluate request: {} exam(s), {} marking scheme(s), {:?} mode",
        exams.len(),
        schemes.len(),
        mode
    );

    if exams.len() != schemes.len() {
        return Err(EvalError::MismatchedCounts {
            exams: exams.len(),
            schemes: schemes.len(),
        }
        .into());
    }
    if exams.is_empty() {
        return Err(EvalError::NoInput.into());
    }

    let mut config = (*state.config).clone();
    config.mode = mode;

    let backend = match state.backend {
        Some(ref backend) => backend.clone(),
        None => backend_from_config(&config).await?,
    };

    let output = evaluate_with_backend(exams, schemes, backend, &config).await?;

    let (pdf_base64, pdf_error) = match report_pdf(&output) {
        Ok(bytes) => (
            Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
            None,
        ),
        Err(e) => {
            warn!("Report PDF could not be rendered: {}", e);
            (None, Some(e.to_string()))
        }
    };

    Ok(Json(EvaluateResponse {
        reports: output.reports.iter().map(ReportView::from).collect(),
        final_report: output.final_report.as_ref().map(|md| FinalReportView {
            markdown: md.clone(),
            html: render_html(md),
        }),
        stats: output.stats,
        pdf_file_name: REPORT_FILE_NAME.to_string(),
        pdf_base64,
        pdf_error,
    }))
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Compiled final report: title, result table, overall analysis.
    #[default]
    Final,
    /// Any single exam report, laid out block by block.
    Exam,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub markdown: String,
    #[serde(default)]
    pub kind: ReportKind,
    pub title: Option<String>,
}

/// `POST /api/report/pdf`
pub async fn render_pdf(Json(request): Json<RenderRequest>) -> Result<Response, ApiError> {
    let markdown = request.markdown;
    let title = request.title;
    let kind = request.kind;
    let bytes = tokio::task::spawn_blocking(move || match kind {
        ReportKind::Final => render_final_report_pdf(&markdown),
        ReportKind::Exam => render_markdown_pdf(title.as_deref(), &markdown),
    })
    .await
    .map_err(|e| EvalError::Internal(format!("Render task panicked: {}", e)))??;

    Ok(pdf_attachment(REPORT_FILE_NAME, bytes))
}

fn pdf_attachment(file_name: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct SampleFile {
    pub name: String,
    pub size_bytes: u64,
}

/// `GET /api/samples`
pub async fn list_samples(State(state): State<AppState>) -> Result<Json<Vec<SampleFile>>, ApiError> {
    let Some(dir) = state.samples_dir else {
        return Ok(Json(Vec::new()));
    };
    let paths = list_pdfs(&dir).map_err(|e| {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Cannot read samples directory: {}", e),
        )
    })?;
    let samples = paths
        .iter()
        .filter_map(|p| {
            let name = p.file_name()?.to_string_lossy().into_owned();
            let size_bytes = std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
            Some(SampleFile { name, size_bytes })
        })
        .collect();
    Ok(Json(samples))
}

/// `GET /api/samples/{name}`
pub async fn download_sample(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if !is_plain_pdf_name(&name) {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Invalid sample name"));
    }
    let dir = state
        .samples_dir
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No samples configured"))?;
    let bytes = tokio::fs::read(dir.join(&name))
        .await
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, format!("Sample '{}' not found", name)))?;
    Ok(pdf_attachment(&name, bytes))
}

/// A bare `*.pdf` file name: no separators, no parent references.
fn is_plain_pdf_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && name.to_ascii_lowercase().ends_with(".pdf")
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// `GET /api/health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
