//! Evaluation entry points.
//!
//! A run has three phases:
//!
//! 1. **Pair**: exams and marking schemes are matched by upload position.
//!    The counts must be equal; this is the one check whose message is
//!    shown to users verbatim.
//! 2. **Grade**: both PDFs of each pair are reduced to text and sent to the
//!    model with the examiner prompt. A failing pair is recorded in its
//!    [`ExamReport`] and the rest of the batch carries on.
//! 3. **Compile** (batch mode only): the successful reports are sent back to
//!    the model with the compiler prompt to produce one final report card.

use crate::config::{EvaluationConfig, EvaluationMode, DEFAULT_MODEL};
use crate::error::{EvalError, PairError};
use crate::output::{DocumentInfo, EvaluationOutput, EvaluationStats, ExamReport};
use crate::pipeline::input::{self, PdfDocument};
use crate::pipeline::llm::{chat_with_retry, CallFailure, ChatBackend, ChatOutcome, ChatTurn, ProviderBackend};
use crate::pipeline::{extract, postprocess};
use crate::prompts;
use crate::report::{render_final_report_pdf, render_markdown_pdf};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An exam and the marking scheme it is graded against.
#[derive(Debug, Clone)]
pub struct ExamPair {
    pub exam: PdfDocument,
    pub scheme: PdfDocument,
}

/// A pair reduced to text, ready for grading.
#[derive(Debug, Clone)]
pub struct ExtractedPair {
    pub exam_name: String,
    pub scheme_name: String,
    pub exam_text: String,
    pub scheme_text: String,
}

/// Match exams to marking schemes by upload order.
pub fn pair_documents(
    exams: Vec<PdfDocument>,
    schemes: Vec<PdfDocument>,
) -> Result<Vec<ExamPair>, EvalError> {
    check_counts(exams.len(), schemes.len())?;
    Ok(exams
        .into_iter()
        .zip(schemes)
        .map(|(exam, scheme)| ExamPair { exam, scheme })
        .collect())
}

fn check_counts(exams: usize, schemes: usize) -> Result<(), EvalError> {
    if exams != schemes {
        return Err(EvalError::MismatchedCounts { exams, schemes });
    }
    if exams == 0 {
        return Err(EvalError::NoInput);
    }
    Ok(())
}

/// Extract the text of both documents in a pair.
pub async fn extract_pair(pair: &ExamPair) -> Result<ExtractedPair, PairError> {
    let failed = |e: EvalError| PairError::ExtractionFailed {
        exam: pair.exam.name.clone(),
        detail: e.to_string(),
    };
    let (exam_text, scheme_text) =
        futures::try_join!(extract::extract_text(&pair.exam), extract::extract_text(&pair.scheme))
            .map_err(failed)?;
    Ok(ExtractedPair {
        exam_name: pair.exam.name.clone(),
        scheme_name: pair.scheme.name.clone(),
        exam_text,
        scheme_text,
    })
}

/// Grade one pair. Failures are recorded in the returned report.
pub async fn evaluate_pair(
    backend: &dyn ChatBackend,
    pair: &ExtractedPair,
    config: &EvaluationConfig,
) -> ExamReport {
    let system = config
        .examiner_prompt
        .as_deref()
        .unwrap_or(prompts::EXAMINER_SYSTEM_PROMPT);
    let turns = [
        ChatTurn::system(system),
        ChatTurn::user(prompts::exam_user_message(&pair.exam_text, &pair.scheme_text)),
    ];

    let mut report = ExamReport {
        exam_name: pair.exam_name.clone(),
        scheme_name: pair.scheme_name.clone(),
        markdown: String::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        retries: 0,
        error: None,
    };

    match chat_with_retry(backend, &pair.exam_name, &turns, config).await {
        Ok(outcome) => {
            report.markdown = postprocess::clean_markdown(&outcome.content);
            report.input_tokens = outcome.input_tokens;
            report.output_tokens = outcome.output_tokens;
            report.duration_ms = outcome.duration_ms;
            report.retries = outcome.retries;
        }
        Err(CallFailure::TimedOut { secs }) => {
            report.retries = config.max_retries;
            report.error = Some(PairError::Timeout {
                exam: pair.exam_name.clone(),
                secs,
            });
        }
        Err(CallFailure::Failed { retries, detail }) => {
            report.retries = retries;
            report.error = Some(PairError::LlmFailed {
                exam: pair.exam_name.clone(),
                retries,
                detail,
            });
        }
    }
    report
}

/// Compile the successful reports into one final report card.
///
/// The returned outcome's `content` is already cleaned up.
pub async fn compile_final_report(
    backend: &dyn ChatBackend,
    reports: &[ExamReport],
    config: &EvaluationConfig,
) -> Result<ChatOutcome, EvalError> {
    let system = config
        .compiler_prompt
        .as_deref()
        .unwrap_or(prompts::COMPILER_SYSTEM_PROMPT);
    let user = prompts::final_report_user_message(
        reports
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| (r.exam_name.as_str(), r.markdown.as_str())),
    );
    let turns = [ChatTurn::system(system), ChatTurn::user(user)];

    let mut outcome = chat_with_retry(backend, "final report", &turns, config)
        .await
        .map_err(|failure| match failure {
            CallFailure::TimedOut { secs } => EvalError::FinalReportFailed {
                retries: config.max_retries,
                detail: format!("timed out after {}s", secs),
            },
            CallFailure::Failed { retries, detail } => EvalError::FinalReportFailed { retries, detail },
        })?;
    outcome.content = postprocess::clean_markdown(&outcome.content);
    Ok(outcome)
}

/// Evaluate exams against marking schemes given as paths or URLs.
///
/// # Errors
/// Returns `Err(EvalError)` only for fatal errors:
/// - Unequal numbers of exams and marking schemes
/// - Unreadable or non-PDF input
/// - Provider not configured
/// - Every pair failed, or the final report could not be compiled
pub async fn evaluate(
    exams: &[String],
    schemes: &[String],
    config: &EvaluationConfig,
) -> Result<EvaluationOutput, EvalError> {
    check_counts(exams.len(), schemes.len())?;
    let exam_docs = input::resolve_all(exams, config.download_timeout_secs).await?;
    let scheme_docs = input::resolve_all(schemes, config.download_timeout_secs).await?;
    let backend = backend_from_config(config).await?;
    evaluate_with_backend(exam_docs, scheme_docs, backend, config).await
}

/// Evaluate in-memory documents with a backend built from `config`.
pub async fn evaluate_documents(
    exams: Vec<PdfDocument>,
    schemes: Vec<PdfDocument>,
    config: &EvaluationConfig,
) -> Result<EvaluationOutput, EvalError> {
    check_counts(exams.len(), schemes.len())?;
    let backend = backend_from_config(config).await?;
    evaluate_with_backend(exams, schemes, backend, config).await
}

/// Evaluate in-memory documents with an explicit chat backend.
pub async fn evaluate_with_backend(
    exams: Vec<PdfDocument>,
    schemes: Vec<PdfDocument>,
    backend: Arc<dyn ChatBackend>,
    config: &EvaluationConfig,
) -> Result<EvaluationOutput, EvalError> {
    let total_start = Instant::now();
    let pairs = pair_documents(exams, schemes)?;
    let total = pairs.len();
    info!("Evaluating {} exam(s) with {}", total, backend.label());

    if let Some(ref cb) = config.progress_callback {
        cb.on_evaluation_start(total);
    }

    let names: Vec<(String, String)> = pairs
        .iter()
        .map(|p| (p.exam.name.clone(), p.scheme.name.clone()))
        .collect();

    // ── Extract ──────────────────────────────────────────────────────────
    let extract_start = Instant::now();
    let extracted: Vec<Result<ExtractedPair, PairError>> = futures::future::join_all(
        pairs
            .into_iter()
            .map(|pair| async move { extract_pair(&pair).await }),
    )
    .await;
    let extraction_duration_ms = extract_start.elapsed().as_millis() as u64;
    debug!("Extracted {} pair(s) in {}ms", total, extraction_duration_ms);

    // ── Grade ────────────────────────────────────────────────────────────
    // Each future owns its inputs so the whole run stays `Send`.
    let llm_start = Instant::now();
    let jobs = extracted.into_iter().zip(names).enumerate();
    let reports: Vec<ExamReport> = stream::iter(jobs)
        .map(|(i, (prepared, (exam_name, scheme_name)))| {
            let backend = Arc::clone(&backend);
            async move {
                let index = i + 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_pair_start(index, total, &exam_name);
                }
                let report = match prepared {
                    Ok(prepared) => evaluate_pair(backend.as_ref(), &prepared, config).await,
                    Err(e) => failed_report(exam_name, scheme_name, e),
                };
                if let Some(ref cb) = config.progress_callback {
                    match &report.error {
                        None => cb.on_pair_complete(index, total, report.markdown.len()),
                        Some(e) => cb.on_pair_error(index, total, &e.to_string()),
                    }
                }
                report
            }
        })
        .buffered(config.concurrency)
        .collect()
        .await;

    for report in reports.iter().filter(|r| !r.is_ok()) {
        if let Some(ref e) = report.error {
            warn!("{}", e);
        }
    }

    let evaluated = reports.iter().filter(|r| r.is_ok()).count();
    if evaluated == 0 {
        let first_error = reports
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        let unreadable = reports
            .iter()
            .all(|r| matches!(r.error, Some(PairError::ExtractionFailed { .. })));
        return Err(if unreadable {
            EvalError::UnreadableUploads { total, first_error }
        } else {
            EvalError::AllPairsFailed { total, first_error }
        });
    }

    let mut total_input_tokens: u64 = reports.iter().map(|r| r.input_tokens as u64).sum();
    let mut total_output_tokens: u64 = reports.iter().map(|r| r.output_tokens as u64).sum();

    // ── Compile ──────────────────────────────────────────────────────────
    let final_report = match config.mode {
        EvaluationMode::Individual => None,
        EvaluationMode::Batch => {
            if let Some(ref cb) = config.progress_callback {
                cb.on_final_report_start();
            }
            let outcome = compile_final_report(backend.as_ref(), &reports, config).await?;
            total_input_tokens += outcome.input_tokens as u64;
            total_output_tokens += outcome.output_tokens as u64;
            Some(outcome.content)
        }
    };
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    let stats = EvaluationStats {
        total_pairs: total,
        evaluated_pairs: evaluated,
        failed_pairs: total - evaluated,
        total_input_tokens,
        total_output_tokens,
        extraction_duration_ms,
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Evaluation complete: {}/{} exam(s), {}ms total",
        evaluated, total, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_evaluation_complete(total, evaluated);
    }

    Ok(EvaluationOutput {
        reports,
        final_report,
        stats,
    })
}

fn failed_report(exam_name: String, scheme_name: String, error: PairError) -> ExamReport {
    ExamReport {
        exam_name,
        scheme_name,
        markdown: String::new(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: 0,
        retries: 0,
        error: Some(error),
    }
}

/// The PDF a run is downloaded as: the final report card in batch mode,
/// every successful report one after another in individual mode.
pub fn report_pdf(output: &EvaluationOutput) -> Result<Vec<u8>, EvalError> {
    match output.final_report {
        Some(ref markdown) => render_final_report_pdf(markdown),
        None => render_markdown_pdf(Some("Report Card"), &output.combined_markdown()),
    }
}

/// Evaluate and write the report PDF to `output_path`.
///
/// Uses atomic write (temp file in the same directory + rename) so a failed
/// run never leaves a partial PDF behind.
pub async fn evaluate_to_pdf(
    exams: &[String],
    schemes: &[String],
    output_path: impl AsRef<Path>,
    config: &EvaluationConfig,
) -> Result<EvaluationOutput, EvalError> {
    let output = evaluate(exams, schemes, config).await?;
    let pdf = report_pdf(&output)?;
    write_atomic(output_path.as_ref(), &pdf).await?;
    Ok(output)
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EvalError> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || {
        let write_failed = |source: std::io::Error| EvalError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_failed)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_failed)?;
        tmp.write_all(&bytes).map_err(write_failed)?;
        tmp.persist(&path).map_err(|e| write_failed(e.error))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok::<(), EvalError>(())
    })
    .await
    .map_err(|e| EvalError::Internal(format!("Write task panicked: {}", e)))?
}

/// Page count and text statistics for a PDF, without calling a model.
///
/// `download_timeout_secs` only applies when `input_str` is a URL.
pub async fn inspect(
    input_str: impl AsRef<str>,
    download_timeout_secs: u64,
) -> Result<DocumentInfo, EvalError> {
    let doc = input::resolve_input(input_str.as_ref(), download_timeout_secs).await?;
    let page_count = extract::page_count(&doc).await?;
    let text = match extract::extract_text(&doc).await {
        Ok(text) => text,
        Err(EvalError::NoText { .. }) => String::new(),
        Err(e) => return Err(e),
    };
    let preview: String = text.trim().chars().take(PREVIEW_CHARS).collect();
    Ok(DocumentInfo {
        name: doc.name,
        page_count,
        text_chars: text.chars().count(),
        preview,
    })
}

const PREVIEW_CHARS: usize = 400;

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, EvalError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        EvalError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the chat backend, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EXAM_EVAL_PROVIDER` + `EXAM_EVAL_MODEL`), both set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is present.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub async fn backend_from_config(config: &EvaluationConfig) -> Result<Arc<dyn ChatBackend>, EvalError> {
    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderBackend::new(Arc::clone(provider), "custom")));
    }

    if let Some(ref name) = config.provider_name {
        let provider = create_provider(name, model)?;
        return Ok(Arc::new(ProviderBackend::new(provider, format!("{name}/{model}"))));
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EXAM_EVAL_PROVIDER"),
        std::env::var("EXAM_EVAL_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            let provider = create_provider(&prov, &env_model)?;
            return Ok(Arc::new(ProviderBackend::new(provider, format!("{prov}/{env_model}"))));
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let provider = create_provider("openai", model)?;
            return Ok(Arc::new(ProviderBackend::new(provider, format!("openai/{model}"))));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| EvalError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or EXAM_EVAL_PROVIDER + EXAM_EVAL_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(ProviderBackend::new(llm_provider, "auto")))
}
