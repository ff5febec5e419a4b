//! Error types for the exam-evaluator library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EvalError`]: **Fatal**, the evaluation cannot proceed at all
//!   (unreadable upload, mismatched file counts, provider not configured).
//!   Returned as `Err(EvalError)` from the top-level `evaluate*` functions.
//!
//! * [`PairError`]: **Non-fatal**, a single exam/marking-scheme pair failed
//!   (no text layer, transient API error) but the other pairs are fine.
//!   Stored inside [`crate::output::ExamReport`] so callers can still show
//!   the reports that did succeed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the exam-evaluator library.
///
/// Pair-level failures use [`PairError`] and are stored in
/// [`crate::output::ExamReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum EvalError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The upload was read, but is not a PDF.
    #[error("File is not a valid PDF: '{name}'\nFirst bytes: {magic:?}\nOnly PDF files are supported.")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// The user supplied a different number of exams and marking schemes.
    #[error(
        "Please upload an equal number of exam papers and marking schemes. \
         (got {exams} exam paper(s) and {schemes} marking scheme(s))"
    )]
    MismatchedCounts { exams: usize, schemes: usize },

    /// Nothing to evaluate.
    #[error("No exam papers were provided")]
    NoInput,

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { name: String, detail: String },

    /// The PDF is encrypted; text cannot be read.
    #[error("PDF '{name}' is encrypted.\nRemove the password (e.g. qpdf --decrypt) and upload it again.")]
    EncryptedPdf { name: String },

    /// The PDF parsed, but has no text layer (scanned pages, blank file).
    #[error("PDF '{name}' contains no extractable text.\nScanned papers must be OCR'd before grading.")]
    NoText { name: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every pair failed before grading because no PDF text could be read.
    #[error("None of the {total} exam/marking-scheme pair(s) could be read.\nFirst error: {first_error}")]
    UnreadableUploads { total: usize, first_error: String },

    /// Every pair failed; there is nothing to report.
    #[error("All {total} exam(s) failed to evaluate.\nFirst error: {first_error}")]
    AllPairsFailed { total: usize, first_error: String },

    /// The per-exam reports were produced but the final report call failed.
    #[error("Failed to compile the final report after {retries} retries: {detail}")]
    FinalReportFailed { retries: u32, detail: String },

    // ── Report errors ─────────────────────────────────────────────────────
    /// The report markdown does not have the structure the PDF layout needs.
    #[error("Report markdown is malformed: {0}")]
    MalformedReport(String),

    /// Writing the PDF content stream failed.
    #[error("Failed to render report PDF: {0}")]
    PdfRender(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// `true` for errors caused by what the user uploaded, as opposed to
    /// provider or server failures. The web layer maps these to 4xx.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            EvalError::FileNotFound { .. }
                | EvalError::PermissionDenied { .. }
                | EvalError::NotAPdf { .. }
                | EvalError::MismatchedCounts { .. }
                | EvalError::NoInput
                | EvalError::CorruptPdf { .. }
                | EvalError::EncryptedPdf { .. }
                | EvalError::NoText { .. }
                | EvalError::UnreadableUploads { .. }
                | EvalError::MalformedReport(_)
        )
    }
}

/// A non-fatal error for a single exam/marking-scheme pair.
///
/// The batch continues unless ALL pairs fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PairError {
    /// Text could not be read from one of the two PDFs.
    #[error("Exam '{exam}': text extraction failed: {detail}")]
    ExtractionFailed { exam: String, detail: String },

    /// LLM call failed after retries.
    #[error("Exam '{exam}': LLM call failed after {retries} retries: {detail}")]
    LlmFailed {
        exam: String,
        retries: u32,
        detail: String,
    },

    /// LLM call timed out.
    #[error("Exam '{exam}': LLM call timed out after {secs}s")]
    Timeout { exam: String, secs: u64 },
}
