//! # exam-evaluator
//!
//! Grade solved exam papers against their marking schemes with a chat LLM,
//! and turn the results into report cards.
//!
//! ## Pipeline Overview
//!
//! ```text
//! exam PDFs ─┐
//!            ├─ 1. Pair     match exam i with marking scheme i (counts must agree)
//! scheme PDFs┘
//!  ├─ 2. Extract  text layer of every page (lopdf, spawn_blocking)
//!  ├─ 3. Grade    examiner prompt + exam + scheme → report card markdown
//!  ├─ 4. Polish   post-processing (fences, preambles, tables, whitespace)
//!  ├─ 5. Compile  batch mode: all report cards → one final report card
//!  └─ 6. Render   report card markdown → PDF (Letter, Helvetica) or HTML
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exam_evaluator::{evaluate_to_pdf, EvaluationConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / ...
//!     let config = EvaluationConfig::default();
//!     let exams = vec!["maths.pdf".to_string(), "physics.pdf".to_string()];
//!     let schemes = vec!["maths_ms.pdf".to_string(), "physics_ms.pdf".to_string()];
//!     let output = evaluate_to_pdf(&exams, &schemes, "report_card.pdf", &config).await?;
//!     println!("{}", output.combined_markdown());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `exam-eval` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The browser UI and JSON API (axum + tower-http) |
//!
//! Disable both when using only the library:
//! ```toml
//! exam-evaluator = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod evaluate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EvaluationConfig, EvaluationConfigBuilder, EvaluationMode, DEFAULT_MODEL};
pub use error::{EvalError, PairError};
pub use evaluate::{
    backend_from_config, compile_final_report, evaluate, evaluate_documents, evaluate_pair,
    evaluate_to_pdf, evaluate_with_backend, extract_pair, inspect, pair_documents, report_pdf,
    write_atomic, ExamPair, ExtractedPair,
};
pub use output::{DocumentInfo, EvaluationOutput, EvaluationStats, ExamReport};
pub use pipeline::input::PdfDocument;
pub use pipeline::llm::{BackendError, ChatBackend, ChatOptions, ChatTurn, Completion, Role};
pub use progress::{EvaluationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{render_final_report_pdf, render_html, render_markdown_pdf, split_final_report};
