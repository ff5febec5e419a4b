//! Result types returned by the evaluation entry points.
//!
//! Everything here is `Serialize + Deserialize` so the CLI's `--json` flag
//! and the web server can hand results to other tools unchanged.

use crate::error::PairError;
use serde::{Deserialize, Serialize};

/// The report card for one exam/marking-scheme pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamReport {
    /// File stem of the exam upload, e.g. `maths_paper` for `maths_paper.pdf`.
    pub exam_name: String,
    /// File stem of the matching marking scheme.
    pub scheme_name: String,
    /// Post-processed report-card markdown. Empty when `error` is set.
    pub markdown: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<PairError>,
}

impl ExamReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Output of a full evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutput {
    /// One entry per pair, in upload order.
    pub reports: Vec<ExamReport>,
    /// Aggregated report card. `None` in individual mode.
    pub final_report: Option<String>,
    pub stats: EvaluationStats,
}

impl EvaluationOutput {
    /// Reports that were produced successfully, in upload order.
    pub fn successful(&self) -> impl Iterator<Item = &ExamReport> {
        self.reports.iter().filter(|r| r.is_ok())
    }

    /// Markdown shown to the user: each report separated by a rule,
    /// followed by the final report when there is one.
    pub fn combined_markdown(&self) -> String {
        let mut parts: Vec<&str> = self.successful().map(|r| r.markdown.trim_end()).collect();
        if let Some(ref fr) = self.final_report {
            parts.push(fr.trim_end());
        }
        let mut out = parts.join("\n\n---\n\n");
        out.push('\n');
        out
    }
}

/// Counters for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationStats {
    pub total_pairs: usize,
    pub evaluated_pairs: usize,
    pub failed_pairs: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub extraction_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// What `inspect` reports about a PDF without calling an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    pub page_count: usize,
    pub text_chars: usize,
    /// First few hundred characters of extracted text.
    pub preview: String,
}
