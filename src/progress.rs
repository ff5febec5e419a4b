//! Progress-callback trait for per-exam evaluation events.
//!
//! Inject an [`Arc<dyn EvaluationProgressCallback>`] via
//! [`crate::config::EvaluationConfigBuilder::progress_callback`] to receive
//! events as the evaluator works through each exam/marking-scheme pair.
//!
//! The CLI forwards these to an indicatif progress bar; the web server does
//! not install one and simply awaits the result.
//!
//! # Example
//!
//! ```rust
//! use exam_evaluator::{EvaluationProgressCallback, EvaluationConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     graded: Arc<AtomicUsize>,
//! }
//!
//! impl EvaluationProgressCallback for CountingCallback {
//!     fn on_pair_complete(&self, index: usize, total: usize, report_len: usize) {
//!         self.graded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Exam {}/{} graded ({} bytes)", index, total, report_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     graded: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = EvaluationConfig::builder()
//!     .progress_callback(counter as Arc<dyn EvaluationProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the evaluator as it processes each exam.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` the pair
/// callbacks may fire from several tasks at once. All methods default to
/// no-ops so callers only override what they care about.
pub trait EvaluationProgressCallback: Send + Sync {
    /// Called once, after the count check, before any PDF is read.
    fn on_evaluation_start(&self, total_pairs: usize) {
        let _ = total_pairs;
    }

    /// Called before text extraction for a pair begins.
    ///
    /// `index` is 1-based in upload order.
    fn on_pair_start(&self, index: usize, total: usize, exam_name: &str) {
        let _ = (index, total, exam_name);
    }

    /// Called when the report card for a pair is ready.
    fn on_pair_complete(&self, index: usize, total: usize, report_len: usize) {
        let _ = (index, total, report_len);
    }

    /// Called when a pair fails after all retries are exhausted.
    fn on_pair_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called before the aggregated final report is requested (batch mode only).
    fn on_final_report_start(&self) {}

    /// Called once after every pair (and the final report) has been attempted.
    fn on_evaluation_complete(&self, total_pairs: usize, succeeded: usize) {
        let _ = (total_pairs, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl EvaluationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::EvaluationConfig`].
pub type ProgressCallback = Arc<dyn EvaluationProgressCallback>;
