//! Pipeline tests against a scripted chat backend.
//!
//! Input PDFs are generated with the crate's own renderer, so extraction runs
//! on real text layers while no network is involved.

use async_trait::async_trait;
use exam_evaluator::prompts::{COMPILER_SYSTEM_PROMPT, EXAMINER_SYSTEM_PROMPT};
use exam_evaluator::{
    evaluate_with_backend, render_markdown_pdf, report_pdf, BackendError, ChatBackend,
    ChatOptions, ChatTurn, Completion, EvalError, EvaluationConfig, EvaluationMode,
    EvaluationProgressCallback, PairError, PdfDocument,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const FINAL_REPORT: &str = "# Report Card\n\n## Result Table\n\n\
| Subject | Marks Obtained | Total Marks |\n|---|---|---|\n\
| Maths | 8 | 10 |\n| Physics | 6 | 10 |\n\n\
## Overall Analysis\n\nA solid performance overall.\n";

/// Answers examiner calls with a report card naming the exam, and the
/// compiler call with [`FINAL_REPORT`]. Exams containing `UNGRADABLE` fail.
struct ScriptedBackend {
    calls: Mutex<Vec<Vec<ChatTurn>>>,
}

impl ScriptedBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Vec<ChatTurn>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn label(&self) -> String {
        "scripted".into()
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        _options: &ChatOptions,
    ) -> Result<Completion, BackendError> {
        self.calls.lock().unwrap().push(turns.to_vec());
        let user = &turns[1].content;

        if turns[0].content == COMPILER_SYSTEM_PROMPT {
            return Ok(Completion {
                content: FINAL_REPORT.into(),
                prompt_tokens: 50,
                completion_tokens: 30,
            });
        }
        if user.contains("UNGRADABLE") {
            return Err(BackendError("model refused".into()));
        }
        let subject = if user.contains("Newton") { "Physics" } else { "Maths" };
        Ok(Completion {
            content: format!(
                "### Subject: {subject}\n\n| Question | Marks Obtained | Comments |\n\
                 |---|---|---|\n| 1 | 2/2 | Correct |\n\n**Total Score:** 2/2\n"
            ),
            prompt_tokens: 100,
            completion_tokens: 40,
        })
    }
}

fn pdf(file_name: &str, body: &str) -> PdfDocument {
    let bytes = render_markdown_pdf(None, body).unwrap();
    PdfDocument::from_bytes(file_name, bytes).unwrap()
}

fn maths() -> (PdfDocument, PdfDocument) {
    (
        pdf("maths.pdf", "Question 1: 2 + 2 = 4"),
        pdf("maths_ms.pdf", "Question 1: answer 4, two marks"),
    )
}

fn physics() -> (PdfDocument, PdfDocument) {
    (
        pdf("physics.pdf", "Question 1: Newton's second law is F = ma"),
        pdf("physics_ms.pdf", "Question 1: F = ma, two marks"),
    )
}

fn config(mode: EvaluationMode) -> EvaluationConfig {
    EvaluationConfig::builder()
        .mode(mode)
        .max_retries(0)
        .retry_backoff_ms(1)
        .build()
        .unwrap()
}

#[tokio::test]
async fn batch_mode_grades_in_order_and_compiles_final_report() {
    let backend = ScriptedBackend::new();
    let (m, ms) = maths();
    let (p, ps) = physics();

    let output = evaluate_with_backend(
        vec![m, p],
        vec![ms, ps],
        backend.clone(),
        &config(EvaluationMode::Batch),
    )
    .await
    .unwrap();

    assert_eq!(output.reports.len(), 2);
    assert_eq!(output.reports[0].exam_name, "maths");
    assert_eq!(output.reports[0].scheme_name, "maths_ms");
    assert!(output.reports[0].markdown.contains("### Subject: Maths"));
    assert_eq!(output.reports[1].exam_name, "physics");
    assert!(output.reports[1].markdown.contains("### Subject: Physics"));

    let final_report = output.final_report.as_deref().unwrap();
    assert!(final_report.contains("## Result Table"));

    let calls = backend.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0][0].content, EXAMINER_SYSTEM_PROMPT);
    assert!(calls[0][1].content.starts_with("Exam Paper:\n"));
    assert!(calls[0][1].content.contains("2 + 2 = 4"));
    assert!(calls[0][1].content.contains("Marking Scheme:\n"));
    assert_eq!(calls[2][0].content, COMPILER_SYSTEM_PROMPT);
    assert!(calls[2][1].content.contains("### Subject: Physics"));

    assert_eq!(output.stats.total_pairs, 2);
    assert_eq!(output.stats.evaluated_pairs, 2);
    assert_eq!(output.stats.failed_pairs, 0);
    assert_eq!(output.stats.total_input_tokens, 250);
    assert_eq!(output.stats.total_output_tokens, 110);

    let pdf = report_pdf(&output).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn individual_mode_skips_final_report() {
    let backend = ScriptedBackend::new();
    let (m, ms) = maths();

    let output = evaluate_with_backend(
        vec![m],
        vec![ms],
        backend.clone(),
        &config(EvaluationMode::Individual),
    )
    .await
    .unwrap();

    assert!(output.final_report.is_none());
    assert_eq!(backend.calls().len(), 1);
    assert!(output.combined_markdown().contains("### Subject: Maths"));
    assert!(report_pdf(&output).unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
async fn mismatched_counts_fail_before_any_call() {
    let backend = ScriptedBackend::new();
    let (m, ms) = maths();
    let (p, _) = physics();

    let err = evaluate_with_backend(
        vec![m, p],
        vec![ms],
        backend.clone(),
        &config(EvaluationMode::Batch),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        EvalError::MismatchedCounts {
            exams: 2,
            schemes: 1
        }
    ));
    assert!(err
        .to_string()
        .contains("Please upload an equal number of exam papers and marking schemes."));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn one_failed_pair_keeps_the_rest() {
    let backend = ScriptedBackend::new();
    let (m, ms) = maths();

    let output = evaluate_with_backend(
        vec![pdf("bad.pdf", "UNGRADABLE"), m],
        vec![pdf("bad_ms.pdf", "whatever"), ms],
        backend.clone(),
        &config(EvaluationMode::Batch),
    )
    .await
    .unwrap();

    assert_eq!(output.stats.evaluated_pairs, 1);
    assert_eq!(output.stats.failed_pairs, 1);
    assert!(matches!(
        output.reports[0].error,
        Some(PairError::LlmFailed { .. })
    ));
    assert!(output.reports[1].is_ok());

    // Only successful reports reach the final report.
    let compile = backend.calls().pop().unwrap();
    assert_eq!(compile[0].content, COMPILER_SYSTEM_PROMPT);
    assert!(!compile[1].content.contains("## Report: bad"));
    assert!(compile[1].content.contains("## Report: maths"));
}

#[tokio::test]
async fn every_pair_failing_is_fatal() {
    let backend = ScriptedBackend::new();

    let err = evaluate_with_backend(
        vec![pdf("a.pdf", "UNGRADABLE one"), pdf("b.pdf", "UNGRADABLE two")],
        vec![pdf("a_ms.pdf", "x"), pdf("b_ms.pdf", "y")],
        backend.clone(),
        &config(EvaluationMode::Batch),
    )
    .await
    .unwrap_err();

    match err {
        EvalError::AllPairsFailed { total, first_error } => {
            assert_eq!(total, 2);
            assert!(first_error.contains("model refused"), "{first_error}");
        }
        other => panic!("expected AllPairsFailed, got {other:?}"),
    }
    // No compile call after total failure.
    assert_eq!(backend.calls().len(), 2);
}

#[tokio::test]
async fn unreadable_pdf_is_a_pair_error() {
    let backend = ScriptedBackend::new();
    let (m, ms) = maths();
    let broken = PdfDocument::from_bytes("broken.pdf", b"%PDF-1.4\nnot really a pdf".to_vec()).unwrap();

    let output = evaluate_with_backend(
        vec![broken, m],
        vec![pdf("broken_ms.pdf", "scheme"), ms],
        backend.clone(),
        &config(EvaluationMode::Individual),
    )
    .await
    .unwrap();

    assert!(matches!(
        output.reports[0].error,
        Some(PairError::ExtractionFailed { .. })
    ));
    assert!(output.reports[1].is_ok());
    assert_eq!(backend.calls().len(), 1);
}

#[tokio::test]
async fn every_pair_unreadable_is_an_upload_error() {
    let backend = ScriptedBackend::new();
    let broken = |name: &str| {
        PdfDocument::from_bytes(name, b"%PDF-1.4\ntruncated upload".to_vec()).unwrap()
    };

    let err = evaluate_with_backend(
        vec![broken("a.pdf"), broken("b.pdf")],
        vec![broken("a_ms.pdf"), broken("b_ms.pdf")],
        backend.clone(),
        &config(EvaluationMode::Batch),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(err, EvalError::UnreadableUploads { total: 2, .. }),
        "got {err:?}"
    );
    assert!(err.is_user_error());
    assert!(backend.calls().is_empty());
}

#[derive(Default)]
struct Counting {
    started: AtomicUsize,
    pairs_started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    compiling: AtomicUsize,
    finished: Mutex<Option<(usize, usize)>>,
}

impl EvaluationProgressCallback for Counting {
    fn on_evaluation_start(&self, total_pairs: usize) {
        self.started.store(total_pairs, Ordering::SeqCst);
    }
    fn on_pair_start(&self, _index: usize, _total: usize, _exam_name: &str) {
        self.pairs_started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_pair_complete(&self, _index: usize, _total: usize, _report_len: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_pair_error(&self, _index: usize, _total: usize, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_final_report_start(&self) {
        self.compiling.fetch_add(1, Ordering::SeqCst);
    }
    fn on_evaluation_complete(&self, total_pairs: usize, succeeded: usize) {
        *self.finished.lock().unwrap() = Some((total_pairs, succeeded));
    }
}

#[tokio::test]
async fn progress_callbacks_fire_for_every_stage() {
    let backend = ScriptedBackend::new();
    let counting = Arc::new(Counting::default());
    let (m, ms) = maths();

    let config = EvaluationConfig::builder()
        .max_retries(0)
        .concurrency(2)
        .progress_callback(counting.clone())
        .build()
        .unwrap();

    evaluate_with_backend(
        vec![pdf("bad.pdf", "UNGRADABLE"), m],
        vec![pdf("bad_ms.pdf", "x"), ms],
        backend,
        &config,
    )
    .await
    .unwrap();

    assert_eq!(counting.started.load(Ordering::SeqCst), 2);
    assert_eq!(counting.pairs_started.load(Ordering::SeqCst), 2);
    assert_eq!(counting.completed.load(Ordering::SeqCst), 1);
    assert_eq!(counting.failed.load(Ordering::SeqCst), 1);
    assert_eq!(counting.compiling.load(Ordering::SeqCst), 1);
    assert_eq!(*counting.finished.lock().unwrap(), Some((2, 1)));
}
