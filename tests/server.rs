//! Router tests: requests go through `tower::ServiceExt::oneshot`, no socket.
#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use exam_evaluator::prompts::COMPILER_SYSTEM_PROMPT;
use exam_evaluator::server::{router, AppState};
use exam_evaluator::{
    render_markdown_pdf, BackendError, ChatBackend, ChatOptions, ChatTurn, Completion,
    EvaluationConfig,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "exam-eval-test-boundary";

const FINAL_REPORT: &str = "# Report Card\n\n## Result Table\n\n\
| Subject | Marks Obtained | Total Marks |\n|---|---|---|\n| Maths | 2 | 2 |\n\n\
## Overall Analysis\n\nFull marks.\n";

struct Canned;

#[async_trait]
impl ChatBackend for Canned {
    fn label(&self) -> String {
        "canned".into()
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        _options: &ChatOptions,
    ) -> Result<Completion, BackendError> {
        let content = if turns[0].content == COMPILER_SYSTEM_PROMPT {
            FINAL_REPORT.to_string()
        } else {
            "### Subject: Maths\n\n**Total Score:** 2/2\n".to_string()
        };
        Ok(Completion {
            content,
            prompt_tokens: 10,
            completion_tokens: 5,
        })
    }
}

fn state() -> AppState {
    let config = EvaluationConfig::builder().max_retries(0).build().unwrap();
    AppState::new(config).with_backend(Arc::new(Canned))
}

fn sample_pdf(text: &str) -> Vec<u8> {
    render_markdown_pdf(None, text).unwrap()
}

/// One multipart part: `(field, file name, bytes)`. An empty file name
/// makes a plain text field.
fn multipart(parts: &[(&str, &str, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (field, file_name, bytes) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        if file_name.is_empty() {
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            );
        } else {
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/evaluate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let resp = router(state()).oneshot(get("/api/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn index_serves_the_ui() {
    let resp = router(state()).oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<title>Exam Evaluator</title>"));
}

#[tokio::test]
async fn evaluate_returns_reports_final_report_and_pdf() {
    let req = multipart(&[
        ("exam_files", "maths.pdf", sample_pdf("Question 1: 2 + 2 = 4")),
        ("scheme_files", "maths_ms.pdf", sample_pdf("Question 1: 4")),
        ("mode", "", b"batch".to_vec()),
    ]);
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = json_body(resp).await;
    assert_eq!(body["reports"].as_array().unwrap().len(), 1);
    assert_eq!(body["reports"][0]["exam_name"], "maths");
    assert!(body["reports"][0]["html"]
        .as_str()
        .unwrap()
        .contains("<h3>Subject: Maths</h3>"));
    assert!(body["final_report"]["markdown"]
        .as_str()
        .unwrap()
        .contains("## Result Table"));
    assert_eq!(body["pdf_file_name"], "report_card.pdf");
    assert!(body["pdf_base64"].as_str().unwrap().starts_with("JVBER"));
    assert_eq!(body["stats"]["evaluated_pairs"], 1);
}

#[tokio::test]
async fn individual_mode_has_no_final_report() {
    let req = multipart(&[
        ("exam_files", "maths.pdf", sample_pdf("Question 1: 2 + 2 = 4")),
        ("scheme_files", "maths_ms.pdf", sample_pdf("Question 1: 4")),
        ("mode", "", b"individual".to_vec()),
    ]);
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert!(body["final_report"].is_null());
    assert!(body["pdf_base64"].is_string());
}

#[tokio::test]
async fn unequal_uploads_are_rejected() {
    let req = multipart(&[
        ("exam_files", "maths.pdf", sample_pdf("a")),
        ("exam_files", "physics.pdf", sample_pdf("b")),
        ("scheme_files", "maths_ms.pdf", sample_pdf("c")),
    ]);
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Please upload an equal number of exam papers and marking schemes."));
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let req = multipart(&[("mode", "", b"batch".to_vec())]);
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn non_pdf_upload_is_unsupported_media() {
    let req = multipart(&[
        ("exam_files", "notes.txt", b"just some notes".to_vec()),
        ("scheme_files", "maths_ms.pdf", sample_pdf("c")),
    ]);
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn corrupt_pdf_uploads_are_unprocessable() {
    let req = multipart(&[
        ("exam_files", "maths.pdf", b"%PDF-1.4\ntruncated".to_vec()),
        ("scheme_files", "maths_ms.pdf", b"%PDF-1.4\ntruncated".to_vec()),
    ]);
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("could be read"));
}

#[tokio::test]
async fn unknown_mode_is_bad_request() {
    let req = multipart(&[
        ("exam_files", "maths.pdf", sample_pdf("a")),
        ("scheme_files", "maths_ms.pdf", sample_pdf("b")),
        ("mode", "", b"weekly".to_vec()),
    ]);
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

fn render_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/report/pdf")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn report_pdf_is_an_attachment() {
    let req = render_request(serde_json::json!({ "markdown": FINAL_REPORT }));
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert!(resp.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("report_card.pdf"));
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn report_pdf_without_table_is_unprocessable() {
    let req = render_request(serde_json::json!({ "markdown": "Just prose." }));
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let req = render_request(serde_json::json!({
        "markdown": "Just prose.",
        "kind": "exam",
        "title": "Maths"
    }));
    let resp = router(state()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn samples_are_listed_and_served() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("maths_exam.pdf"), sample_pdf("sample")).unwrap();
    std::fs::write(dir.path().join("readme.txt"), b"not a sample").unwrap();
    let state = state().with_samples_dir(dir.path());

    let resp = router(state.clone()).oneshot(get("/api/samples")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["maths_exam.pdf"]);

    let resp = router(state.clone())
        .oneshot(get("/api/samples/maths_exam.pdf"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");

    let resp = router(state.clone())
        .oneshot(get("/api/samples/missing.pdf"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = router(state)
        .oneshot(get("/api/samples/..%2Freadme.txt"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn no_samples_dir_lists_nothing() {
    let resp = router(state()).oneshot(get("/api/samples")).await.unwrap();
    let body = json_body(resp).await;
    assert_eq!(body, serde_json::json!([]));
}
