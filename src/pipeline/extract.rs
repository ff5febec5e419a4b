//! PDF text extraction via lopdf.
//!
//! Exams are graded from their text layer only. Parsing is CPU-bound and
//! synchronous, so it runs on the blocking pool via `spawn_blocking`.

use crate::error::EvalError;
use crate::pipeline::input::PdfDocument;
use lopdf::Document;
use tracing::{debug, warn};

/// Text of every page in page order, pages separated by a newline.
pub async fn extract_text(doc: &PdfDocument) -> Result<String, EvalError> {
    let name = doc.name.clone();
    let bytes = doc.bytes.clone();
    tokio::task::spawn_blocking(move || extract_text_blocking(&name, &bytes))
        .await
        .map_err(|e| EvalError::Internal(format!("Extraction task panicked: {}", e)))?
}

/// Number of pages in the document.
pub async fn page_count(doc: &PdfDocument) -> Result<usize, EvalError> {
    let name = doc.name.clone();
    let bytes = doc.bytes.clone();
    tokio::task::spawn_blocking(move || load(&name, &bytes).map(|d| d.get_pages().len()))
        .await
        .map_err(|e| EvalError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn load(name: &str, bytes: &[u8]) -> Result<Document, EvalError> {
    Document::load_mem(bytes).map_err(|e| classify_load_error(name, e.to_string()))
}

/// Map a lopdf load failure to an upload error. lopdf reports encryption
/// problems only through the message text.
fn classify_load_error(name: &str, detail: String) -> EvalError {
    let lower = detail.to_lowercase();
    if lower.contains("decrypt") || lower.contains("encrypt") {
        EvalError::EncryptedPdf {
            name: name.to_string(),
        }
    } else {
        EvalError::CorruptPdf {
            name: name.to_string(),
            detail,
        }
    }
}

/// Error for a document that loaded but yielded no text.
fn empty_text_error(name: &str, encrypted: bool) -> EvalError {
    if encrypted {
        EvalError::EncryptedPdf {
            name: name.to_string(),
        }
    } else {
        EvalError::NoText {
            name: name.to_string(),
        }
    }
}

/// Blocking implementation of [`extract_text`].
pub fn extract_text_blocking(name: &str, bytes: &[u8]) -> Result<String, EvalError> {
    let document = load(name, bytes)?;
    let encrypted = document.trailer.get(b"Encrypt").is_ok();

    let pages = document.get_pages();
    debug!("{}: {} pages", name, pages.len());

    let mut text = String::new();
    for (&page_num, _) in pages.iter() {
        match document.extract_text(&[page_num]) {
            Ok(page_text) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&page_text);
            }
            Err(e) => warn!("{}: page {} has no readable text: {}", name, page_num, e),
        }
    }

    if text.trim().is_empty() {
        return Err(empty_text_error(name, encrypted));
    }

    debug!("{}: extracted {} chars", name, text.len());
    Ok(text)
}
