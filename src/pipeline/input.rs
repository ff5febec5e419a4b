//! Input resolution: turn a path, URL or upload into an in-memory PDF.
//!
//! Exams and marking schemes are small (a few MB at most), so every input
//! is read fully into memory. That lets the CLI (paths and URLs) and the web
//! server (multipart uploads) share one type and one validation path.
//! The `%PDF` magic bytes are checked up front so a mislabelled upload gets
//! a clear error instead of a parser failure.

use crate::error::EvalError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A PDF held in memory together with the name it was uploaded under.
#[derive(Clone)]
pub struct PdfDocument {
    /// Label used in reports: the file name without its extension.
    pub name: String,
    /// Original file name, extension included.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl PdfDocument {
    /// Wrap uploaded bytes, validating the PDF magic bytes.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, EvalError> {
        let file_name = file_name.into();
        let name = file_stem(&file_name);
        if !bytes.starts_with(b"%PDF") {
            return Err(EvalError::NotAPdf {
                name: file_name,
                magic: bytes.iter().take(4).copied().collect(),
            });
        }
        Ok(Self {
            name,
            file_name,
            bytes,
        })
    }
}

/// Strip directories and the last extension: `papers/maths.v2.pdf` → `maths.v2`.
pub fn file_stem(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to an in-memory PDF.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfDocument, EvalError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<PdfDocument, EvalError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => EvalError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => EvalError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    PdfDocument::from_bytes(file_name, bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfDocument, EvalError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EvalError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            EvalError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            EvalError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(EvalError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| EvalError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());
    PdfDocument::from_bytes(filename_from_url(url), bytes.to_vec())
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// Resolve a list of inputs, stopping at the first unreadable one.
pub async fn resolve_all(inputs: &[String], timeout_secs: u64) -> Result<Vec<PdfDocument>, EvalError> {
    let mut docs = Vec::with_capacity(inputs.len());
    for input in inputs {
        docs.push(resolve_input(input, timeout_secs).await?);
    }
    Ok(docs)
}

/// Paths of every `*.pdf` file in `dir`, sorted by name.
pub fn list_pdfs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
        })
        .collect();
    out.sort();
    Ok(out)
}
