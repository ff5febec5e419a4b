//! Pipeline stages for grading one exam against its marking scheme.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ llm ──▶ postprocess
//! (path/URL/  (lopdf      (chat     (cleanup)
//!  upload)     text)       model)
//! ```
//!
//! 1. [`input`] load a path, URL or upload into memory and check it is a PDF
//! 2. [`extract`] pull the text layer out of every page; runs in
//!    `spawn_blocking` because parsing is CPU-bound
//! 3. [`llm`] the chat call with timeout and retry/backoff; the only
//!    stage with network I/O besides URL downloads
//! 4. [`postprocess`] deterministic text cleanup of the model's markdown

pub mod extract;
pub mod input;
pub mod llm;
pub mod postprocess;
