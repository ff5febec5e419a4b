//! LLM interaction: the chat seam and the retry loop around it.
//!
//! Grading never talks to `edgequake_llm` directly. It goes through the
//! small [`ChatBackend`] trait, implemented here for any
//! `Arc<dyn LLMProvider>`, so tests and embedders can drop in a scripted
//! backend without a network.
//!
//! ## Retry Strategy
//!
//! Each attempt is bounded by `api_timeout_secs`. Failed attempts back off
//! exponentially (`retry_backoff_ms * 2^(attempt-1)`): with 500 ms base and 3
//! retries the wait sequence is 500 ms → 1 s → 2 s. A single wait never
//! exceeds [`MAX_BACKOFF_MS`]. An empty completion counts as a failure, since
//! an empty report card is never a valid answer.

use crate::config::EvaluationConfig;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Who a chat turn comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// One message of a chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling options passed on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl ChatOptions {
    pub fn from_config(config: &EvaluationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A model response.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// Error reported by a backend for one attempt.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

/// Anything that can answer a chat request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short label for logs, e.g. `openai/gpt-4.1`.
    fn label(&self) -> String;

    async fn complete(
        &self,
        turns: &[ChatTurn],
        options: &ChatOptions,
    ) -> Result<Completion, BackendError>;
}

/// [`ChatBackend`] over an `edgequake_llm` provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for ProviderBackend {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn complete(
        &self,
        turns: &[ChatTurn],
        options: &ChatOptions,
    ) -> Result<Completion, BackendError> {
        let messages: Vec<ChatMessage> = turns
            .iter()
            .map(|t| match t.role {
                Role::System => ChatMessage::system(&t.content),
                Role::User => ChatMessage::user(&t.content),
            })
            .collect();

        let opts = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&opts))
            .await
            .map_err(|e| BackendError(e.to_string()))?;

        Ok(Completion {
            content: response.content,
            prompt_tokens: response.prompt_tokens as usize,
            completion_tokens: response.completion_tokens as usize,
        })
    }
}

/// A successful call, after however many retries it took.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Why a call failed once all retries were spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The last attempt hit the per-call timeout.
    TimedOut { secs: u64 },
    /// The last attempt returned an error (or an empty completion).
    Failed { retries: u32, detail: String },
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::TimedOut { secs } => write!(f, "timed out after {secs}s"),
            CallFailure::Failed { retries, detail } => {
                write!(f, "failed after {retries} retries: {detail}")
            }
        }
    }
}

/// Upper bound on a single retry wait.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Wait before retry number `attempt` (1-based), saturating at [`MAX_BACKOFF_MS`].
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    2u64.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base_ms.checked_mul(factor))
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_MS)
}

/// Send `turns` to `backend`, retrying with exponential backoff.
///
/// `label` identifies the call in logs (an exam name or "final report").
pub async fn chat_with_retry(
    backend: &dyn ChatBackend,
    label: &str,
    turns: &[ChatTurn],
    config: &EvaluationConfig,
) -> Result<ChatOutcome, CallFailure> {
    let start = Instant::now();
    let options = ChatOptions::from_config(config);
    let per_call = Duration::from_secs(config.api_timeout_secs);

    let mut last_failure = CallFailure::Failed {
        retries: 0,
        detail: "no attempt made".to_string(),
    };

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "{}: retry {}/{} after {}ms",
                label, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(per_call, backend.complete(turns, &options)).await {
            Ok(Ok(completion)) if !completion.content.trim().is_empty() => {
                let duration = start.elapsed();
                debug!(
                    "{}: {} input tokens, {} output tokens, {:?}",
                    label, completion.prompt_tokens, completion.completion_tokens, duration
                );
                return Ok(ChatOutcome {
                    content: completion.content,
                    input_tokens: completion.prompt_tokens,
                    output_tokens: completion.completion_tokens,
                    retries: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Ok(Ok(_)) => {
                warn!("{}: attempt {} returned an empty completion", label, attempt + 1);
                last_failure = CallFailure::Failed {
                    retries: attempt,
                    detail: "model returned an empty response".to_string(),
                };
            }
            Ok(Err(e)) => {
                warn!("{}: attempt {} failed — {}", label, attempt + 1, e);
                last_failure = CallFailure::Failed {
                    retries: attempt,
                    detail: e.to_string(),
                };
            }
            Err(_) => {
                warn!(
                    "{}: attempt {} timed out after {}s",
                    label,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_failure = CallFailure::TimedOut {
                    secs: config.api_timeout_secs,
                };
            }
        }
    }

    Err(last_failure)
}
