//! Configuration types for exam evaluation.
//!
//! All evaluation behaviour is controlled through [`EvaluationConfig`], built
//! via its [`EvaluationConfigBuilder`]. The CLI and the web server both map
//! their flags onto this one struct, so a run from either surface can be
//! reproduced from the other.

use crate::error::EvalError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model used when neither the caller nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Configuration for an evaluation run.
///
/// Built via [`EvaluationConfig::builder()`] or using
/// [`EvaluationConfig::default()`].
///
/// # Example
/// ```rust
/// use exam_evaluator::{EvaluationConfig, EvaluationMode};
///
/// let config = EvaluationConfig::builder()
///     .provider_name("openrouter")
///     .model("meta-llama/llama-3.1-405b-instruct")
///     .mode(EvaluationMode::Individual)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct EvaluationConfig {
    /// LLM model identifier, e.g. "gpt-4.1", "claude-sonnet-4-20250514".
    /// If None, uses [`DEFAULT_MODEL`] or the environment override.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "openrouter").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Grading has to be repeatable: the same paper graded twice should get
    /// the same marks.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per report. Default: 8192.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed LLM call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 180.
    ///
    /// Long papers produce long report cards; large models can take well over
    /// a minute to write one.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Number of exam/scheme pairs graded at once. Default: 1.
    ///
    /// Reports are always returned in upload order regardless of this value.
    pub concurrency: usize,

    /// Whether the per-exam reports are compiled into a final report. Default: Batch.
    pub mode: EvaluationMode,

    /// Custom examiner system prompt. If None, uses the built-in rubric.
    pub examiner_prompt: Option<String>,

    /// Custom final-report system prompt. If None, uses the built-in one.
    pub compiler_prompt: Option<String>,

    /// Progress events for the host application.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 180,
            download_timeout_secs: 120,
            concurrency: 1,
            mode: EvaluationMode::default(),
            examiner_prompt: None,
            compiler_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EvaluationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("mode", &self.mode)
            .field("examiner_prompt", &self.examiner_prompt.as_ref().map(|p| p.len()))
            .field("compiler_prompt", &self.compiler_prompt.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl EvaluationConfig {
    /// Create a new builder for `EvaluationConfig`.
    pub fn builder() -> EvaluationConfigBuilder {
        EvaluationConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EvaluationConfig`].
pub struct EvaluationConfigBuilder {
    config: EvaluationConfig,
}

impl EvaluationConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn mode(mut self, mode: EvaluationMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn examiner_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.examiner_prompt = Some(prompt.into());
        self
    }

    pub fn compiler_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.compiler_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EvaluationConfig, EvalError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(EvalError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(EvalError::InvalidConfig(
                "API timeout must be at least one second".into(),
            ));
        }
        if let Some(ref p) = c.examiner_prompt {
            if p.trim().is_empty() {
                return Err(EvalError::InvalidConfig(
                    "examiner prompt override is empty".into(),
                ));
            }
        }
        if let Some(ref p) = c.compiler_prompt {
            if p.trim().is_empty() {
                return Err(EvalError::InvalidConfig(
                    "final-report prompt override is empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

/// Whether per-exam reports are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Grade every pair, then compile one final report with a result table
    /// and an overall analysis. (default)
    #[default]
    Batch,
    /// Grade every pair and stop; each report card stands on its own.
    Individual,
}
