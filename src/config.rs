//! Configuration types for bill extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. The config is an immutable value
//! scoped to one pipeline run — there is no process-wide mutable state, so
//! independent runs can share a config or run concurrently without locking.
//!
//! # Design choice: builder over constructor
//! A ten-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::BillScanError;
use crate::pipeline::llm::ExtractionService;
use std::fmt;
use std::sync::Arc;

/// Configuration for one bill-extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use billscan::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gemini-2.0-flash")
///     .temperature(0.7)
///     .api_timeout_secs(90)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier, e.g. "gemini-2.0-flash". Default: "gemini-2.0-flash".
    pub model: String,

    /// API key for the extraction service. If `None`, the `GEMINI_API_KEY`
    /// environment variable is read when the service client is built.
    ///
    /// Treated as an opaque secret: never logged, never serialized, elided
    /// from `Debug` output.
    pub api_key: Option<String>,

    /// Sampling temperature. Range 0.0–2.0. Default: 0.7.
    ///
    /// Moderate temperature favours factual field extraction while leaving
    /// the model room to normalise messy print (smudged digits, partial
    /// vendor names). Values near 2.0 visibly degrade amount accuracy.
    pub temperature: f32,

    /// Nucleus sampling cap. Range 0.0–1.0. Default: 0.95.
    pub top_p: f32,

    /// Top-k sampling cap. Default: 40.
    pub top_k: u32,

    /// Maximum tokens the model may generate. Default: 8192.
    ///
    /// Long itemized bills (supermarket receipts) can run to hundreds of
    /// line items; a generous cap avoids silent mid-array truncation, which
    /// would surface as a confusing JSON parse failure.
    pub max_output_tokens: u32,

    /// Maximum retry attempts on a transient service failure. Default: 3.
    ///
    /// Only transport errors and timeouts are retried. Malformed responses
    /// are not — resending an unchanged request cannot fix those.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-call service timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Submit the normalized (binarized 800×1000) image to the model instead
    /// of the original photo. Default: false.
    ///
    /// The binarized form discards colour and fine tonal detail that vision
    /// models read well, so the original photo is the conservative default;
    /// the normalized artifact is still always produced and saved next to
    /// the source for inspection.
    pub submit_normalized: bool,

    /// Custom extraction prompt. If `None`, uses the built-in default.
    pub prompt: Option<String>,

    /// Pre-constructed extraction service. Takes precedence over the
    /// built-in client; useful in tests or when the caller needs custom
    /// middleware (caching, rate-limiting).
    pub service: Option<Arc<dyn ExtractionService>>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            submit_normalized: false,
            prompt: None,
            service: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("submit_normalized", &self.submit_normalized)
            .field("service", &self.service.as_ref().map(|_| "<dyn ExtractionService>"))
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.config.top_k = k.max(1);
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
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

    pub fn submit_normalized(mut self, v: bool) -> Self {
        self.config.submit_normalized = v;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.config.service = Some(service);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, BillScanError> {
        let c = &self.config;
        if c.model.is_empty() {
            return Err(BillScanError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_output_tokens == 0 {
            return Err(BillScanError::InvalidConfig(
                "max_output_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(BillScanError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
