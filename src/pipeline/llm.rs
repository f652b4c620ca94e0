//! Model interaction: build the multimodal request and call the service.
//!
//! This module is intentionally thin — all prompt engineering lives in
//! [`crate::prompts`] and all response interpretation in
//! [`crate::pipeline::validate`], so it can change without touching the
//! transport, timeout, or retry logic here.
//!
//! ## The [`ExtractionService`] seam
//!
//! The external model is an opaque request/response oracle, so it sits
//! behind an object-safe trait. Production uses [`GeminiService`]; tests
//! inject stubs via `ExtractionConfig::service`, the same way a caller
//! would inject caching or rate-limiting middleware.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 5xx and timeouts are transient and frequent. Exponential
//! backoff (`retry_backoff_ms * 2^attempt`) avoids hammering a recovering
//! endpoint: with 500 ms base and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s. Only transient errors are retried — a malformed
//! response is returned immediately, because resending an unchanged request
//! cannot fix it.

use crate::config::ExtractionConfig;
use crate::error::BillScanError;
use crate::pipeline::encode::ImagePayload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Raw answer from the extraction service, before validation.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    /// Concatenated text of the first candidate.
    pub text: String,
    /// Prompt tokens reported by the service (0 when unreported).
    pub input_tokens: u32,
    /// Completion tokens reported by the service (0 when unreported).
    pub output_tokens: u32,
}

/// A structured-extraction oracle: one image + one prompt in, raw text out.
///
/// Implementations perform exactly one service call per invocation; the
/// retry policy lives in [`request_with_retry`], outside the trait, so every
/// implementation gets the same transient-only behaviour.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        image: &ImagePayload,
    ) -> Result<ServiceResponse, BillScanError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize, Clone, Copy)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ── Gemini client ────────────────────────────────────────────────────────

/// `generateContent` client for the Gemini REST API.
///
/// Holds an immutable copy of the generation parameters; they are fixed
/// configuration for the run, never request-time input.
#[derive(Debug)]
pub struct GeminiService {
    client: reqwest::Client,
    base_url: String,
    model: String,
    generation: GenerationConfig,
    timeout_secs: u64,
}

impl GeminiService {
    /// Build a client from the run configuration.
    ///
    /// The API key comes from the config, falling back to `GEMINI_API_KEY`.
    /// It is installed as a default request header and never appears in
    /// logs or URLs.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, BillScanError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or(BillScanError::MissingApiKey)?;

        let mut headers = reqwest::header::HeaderMap::new();
        let mut key_value: reqwest::header::HeaderValue = api_key
            .parse()
            .map_err(|_| BillScanError::InvalidConfig("API key contains invalid characters".into()))?;
        key_value.set_sensitive(true);
        headers.insert("x-goog-api-key", key_value);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| BillScanError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: GEMINI_API_URL.to_string(),
            model: config.model.clone(),
            generation: GenerationConfig {
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
                max_output_tokens: config.max_output_tokens,
                response_mime_type: "application/json",
            },
            timeout_secs: config.api_timeout_secs,
        })
    }

    /// Override the endpoint base URL (local emulators, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ExtractionService for GeminiService {
    async fn generate(
        &self,
        prompt: &str,
        image: &ImagePayload,
    ) -> Result<ServiceResponse, BillScanError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type,
                            data: &image.data,
                        },
                    },
                ],
            }],
            generation_config: self.generation,
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BillScanError::ServiceTimeout {
                        secs: self.timeout_secs,
                    }
                } else {
                    BillScanError::Service {
                        status: None,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| BillScanError::Service {
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(BillScanError::Service {
                status: Some(status.as_u16()),
                message,
            });
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| BillScanError::Service {
                status: Some(status.as_u16()),
                message: format!("unrecognised response envelope: {e}"),
            })?;

        let usage = parsed.usage_metadata.unwrap_or_default();
        let text: String = parsed
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        debug!(
            prompt_tokens = usage.prompt_token_count,
            completion_tokens = usage.candidates_token_count,
            response_len = text.len(),
            "extraction service call completed"
        );

        Ok(ServiceResponse {
            text,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }
}

// ── Retry wrapper ────────────────────────────────────────────────────────

/// Call the service, retrying transient failures with exponential backoff.
///
/// Returns the response together with the number of retries used. The loop
/// never retries a non-transient error (`ResponseFormat`, auth, config):
/// those surface immediately.
pub async fn request_with_retry(
    service: &dyn ExtractionService,
    prompt: &str,
    image: &ImagePayload,
    max_retries: u32,
    backoff_ms: u64,
) -> Result<(ServiceResponse, u32), BillScanError> {
    let mut last_err: Option<BillScanError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "extraction retry {}/{} after {}ms",
                attempt, max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match service.generate(prompt, image).await {
            Ok(response) => return Ok((response, attempt)),
            Err(e) if e.is_transient() => {
                warn!("extraction attempt {} failed — {}", attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| BillScanError::Internal("retry loop exited without error".into())))
}
