//! Extraction entry points: the pipeline orchestrator.
//!
//! One document in, one result (or one typed error) out. The stages run
//! strictly in sequence — normalize, then extract, then persist — and the
//! first failure surfaces unchanged; no later stage runs, and no output
//! file is touched. Each invocation owns its entities, so independent
//! documents can be processed concurrently as long as no two runs share an
//! output path.

use crate::config::ExtractionConfig;
use crate::error::BillScanError;
use crate::output::{ExtractionOutput, ExtractionStats};
use crate::pipeline::encode::{encode_image, ImagePayload};
use crate::pipeline::llm::{request_with_retry, ExtractionService, GeminiService};
use crate::pipeline::{input, normalize, validate};
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default location of the persisted result, relative to the working
/// directory.
pub const DEFAULT_OUTPUT_PATH: &str = "output/extracted_data.json";

/// Extract structured bill data from an image file.
///
/// This is the primary entry point for the library. The normalized
/// intermediate is always computed and saved next to the source
/// (`<stem>_processed.png`); the extraction request submits the original
/// photo unless [`ExtractionConfig::submit_normalized`] is set.
///
/// # Errors
/// Returns the first stage failure unchanged — see [`BillScanError::stage`]
/// for where the pipeline stopped.
pub async fn extract(
    image_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, BillScanError> {
    let total_start = Instant::now();
    let image_path = image_path.as_ref();
    info!("Starting bill extraction: {}", image_path.display());

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let source = input::resolve_image(image_path)?;

    // ── Step 2: Normalize (CPU-bound → spawn_blocking) ───────────────────
    let normalize_start = Instant::now();
    let source_for_normalize = source.clone();
    let normalized = tokio::task::spawn_blocking(move || {
        normalize::normalize(&source_for_normalize.bytes, &source_for_normalize.path)
    })
    .await
    .map_err(|e| BillScanError::Internal(format!("normalize task panicked: {e}")))??;

    let normalized_path = normalized.derived_path();
    normalized.save_png(&normalized_path)?;
    let normalize_duration_ms = normalize_start.elapsed().as_millis() as u64;
    debug!(
        "Normalized image saved to {} in {}ms",
        normalized_path.display(),
        normalize_duration_ms
    );

    // ── Step 3: Build the request payload ────────────────────────────────
    let payload: ImagePayload = if config.submit_normalized {
        encode_image(&normalized.to_png_bytes()?, "image/png")
    } else {
        encode_image(&source.bytes, source.kind.mime_type())
    };
    let prompt = config.prompt.as_deref().unwrap_or(DEFAULT_EXTRACTION_PROMPT);

    // ── Step 4: Call the extraction service ──────────────────────────────
    let service = resolve_service(config)?;
    let service_start = Instant::now();
    let (response, retries) = request_with_retry(
        service.as_ref(),
        prompt,
        &payload,
        config.max_retries,
        config.retry_backoff_ms,
    )
    .await?;
    let service_duration_ms = service_start.elapsed().as_millis() as u64;

    // ── Step 5: Validate the response ────────────────────────────────────
    let bill = validate::parse_bill_response(&response.text)?;

    let stats = ExtractionStats {
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        normalize_duration_ms,
        service_duration_ms,
        input_tokens: response.input_tokens,
        output_tokens: response.output_tokens,
        retries,
    };

    info!(
        "Extraction complete: vendor={:?}, {} line items, {}ms total",
        bill.vendor,
        bill.line_items.len(),
        stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        bill,
        normalized_path,
        stats,
    })
}

/// Extract a bill and persist the result as indented JSON.
///
/// The file is fully overwritten on success and never touched on failure,
/// so a prior run's output survives a failed one. Uses atomic write (temp
/// file + rename) to prevent partial files.
pub async fn extract_to_file(
    image_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, BillScanError> {
    let output = extract(image_path, config).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BillScanError::Persistence {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let json = serde_json::to_string_pretty(&output.bill)
        .map_err(|e| BillScanError::Internal(format!("result serialization failed: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| BillScanError::Persistence {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| BillScanError::Persistence {
            path: path.to_path_buf(),
            source: e,
        })?;

    info!("Result written to {}", path.display());
    Ok(output)
}

/// Extract bill data from in-memory image bytes.
///
/// Avoids the need for the caller to manage a file: the bytes are written
/// to a managed [`tempfile`] which is cleaned up automatically on return or
/// panic. Recommended when the image arrives from an upload or a database
/// rather than the local filesystem.
pub async fn extract_from_bytes(
    bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, BillScanError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("billscan-")
        .suffix(".img")
        .tempfile()
        .map_err(|e| BillScanError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| BillScanError::Internal(format!("tempfile write: {e}")))?;
    // `tmp` is dropped (and the file deleted) when `extract` returns
    extract(tmp.path(), config).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    image_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, BillScanError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| BillScanError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(extract(image_path, config))
}

/// Resolve the extraction service, most-specific first.
///
/// 1. **Pre-built service** (`config.service`) — the caller constructed it
///    entirely; used as-is. The seam for tests and custom middleware.
/// 2. **Built-in Gemini client** — constructed from the config, reading
///    `GEMINI_API_KEY` when no key was supplied explicitly.
fn resolve_service(config: &ExtractionConfig) -> Result<Arc<dyn ExtractionService>, BillScanError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }
    Ok(Arc::new(GeminiService::from_config(config)?))
}
