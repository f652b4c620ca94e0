//! # billscan
//!
//! Extract structured expense data from bill and receipt photos using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Bookkeeping tools need machine-readable records, not shoebox photos.
//! Classical OCR gives you a character soup that still has to be parsed;
//! instead this crate hands the bill image to a VLM together with a
//! structured-extraction prompt and validates the answer into a typed
//! record — vendor, date, total, tax breakdown, ordered line items. The
//! model is treated as an unreliable oracle: the crate guarantees a
//! validated output *shape*, never semantic accuracy of the values.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bill photo
//!  │
//!  ├─ 1. Input      resolve path, sniff image magic bytes
//!  ├─ 2. Normalize  grayscale → 800×1000 → smooth → binarize (inspectable)
//!  ├─ 3. Encode     image bytes → base64 attachment
//!  ├─ 4. Extract    one generateContent call (timeout + transient retry)
//!  ├─ 5. Validate   JSON-or-fail, tolerant field mapping → BillData
//!  └─ 6. Persist    indented JSON, atomic write, untouched on failure
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use billscan::{extract_to_file, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let output = extract_to_file("lunch.jpg", "output/extracted_data.json", &config).await?;
//!     println!("vendor: {:?}", output.bill.vendor);
//!     eprintln!("tokens: {} in / {} out",
//!         output.stats.input_tokens,
//!         output.stats.output_tokens);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `billscan` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! billscan = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{BillScanError, Stage};
pub use extract::{
    extract, extract_from_bytes, extract_sync, extract_to_file, DEFAULT_OUTPUT_PATH,
};
pub use output::{BillData, ExtractionOutput, ExtractionStats, LineItem};
pub use pipeline::encode::ImagePayload;
pub use pipeline::llm::{ExtractionService, GeminiService, ServiceResponse};
