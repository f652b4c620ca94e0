//! The extraction prompt sent with every bill image.
//!
//! Centralising the prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing which fields the model is asked
//!    for requires editing exactly one place (and the matching key aliases
//!    in `pipeline::validate`).
//!
//! 2. **Testability** — unit tests can inspect the prompt directly without
//!    a live model call, so a dropped field is caught by a cheap assert.
//!
//! Callers can override via [`crate::config::ExtractionConfig::prompt`]; the
//! constant here is used only when no override is provided.

/// Default instructional prompt for structured bill extraction.
///
/// Enumerates the exact fields to extract and demands JSON output. The
/// response MIME type is additionally constrained to `application/json` at
/// the request level, but stating it in the prompt measurably reduces the
/// rate of prose-wrapped answers from smaller models.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract the following details from the bill image:
- Vendor Name
- Bill Date
- Total Amount
- Type of the Expense
- Category of the Expense
- GST / Tax Details (if available)
- Itemized List (if available), each item with description, quantity, unit price and amount

Return the data as a single JSON object. Use null for fields that are not
present on the bill. Do not add commentary or explanations."#;
