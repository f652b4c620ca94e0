//! Pipeline stages for bill-image extraction.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. point at a different model service) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ encode ──▶ llm ──▶ validate
//! (path)    (canonical    (base64)   (VLM)   (JSON → BillData)
//!            grayscale)
//! ```
//!
//! 1. [`input`]     — resolve the user-supplied path, sniff the image format
//! 2. [`normalize`] — deterministic grayscale/resize/smooth/binarize pass;
//!    runs in `spawn_blocking` because it is CPU-bound
//! 3. [`encode`]    — base64-wrap the image bytes for the multimodal request
//!    body
//! 4. [`llm`]       — drive the model call with timeout and transient-only
//!    retry; the only stage with network I/O
//! 5. [`validate`]  — parse the model's JSON answer into a typed record,
//!    tolerating absent fields but never a malformed shape

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod validate;
