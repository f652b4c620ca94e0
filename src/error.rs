//! Error types for the billscan library.
//!
//! Every pipeline stage fails fast with exactly one [`BillScanError`]; the
//! orchestrator never attempts partial recovery and never persists a partial
//! result. Each variant is a distinct, reachable failure mode with its own
//! test, rather than a stringly-typed catch-all.
//!
//! Callers that want to react per stage (log routing, metrics, retry
//! decisions) use [`BillScanError::stage`] and [`BillScanError::is_transient`]
//! instead of matching every variant.

use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage an error originated from.
///
/// Reported alongside the error kind so a caller always sees *where* the
/// pipeline stopped, not just why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Input resolution: path checks and image magic-byte sniffing.
    Input,
    /// Image normalization: decode, resize, smooth, binarize.
    Normalize,
    /// The external model call and its response validation.
    Extract,
    /// Writing the result (or the normalized intermediate) to disk.
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Normalize => "normalize",
            Stage::Extract => "extract",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// All errors returned by the billscan library.
#[derive(Debug, Error)]
pub enum BillScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("bill image not found: '{path}'\nCheck the path exists and is readable.")]
    ImageNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but its magic bytes match no supported
    /// raster format.
    #[error("file is not a supported image: '{path}'\nFirst bytes: {magic:?}\nSupported: JPEG, PNG, WebP, GIF, BMP, TIFF.")]
    NotAnImage { path: PathBuf, magic: [u8; 4] },

    // ── Normalization errors ──────────────────────────────────────────────
    /// Input bytes could not be decoded as a raster image.
    #[error("failed to decode bill image: {source}")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    /// A normalization step failed on an otherwise-decodable image.
    #[error("image normalization failed: {detail}")]
    Transform { detail: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// The extraction call failed at the transport level, or the service
    /// answered with a non-success status (auth failure, quota, 5xx).
    #[error("extraction service error{}: {message}", fmt_status(.status))]
    Service {
        status: Option<u16>,
        message: String,
    },

    /// The extraction call exceeded the configured deadline.
    #[error("extraction service call timed out after {secs}s\nIncrease --api-timeout for slow connections.")]
    ServiceTimeout { secs: u64 },

    /// The service responded, but the payload is not a JSON object.
    ///
    /// Never retried: resending an unchanged request does not make a
    /// malformed answer well-formed.
    #[error("extraction response is not valid JSON: {detail}")]
    ResponseFormat { detail: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// Could not write the result file or the normalized intermediate.
    #[error("failed to write '{path}': {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// No API key in the config and none in the environment.
    #[error("no API key configured.\nSet GEMINI_API_KEY or pass one via ExtractionConfig::builder().api_key(..).")]
    MissingApiKey,

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

impl BillScanError {
    /// The pipeline stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::ImageNotFound { .. } | Self::PermissionDenied { .. } | Self::NotAnImage { .. } => {
                Stage::Input
            }
            Self::Decode { .. } | Self::Transform { .. } => Stage::Normalize,
            Self::Service { .. }
            | Self::ServiceTimeout { .. }
            | Self::ResponseFormat { .. }
            | Self::MissingApiKey
            | Self::InvalidConfig(_)
            | Self::Internal(_) => Stage::Extract,
            Self::Persistence { .. } => Stage::Persist,
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Only transport failures and timeouts qualify. A `ResponseFormat`
    /// error must never be retried without changing the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Service { .. } | Self::ServiceTimeout { .. })
    }
}
