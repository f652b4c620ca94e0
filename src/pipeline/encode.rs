//! Image encoding: raw bytes → base64 payload for the multimodal request.
//!
//! The model API accepts images as base64 data embedded in the JSON request
//! body next to a declared MIME type. Keeping the encoded form in its own
//! type (rather than a bare `String`) stops a prompt string and an image
//! payload from ever being swapped at a call site.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// A base64-encoded image attachment with its MIME type.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Base64 (standard alphabet, padded) image data.
    pub data: String,
    /// Declared media type, e.g. `image/jpeg`.
    pub mime_type: &'static str,
}

/// Encode image bytes for the request body.
pub fn encode_image(bytes: &[u8], mime_type: &'static str) -> ImagePayload {
    let data = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64 ({mime_type})", data.len());
    ImagePayload { data, mime_type }
}
