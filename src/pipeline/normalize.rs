//! Image normalization: raw bill photo → canonical binarized form.
//!
//! The canonical form is a fixed contract: single-channel, exactly
//! 800×1000, Gaussian-smoothed, thresholded to two intensity levels. The
//! fixed size is an extraction-quality contract, not a display contract —
//! aspect ratio is deliberately not preserved, so every downstream consumer
//! sees the same pixel geometry regardless of how the bill was photographed.
//!
//! ## Determinism
//!
//! Normalization is a pure function of the input bytes and the constants
//! below: byte-identical input produces a byte-identical pixel buffer. The
//! smoothing pass uses an integer-exact separable 5-tap kernel rather than a
//! float sigma-based blur so the guarantee does not rest on floating-point
//! rounding behaviour.
//!
//! Persisting the normalized image is the orchestrator's job; this module
//! never touches the filesystem on its own, so a failed run leaves nothing
//! behind.

use crate::error::BillScanError;
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Canonical width of a normalized bill image.
pub const CANONICAL_WIDTH: u32 = 800;

/// Canonical height of a normalized bill image.
pub const CANONICAL_HEIGHT: u32 = 1000;

/// Binarization threshold on the 0–255 grayscale range.
///
/// Pixels strictly above the threshold become white (255), the rest black
/// (0). 150 sits above typical paper-shadow gray and below faded ink.
pub const BINARY_THRESHOLD: u8 = 150;

/// Separable 5-tap smoothing kernel, [1 4 6 4 1] / 16.
///
/// This is the standard discrete Gaussian for a 5×5 kernel when the sigma is
/// left to be derived from the kernel size, and it is exact in integer
/// arithmetic: one horizontal and one vertical pass, each dividing by 16
/// with rounding.
const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];
const KERNEL_SUM: u32 = 16;

/// The canonicalized bill image, ready for submission or inspection.
///
/// Immutable once constructed; carries its source-path lineage so the
/// derived artifact path can be computed without re-threading the input.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: GrayImage,
    source: PathBuf,
}

impl NormalizedImage {
    /// The canonical pixel buffer (always `CANONICAL_WIDTH`×`CANONICAL_HEIGHT`).
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Path of the raw image this was derived from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Path the normalized artifact is persisted at: the source base name
    /// with a `_processed` suffix, always PNG (lossless — a JPEG re-encode
    /// would reintroduce the very artefacts the pipeline just removed).
    pub fn derived_path(&self) -> PathBuf {
        let stem = self
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bill".to_string());
        self.source.with_file_name(format!("{stem}_processed.png"))
    }

    /// Persist the canonical buffer as PNG at `path`.
    pub fn save_png(&self, path: &Path) -> Result<(), BillScanError> {
        self.pixels
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| BillScanError::Persistence {
                path: path.to_path_buf(),
                source: match e {
                    image::ImageError::IoError(io) => io,
                    other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
                },
            })
    }

    /// Encode the canonical buffer as in-memory PNG bytes.
    ///
    /// Used when the extraction request is configured to submit the
    /// normalized image instead of the original photo.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, BillScanError> {
        let mut buf = std::io::Cursor::new(Vec::new());
        self.pixels
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| BillScanError::Transform {
                detail: format!("PNG encoding failed: {e}"),
            })?;
        Ok(buf.into_inner())
    }
}

/// Normalize raw image bytes into the canonical form.
///
/// Fixed, deterministic steps:
/// 1. decode (any raster format the `image` crate knows);
/// 2. convert to single-channel grayscale;
/// 3. resize to exactly 800×1000 with bilinear interpolation;
/// 4. smooth with the separable 5-tap kernel;
/// 5. binarize at threshold 150.
pub fn normalize(bytes: &[u8], source: &Path) -> Result<NormalizedImage, BillScanError> {
    let decoded = image::load_from_memory(bytes).map_err(|source| BillScanError::Decode { source })?;

    let gray = decoded.to_luma8();
    let resized = image::imageops::resize(
        &gray,
        CANONICAL_WIDTH,
        CANONICAL_HEIGHT,
        FilterType::Triangle,
    );
    let smoothed = smooth(&resized);
    let binary = binarize(&smoothed);

    debug!(
        source = %source.display(),
        "Normalized bill image to {}x{} binary form",
        CANONICAL_WIDTH,
        CANONICAL_HEIGHT
    );

    Ok(NormalizedImage {
        pixels: binary,
        source: source.to_path_buf(),
    })
}

/// Apply the separable 5-tap kernel, horizontal then vertical pass.
///
/// Edge pixels clamp to the image border. Each pass rounds
/// (`+ KERNEL_SUM/2`) before dividing, so the result is exact and
/// platform-independent.
fn smooth(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let clamp_x = |x: i64| x.clamp(0, w as i64 - 1) as u32;
    let clamp_y = |y: i64| y.clamp(0, h as i64 - 1) as u32;

    let mut horizontal = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for (k, weight) in KERNEL.iter().enumerate() {
                let sx = clamp_x(x as i64 + k as i64 - 2);
                acc += weight * img.get_pixel(sx, y).0[0] as u32;
            }
            horizontal.put_pixel(x, y, image::Luma([((acc + KERNEL_SUM / 2) / KERNEL_SUM) as u8]));
        }
    }

    let mut vertical = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for (k, weight) in KERNEL.iter().enumerate() {
                let sy = clamp_y(y as i64 + k as i64 - 2);
                acc += weight * horizontal.get_pixel(x, sy).0[0] as u32;
            }
            vertical.put_pixel(x, y, image::Luma([((acc + KERNEL_SUM / 2) / KERNEL_SUM) as u8]));
        }
    }

    vertical
}

/// Threshold to a strictly two-level image: `> BINARY_THRESHOLD` → 255, else 0.
fn binarize(img: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, p) in img.enumerate_pixels() {
        let v = if p.0[0] > BINARY_THRESHOLD { 255 } else { 0 };
        out.put_pixel(x, y, image::Luma([v]));
    }
    out
}
