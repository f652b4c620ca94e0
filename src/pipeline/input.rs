//! Input resolution: load a bill image and sniff its format.
//!
//! ## Why sniff magic bytes?
//!
//! File extensions lie — a text file renamed to `.jpg` is a classic user
//! error. Checking the leading bytes before handing the buffer to a decoder
//! turns a cryptic decode failure into a precise, actionable error, and
//! gives us a trustworthy MIME type for the multimodal request payload.

use crate::error::BillScanError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Raster formats accepted at the pipeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
    Tiff,
}

impl ImageKind {
    /// MIME type declared for the image attachment.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }

    /// Identify a format from the file's leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', ..] => Some(Self::Png),
            // RIFF....WEBP
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::WebP),
            [b'G', b'I', b'F', b'8', ..] => Some(Self::Gif),
            [b'B', b'M', ..] => Some(Self::Bmp),
            [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => Some(Self::Tiff),
            _ => None,
        }
    }
}

/// The raw bill image as read from disk. Immutable after construction.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub path: PathBuf,
    pub kind: ImageKind,
}

/// Resolve a local image path into a [`SourceImage`].
///
/// Validates existence, read permission, and the image magic bytes so the
/// caller gets a precise input error before any decoding starts.
pub fn resolve_image(path: impl AsRef<Path>) -> Result<SourceImage, BillScanError> {
    let path = path.as_ref().to_path_buf();

    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(BillScanError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(BillScanError::ImageNotFound { path });
        }
    };

    let kind = ImageKind::sniff(&bytes).ok_or_else(|| {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        BillScanError::NotAnImage {
            path: path.clone(),
            magic,
        }
    })?;

    debug!("Resolved bill image: {} ({})", path.display(), kind.mime_type());
    Ok(SourceImage { bytes, path, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn sniff_common_formats() {
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(
            ImageKind::sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]),
            Some(ImageKind::Png)
        );
        assert_eq!(
            ImageKind::sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(ImageKind::WebP)
        );
        assert_eq!(ImageKind::sniff(b"II\x2A\x00rest"), Some(ImageKind::Tiff));
        assert_eq!(ImageKind::sniff(b"plain text"), None);
        assert_eq!(ImageKind::sniff(&[]), None);
    }

    #[test]
    fn resolve_missing_file() {
        let err = resolve_image("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, BillScanError::ImageNotFound { .. }));
    }

    #[test]
    fn resolve_rejects_renamed_text_file() {
        let mut tmp = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        tmp.write_all(b"this is not an image at all").unwrap();

        let err = resolve_image(tmp.path()).unwrap_err();
        assert!(matches!(err, BillScanError::NotAnImage { .. }));
    }

    #[test]
    fn resolve_accepts_jpeg_magic() {
        let mut tmp = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        tmp.write_all(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]).unwrap();

        let src = resolve_image(tmp.path()).unwrap();
        assert_eq!(src.kind, ImageKind::Jpeg);
        assert_eq!(src.kind.mime_type(), "image/jpeg");
        assert_eq!(src.bytes.len(), 6);
    }
}
