//! Header-only image probing.
//!
//! Reads width and height straight from PNG (`IHDR`) and JPEG (`SOFn`)
//! headers so validation never has to decode pixels.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub(crate) const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors from [`read_dimensions`].
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("cannot read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognised or truncated image header")]
    UnknownFormat,
}

/// Read the dimensions of the image at `path`.
pub fn read_dimensions(path: &Path) -> Result<Dimensions, ImageError> {
    let data = std::fs::read(path)?;
    dimensions_from_bytes(&data).ok_or(ImageError::UnknownFormat)
}

/// Read dimensions from in-memory image bytes.
pub fn dimensions_from_bytes(data: &[u8]) -> Option<Dimensions> {
    if data.starts_with(&PNG_SIGNATURE) {
        return png_dimensions(data);
    }
    if data.starts_with(&[0xFF, 0xD8]) {
        return jpeg_dimensions(data);
    }
    None
}

fn png_dimensions(data: &[u8]) -> Option<Dimensions> {
    // signature(8) + chunk length(4) + "IHDR"(4) + width(4) + height(4)
    if data.len() < 24 || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some(Dimensions::new(width, height))
}

fn jpeg_dimensions(data: &[u8]) -> Option<Dimensions> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD9).contains(&marker) {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // len(2) precision(1) height(2) width(2)
            if pos + 9 > data.len() {
                return None;
            }
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            return Some(Dimensions::new(width, height));
        }
        pos += 2 + len;
    }
    None
}

/// MIME type for an image asset, by file extension.
pub fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
