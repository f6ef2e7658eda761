//! JPEG inspection for staged images.

use crate::dataset::hasher::hash_bytes;
use crate::error::ApiError;
use crate::types::ContentHash;
use std::fs;
use std::path::{Path, PathBuf};

/// What the dataset needs to know about an image before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub hash: ContentHash,
    pub size: u64,
    pub width: u32,
    pub height: u32,
}

/// Reads `path`, checks it is a JPEG and extracts its dimensions.
pub fn inspect(path: &Path) -> Result<ImageInfo, ApiError> {
    let invalid = |reason: &str| ApiError::InvalidImage {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if path.is_dir() {
        return Err(invalid("is a directory"));
    }
    let bytes = fs::read(path).map_err(|e| invalid(&format!("cannot be read: {}", e)))?;
    let (width, height) = jpeg_dimensions(&bytes).ok_or_else(|| invalid("not a JPEG image"))?;

    Ok(ImageInfo {
        path: path.to_path_buf(),
        hash: hash_bytes(&bytes),
        size: bytes.len() as u64,
        width,
        height,
    })
}

/// Width and height from the first start-of-frame segment.
pub fn jpeg_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // Markers without a length field
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if length < 2 {
            return None;
        }

        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // length(2) precision(1) height(2) width(2)
            let segment = bytes.get(pos + 4..pos + 9)?;
            let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
            let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
            return Some((width, height));
        }
        if marker == 0xDA {
            // Start of scan before any frame header.
            return None;
        }
        pos += 2 + length;
    }
    None
}

/// Smallest byte sequence `jpeg_dimensions` accepts, for tests and fixtures.
#[doc(hidden)]
pub fn minimal_jpeg(width: u16, height: u16, salt: u8) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    // APP0 segment carrying the salt so different fixtures hash differently.
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x03, salt]);
    // SOF0: length 11, precision 8, height, width, 1 component.
    bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08]);
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}
