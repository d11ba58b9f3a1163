use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use std::path::Path;

use crate::providers::ImagePayload;

/// Reads an image from disk for an image-based search. Files over
/// `max_bytes` are rejected; the format is sniffed from the bytes.
pub fn load_image(path: &Path, max_bytes: usize) -> Result<ImagePayload> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read the image file {}", path.display()))?;
    if metadata.len() > max_bytes as u64 {
        bail!(
            "Image file is too large. Please upload an image under {}MB.",
            max_bytes / (1024 * 1024)
        );
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read the image file {}", path.display()))?;
    encode_image(&bytes, max_bytes)
}

pub fn encode_image(bytes: &[u8], max_bytes: usize) -> Result<ImagePayload> {
    if bytes.len() > max_bytes {
        bail!(
            "Image file is too large. Please upload an image under {}MB.",
            max_bytes / (1024 * 1024)
        );
    }

    let format = image::guess_format(bytes)
        .map_err(|e| anyhow!("Unsupported image file: {}", e))?;

    Ok(ImagePayload {
        mime_type: format.to_mime_type().to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}
