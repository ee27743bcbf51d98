//! Decoding of uploaded images.

use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageDecodeError {
    #[error("image data is empty")]
    Empty,

    #[error("unsupported or unrecognized image format")]
    UnsupportedFormat,

    #[error("cannot decode {format:?} data: {reason}")]
    Corrupt { format: ImageFormat, reason: String },

    #[error("cannot re-encode image as PNG: {0}")]
    Transcode(String),

    #[error("decoder task failed: {0}")]
    Task(String),
}

/// A fully decoded upload, ready to send to the model.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Encoding detected from the upload's magic bytes.
    pub source_format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// MIME type of `data`.
    pub mime_type: &'static str,
    /// Bytes shipped to the model: the original upload, or a PNG transcode
    /// when the source encoding is not accepted upstream.
    pub data: Vec<u8>,
}

impl DecodedImage {
    pub fn was_transcoded(&self) -> bool {
        forwardable_mime(self.source_format).is_none()
    }
}

/// Decode raw upload bytes.
///
/// Every image is decoded in full, so truncated or corrupt data fails here
/// rather than upstream.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }

    let format = image::guess_format(bytes).map_err(|_| ImageDecodeError::UnsupportedFormat)?;

    let img = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        ImageDecodeError::Corrupt {
            format,
            reason: e.to_string(),
        }
    })?;

    let (mime_type, data) = match forwardable_mime(format) {
        Some(mime) => (mime, bytes.to_vec()),
        None => ("image/png", encode_png(&img)?),
    };

    Ok(DecodedImage {
        source_format: format,
        width: img.width(),
        height: img.height(),
        mime_type,
        data,
    })
}

/// Run [`decode_image`] on the blocking pool.
pub async fn decode_image_blocking(bytes: axum::body::Bytes) -> Result<DecodedImage, ImageDecodeError> {
    tokio::task::spawn_blocking(move || decode_image(&bytes))
        .await
        .map_err(|e| ImageDecodeError::Task(e.to_string()))?
}

/// Formats Gemini accepts as inline data without conversion.
fn forwardable_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ImageDecodeError> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| ImageDecodeError::Transcode(e.to_string()))?;
    Ok(buffer.into_inner())
}
