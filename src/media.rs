use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::io::Reader as ImageReader;
use thiserror::Error;
use tracing::info;

const MAX_INLINE_BYTES: usize = 3_500_000;
const MAX_EDGE: u32 = 2048;
const JPEG_QUALITY: u8 = 80;

pub const ACCEPTED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("image is empty")]
    Empty,
    #[error("could not process image: {0}")]
    Image(#[from] image::ImageError),
    #[error("could not read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Photo ready to be sent inline.
#[derive(Debug)]
pub struct PreparedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, MediaError> {
    // Browsers hand over data URLs; keep only the payload.
    let payload = match data.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => data,
    };
    Ok(general_purpose::STANDARD.decode(payload.trim())?)
}

/// Validate the photo and shrink it when it is too large to send inline.
pub fn prepare_image(mime_type: &str, bytes: Vec<u8>) -> Result<PreparedImage, MediaError> {
    let mut mime_type = mime_type.trim().to_ascii_lowercase();
    if !ACCEPTED_IMAGE_TYPES.contains(&mime_type.as_str()) {
        return Err(MediaError::UnsupportedType(mime_type));
    }
    // Gemini only knows the registered name.
    if mime_type == "image/jpg" {
        mime_type = "image/jpeg".to_string();
    }
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }

    if bytes.len() <= MAX_INLINE_BYTES {
        return Ok(PreparedImage { mime_type, bytes });
    }

    info!(size = bytes.len(), "compressing image");

    let img = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()?
        .decode()?;

    let img = img.thumbnail(MAX_EDGE, MAX_EDGE);
    let mut buf = Vec::new();
    img.write_to(
        &mut Cursor::new(&mut buf),
        image::ImageOutputFormat::Jpeg(JPEG_QUALITY),
    )?;

    Ok(PreparedImage {
        mime_type: "image/jpeg".to_string(),
        bytes: buf,
    })
}
