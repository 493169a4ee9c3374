//! Artifact encoding: canvas buffer → PNG bytes, PNG bytes → data URI.
//!
//! PNG keeps text edges crisp, which matters more on a card than file size.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;
use tracing::debug;

pub const PNG_MEDIA_TYPE: &str = "image/png";

/// Encode a canvas as PNG.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    debug!("Encoded {}x{} canvas → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Pixel dimensions read from an encoded image header.
pub fn encoded_dimensions(bytes: &[u8]) -> Result<(u32, u32), image::ImageError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
}

/// `data:<media_type>;base64,<payload>` for embedding in HTML or JSON.
pub fn data_uri(media_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", media_type, STANDARD.encode(bytes))
}
