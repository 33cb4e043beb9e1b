//! PNG and data-URI encoding helpers.

use crate::result::{VisperfError, VisperfResult};
use base64::Engine;
use image::{ImageEncoder, ImageFormat, RgbaImage};

/// Prefix of a base64 PNG data URI
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Decode PNG bytes into an RGBA buffer
///
/// # Errors
///
/// Returns `DecodeError` if the bytes are not a valid PNG
pub fn decode_png(bytes: &[u8]) -> VisperfResult<RgbaImage> {
    if bytes.is_empty() {
        return Err(VisperfError::decode("image buffer is empty"));
    }
    image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map(|img| img.to_rgba8())
        .map_err(|e| VisperfError::decode(format!("invalid PNG: {e}")))
}

/// Encode an RGBA buffer as PNG
///
/// Encoder settings are fixed so the same pixels always produce the same bytes.
///
/// # Errors
///
/// Returns `EncodeError` if the encoder rejects the buffer
pub fn encode_png(img: &RgbaImage) -> VisperfResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new_with_quality(
        &mut buffer,
        image::codecs::png::CompressionType::Default,
        image::codecs::png::FilterType::Adaptive,
    );
    encoder
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| VisperfError::encode(e.to_string()))?;
    Ok(buffer)
}

/// Wrap PNG bytes in a `data:image/png;base64,` URI
#[must_use]
pub fn to_data_uri(png: &[u8]) -> String {
    let mut uri = String::with_capacity(PNG_DATA_URI_PREFIX.len() + png.len() * 4 / 3 + 4);
    uri.push_str(PNG_DATA_URI_PREFIX);
    base64::engine::general_purpose::STANDARD.encode_string(png, &mut uri);
    uri
}

/// Decode either a PNG data URI or bare base64 into raw bytes
///
/// # Errors
///
/// Returns `DecodeError` if the payload is not valid base64
pub fn from_data_uri(payload: &str) -> VisperfResult<Vec<u8>> {
    let data = payload
        .trim()
        .strip_prefix(PNG_DATA_URI_PREFIX)
        .unwrap_or_else(|| payload.trim());
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| VisperfError::decode(format!("invalid base64 image payload: {e}")))
}
