//! Image encoding: `DynamicImage` → JPEG → base64 data-URI.
//!
//! The endpoint accepts images as base64 data-URIs embedded in the JSON
//! request body. Pages are encoded as JPEG at quality 95: rendered document
//! pages compress an order of magnitude smaller than PNG, and at this
//! quality the artefacts sit below what the vision model can distinguish
//! from rendering noise.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Fixed JPEG quality for all page encodes.
pub const JPEG_QUALITY: u8 = 95;

/// A page image ready for the API: a `data:image/jpeg;base64,…` URI.
#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub data_uri: String,
}

impl EncodedPage {
    /// Wrap already-encoded JPEG bytes in a data-URI.
    pub fn from_jpeg(bytes: &[u8]) -> Self {
        let b64 = STANDARD.encode(bytes);
        debug!("encoded image → {} bytes base64", b64.len());
        Self {
            data_uri: format!("data:image/jpeg;base64,{b64}"),
        }
    }
}

/// Encode a rendered page as JPEG bytes at [`JPEG_QUALITY`].
///
/// pdfium hands back RGBA bitmaps; JPEG has no alpha channel, so the image
/// is flattened to RGB first.
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    let encoder = JpegEncoder::new_with_quality(&mut cursor, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Encode a rendered page straight to an [`EncodedPage`].
pub fn encode_page(img: &DynamicImage) -> Result<EncodedPage, image::ImageError> {
    Ok(EncodedPage::from_jpeg(&encode_jpeg(img)?))
}
