//! Encoded still images and raster-to-JPEG conversion.

use crate::error::CameraError;
use bytes::Bytes;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::fmt;

/// MIME type of every frame produced by the capture adapter.
pub const JPEG_MIME: &str = "image/jpeg";

/// Opaque, cheaply clonable handle to one encoded still image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageHandle {
    bytes: Bytes,
    mime_type: &'static str,
    width: u32,
    height: u32,
}

impl ImageHandle {
    /// Wrap already-encoded bytes.
    pub fn new(bytes: impl Into<Bytes>, mime_type: &'static str, width: u32, height: u32) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type,
            width,
            height,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Encode an RGB raster to JPEG.
///
/// # Errors
///
/// Returns [`CameraError::EmptyFrame`] for a zero-sized raster and
/// [`CameraError::CaptureFailed`] if the encoder rejects the pixels.
pub fn encode_jpeg(raster: &RgbImage, quality: u8) -> Result<ImageHandle, CameraError> {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(CameraError::EmptyFrame);
    }

    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .write_image(raster.as_raw(), width, height, ExtendedColorType::Rgb8)
        .map_err(|e| CameraError::CaptureFailed(format!("JPEG encode: {e}")))?;

    Ok(ImageHandle::new(buf, JPEG_MIME, width, height))
}
