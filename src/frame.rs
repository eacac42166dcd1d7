//! Decoded request images.
//!
//! An `ImageFrame` is created once per request from the uploaded bytes and is
//! read-only from then on. Backends, the normalizer and the cropper all borrow
//! it; nothing keeps it past the end of the request.

use image::RgbImage;

use crate::error::DetectError;

/// Decoded RGB image plus its pixel dimensions.
///
/// There is no mutable accessor; the pixel buffer is fixed at decode time.
#[derive(Debug)]
pub struct ImageFrame {
    image: RgbImage,
}

impl ImageFrame {
    /// Decode uploaded bytes (any format the `image` crate was built with)
    /// and convert to 8-bit RGB.
    pub fn decode(bytes: &[u8]) -> Result<Self, DetectError> {
        if bytes.is_empty() {
            return Err(DetectError::Decode("empty upload".to_string()));
        }
        let decoded = image::load_from_memory(bytes)?;
        let frame = Self::from_rgb(decoded.to_rgb8());
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectError::Decode(format!(
                "image has zero area ({}x{})",
                frame.width(),
                frame.height()
            )));
        }
        Ok(frame)
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Read-only view of the pixels.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 200, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_and_reports_dimensions() {
        let frame = ImageFrame::decode(&png_bytes(7, 3)).unwrap();
        assert_eq!(frame.width(), 7);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.image().get_pixel(6, 2), &Rgb([10, 200, 30]));
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = ImageFrame::decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DetectError::Decode(_)));
    }

    #[test]
    fn rejects_empty_upload() {
        let err = ImageFrame::decode(&[]).unwrap_err();
        assert!(err.to_string().contains("empty upload"));
    }
}
