//! Server-side crops of accepted detections.
//!
//! Each crop is independent: a failure is returned as a `CropError` for that
//! one detection and the caller attaches it to the record instead of failing
//! the response.

use std::fmt;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops;
use thiserror::Error;

use crate::frame::ImageFrame;

/// JPEG quality used for crops unless configured otherwise.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, Error)]
pub enum CropError {
    #[error("degenerate crop box [{left}, {top}, {right}, {bottom}] has zero area")]
    Degenerate {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    },

    #[error("crop box [{left}, {top}, {right}, {bottom}] exceeds image bounds {width}x{height}")]
    OutOfBounds {
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
        width: u32,
        height: u32,
    },

    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A JPEG crop wrapped as a `data:` URI, ready for an `<img src>`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data_uri: String,
}

impl EncodedImage {
    fn from_jpeg(jpeg: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(jpeg);
        Self {
            data_uri: format!("{DATA_URI_PREFIX}{payload}"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.data_uri
    }

    pub fn into_data_uri(self) -> String {
        self.data_uri
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("len", &self.data_uri.len())
            .finish()
    }
}

/// Cut `[left, top, right, bottom]` out of the frame and encode it as JPEG.
pub fn crop_and_encode(
    frame: &ImageFrame,
    pixel_box: [u32; 4],
    quality: u8,
) -> Result<EncodedImage, CropError> {
    let [left, top, right, bottom] = pixel_box;
    if right <= left || bottom <= top {
        return Err(CropError::Degenerate {
            left,
            top,
            right,
            bottom,
        });
    }
    let (width, height) = (frame.width(), frame.height());
    if right > width || bottom > height {
        return Err(CropError::OutOfBounds {
            left,
            top,
            right,
            bottom,
            width,
            height,
        });
    }

    let region = imageops::crop_imm(frame.image(), left, top, right - left, bottom - top).to_image();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&region)?;
    Ok(EncodedImage::from_jpeg(&jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn frame() -> ImageFrame {
        ImageFrame::from_rgb(RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * 6) as u8, (y * 8) as u8, 128])
        }))
    }

    fn decode_payload(encoded: &EncodedImage) -> image::DynamicImage {
        let payload = encoded.as_str().strip_prefix(DATA_URI_PREFIX).unwrap();
        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        image::load_from_memory(&jpeg).unwrap()
    }

    #[test]
    fn crop_is_a_jpeg_data_uri_of_the_box_size() {
        let encoded = crop_and_encode(&frame(), [5, 10, 25, 30], DEFAULT_JPEG_QUALITY).unwrap();
        assert!(encoded.as_str().starts_with("data:image/jpeg;base64,"));

        let decoded = decode_payload(&encoded);
        assert_eq!(decoded.dimensions(), (20, 20));
    }

    #[test]
    fn degenerate_box_is_an_error() {
        let err = crop_and_encode(&frame(), [12, 0, 12, 20], DEFAULT_JPEG_QUALITY).unwrap_err();
        assert!(matches!(err, CropError::Degenerate { left: 12, right: 12, .. }));

        let err = crop_and_encode(&frame(), [0, 9, 10, 3], DEFAULT_JPEG_QUALITY).unwrap_err();
        assert!(matches!(err, CropError::Degenerate { .. }));
    }

    #[test]
    fn box_outside_image_is_an_error() {
        let err = crop_and_encode(&frame(), [0, 0, 41, 10], DEFAULT_JPEG_QUALITY).unwrap_err();
        assert!(err.to_string().contains("exceeds image bounds 40x30"));
    }

    #[test]
    fn full_frame_crop_succeeds() {
        let encoded = crop_and_encode(&frame(), [0, 0, 40, 30], 50).unwrap();
        assert_eq!(decode_payload(&encoded).dimensions(), (40, 30));
    }
}
