//! Response assembly: decode → infer → normalize → optional crops.

use crate::config::ServiceConfig;
use crate::crop::crop_and_encode;
use crate::detect::ModelHandle;
use crate::error::DetectError;
use crate::frame::ImageFrame;
use crate::normalize::normalize;
use crate::record::{DetectionResponse, OriginalSize};

/// Per-request knobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectOptions {
    pub crop: bool,
    pub min_score: f32,
}

/// The detection pipeline around one shared, read-only model handle.
pub struct DetectionService {
    handle: ModelHandle,
    crop_quality: u8,
    default_min_score: f32,
}

impl DetectionService {
    pub fn new(handle: ModelHandle, crop_quality: u8, default_min_score: f32) -> Self {
        Self {
            handle,
            crop_quality,
            default_min_score,
        }
    }

    pub fn from_config(handle: ModelHandle, cfg: &ServiceConfig) -> Self {
        Self::new(handle, cfg.crop_quality, cfg.default_min_score)
    }

    pub fn handle(&self) -> &ModelHandle {
        &self.handle
    }

    pub fn default_options(&self) -> DetectOptions {
        DetectOptions {
            crop: false,
            min_score: self.default_min_score,
        }
    }

    /// Full request path on raw upload bytes.
    ///
    /// Model availability is checked before the image is decoded, and decode
    /// failures never reach the backend.
    pub fn detect(
        &self,
        image_bytes: &[u8],
        opts: DetectOptions,
    ) -> Result<DetectionResponse, DetectError> {
        self.handle.ensure_loaded()?;
        let frame = ImageFrame::decode(image_bytes)?;
        self.detect_frame(&frame, opts)
    }

    pub fn detect_frame(
        &self,
        frame: &ImageFrame,
        opts: DetectOptions,
    ) -> Result<DetectionResponse, DetectError> {
        let raw = self.handle.infer(frame)?;
        let mut detections = normalize(&raw, frame, opts.min_score);
        log::debug!(
            "{} of {} raw detections accepted at min_score {}",
            detections.len(),
            raw.len(),
            opts.min_score
        );

        if opts.crop {
            for record in &mut detections {
                let outcome = crop_and_encode(frame, record.box_pixels, self.crop_quality);
                if let Err(err) = &outcome {
                    log::debug!("crop failed for class {}: {}", record.class_id, err);
                }
                record.attach_crop(outcome);
            }
        }

        Ok(DetectionResponse {
            detections,
            original_size: OriginalSize {
                width: frame.width(),
                height: frame.height(),
            },
        })
    }
}
