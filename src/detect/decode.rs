//! Tensor decoding for the two model families.
//!
//! These functions work on flat `f32` slices plus shapes so they stay
//! independent of the inference runtime. Any layout they do not recognise is
//! reported as `DetectError::OutputShape`; they never fall back to an empty
//! result.

use crate::error::DetectError;

use super::nms::{nms, Candidate};
use super::result::RawDetection;

/// Post-processing knobs for a YOLOv8 detection head.
#[derive(Clone, Copy, Debug)]
pub struct YoloDecodeParams {
    /// Pre-filter confidence applied before NMS.
    pub confidence: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Square model input size the frame was letterboxed into.
    pub input_size: u32,
    pub image_width: u32,
    pub image_height: u32,
    /// Class count the head is known to carry (from the model's own
    /// metadata). Used to tell the two head layouts apart; without it the
    /// exporter's channel-major layout is assumed.
    pub num_classes: Option<usize>,
}

/// Aspect-preserving resize of an image into a centred square, padded on
/// the short side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub new_width: u32,
    pub new_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Padding value YOLO checkpoints were trained with.
    pub const PAD_VALUE: u8 = 114;

    pub fn fit(image_width: u32, image_height: u32, input_size: u32) -> Self {
        let longest = image_width.max(image_height).max(1);
        let scale = input_size as f32 / longest as f32;
        let resized = |side: u32| ((side as f32 * scale).round() as u32).clamp(1, input_size.max(1));
        let new_width = resized(image_width);
        let new_height = resized(image_height);
        Self {
            scale,
            new_width,
            new_height,
            pad_x: input_size.saturating_sub(new_width) / 2,
            pad_y: input_size.saturating_sub(new_height) / 2,
        }
    }

    /// Map a model-input x coordinate back onto the original image.
    pub fn unmap_x(&self, x: f32) -> f32 {
        (x - self.pad_x as f32) / self.scale
    }

    pub fn unmap_y(&self, y: f32) -> f32 {
        (y - self.pad_y as f32) / self.scale
    }

    /// Whether input pixel `(x, y)` falls inside the resized image.
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.pad_x
            && x < self.pad_x + self.new_width
            && y >= self.pad_y
            && y < self.pad_y + self.new_height
    }
}

/// Decode a YOLOv8 head of shape `[1, 4 + classes, anchors]` into pixel
/// boxes in original-image coordinates.
///
/// Rows are `cx, cy, w, h` followed by per-class scores. A transposed
/// `[1, anchors, 4 + classes]` head is accepted when `num_classes` says so.
pub fn decode_yolov8(
    data: &[f32],
    shape: &[usize],
    params: &YoloDecodeParams,
) -> Result<Vec<RawDetection>, DetectError> {
    if shape.len() != 3 || shape[0] != 1 {
        return Err(DetectError::output_shape(format!(
            "expected YOLO output of shape [1, C, N], got {:?}",
            shape
        )));
    }
    let transposed = match params.num_classes {
        Some(classes) if shape[1] == 4 + classes => false,
        Some(classes) if shape[2] == 4 + classes => true,
        Some(classes) => {
            return Err(DetectError::output_shape(format!(
                "YOLO output {:?} has no axis of {} channels (4 box + {} classes)",
                shape,
                4 + classes,
                classes
            )))
        }
        None => false,
    };
    let (channels, anchors) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if channels <= 4 {
        return Err(DetectError::output_shape(format!(
            "YOLO output has {} channels, need at least 5",
            channels
        )));
    }
    if data.len() != channels * anchors {
        return Err(DetectError::output_shape(format!(
            "YOLO output holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            channels * anchors
        )));
    }

    let at = |channel: usize, anchor: usize| -> f32 {
        if transposed {
            data[anchor * channels + channel]
        } else {
            data[channel * anchors + anchor]
        }
    };

    let letterbox = Letterbox::fit(params.image_width, params.image_height, params.input_size);
    let max_x = params.image_width as f32;
    let max_y = params.image_height as f32;

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_idx, score) = (4..channels)
            .map(|c| (c - 4, at(c, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if !score.is_finite() || score < params.confidence {
            continue;
        }

        let cx = at(0, anchor);
        let cy = at(1, anchor);
        let w = at(2, anchor);
        let h = at(3, anchor);
        candidates.push(Candidate {
            x1: letterbox.unmap_x(cx - w / 2.0).clamp(0.0, max_x),
            y1: letterbox.unmap_y(cy - h / 2.0).clamp(0.0, max_y),
            x2: letterbox.unmap_x(cx + w / 2.0).clamp(0.0, max_x),
            y2: letterbox.unmap_y(cy + h / 2.0).clamp(0.0, max_y),
            score,
            class_id: class_idx as i64,
        });
    }

    Ok(nms(candidates, params.iou_threshold, params.max_detections)
        .into_iter()
        .map(|c| RawDetection::pixel(c.x1, c.y1, c.x2, c.y2, c.class_id, c.score))
        .collect())
}

/// Zip the EfficientDet `detection_boxes` `[1, N, 4]`, `detection_classes`
/// `[1, N]` and `detection_scores` `[1, N]` outputs.
pub fn decode_efficientdet(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
) -> Result<Vec<RawDetection>, DetectError> {
    if boxes.len() % 4 != 0 {
        return Err(DetectError::output_shape(format!(
            "detection_boxes holds {} values, not a multiple of 4",
            boxes.len()
        )));
    }
    let count = boxes.len() / 4;
    if classes.len() != count || scores.len() != count {
        return Err(DetectError::output_shape(format!(
            "EfficientDet outputs disagree: {} boxes, {} classes, {} scores",
            count,
            classes.len(),
            scores.len()
        )));
    }

    Ok(boxes
        .chunks_exact(4)
        .zip(classes.iter().zip(scores))
        .map(|(b, (&class, &score))| {
            RawDetection::normalized(b[0], b[1], b[2], b[3], class as i64, score)
        })
        .collect())
}
