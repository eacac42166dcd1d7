use std::sync::Arc;

use super::labels::ClassNames;

/// Box as reported by a backend, tagged with its coordinate space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RawBox {
    /// Absolute pixel corners in the original image.
    Pixel { x1: f32, y1: f32, x2: f32, y2: f32 },
    /// Corners as fractions of the image size, `(ymin, xmin, ymax, xmax)`.
    /// Values may slightly exceed [0, 1] at image edges.
    Normalized {
        ymin: f32,
        xmin: f32,
        ymax: f32,
        xmax: f32,
    },
}

/// One raw detection from a backend.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: RawBox,
    pub class_id: i64,
    pub score: f32,
}

impl RawDetection {
    pub fn pixel(x1: f32, y1: f32, x2: f32, y2: f32, class_id: i64, score: f32) -> Self {
        Self {
            bbox: RawBox::Pixel { x1, y1, x2, y2 },
            class_id,
            score,
        }
    }

    pub fn normalized(
        ymin: f32,
        xmin: f32,
        ymax: f32,
        xmax: f32,
        class_id: i64,
        score: f32,
    ) -> Self {
        Self {
            bbox: RawBox::Normalized {
                ymin,
                xmin,
                ymax,
                xmax,
            },
            class_id,
            score,
        }
    }
}

/// Output of one `Detector::infer` call.
///
/// `class_names` is `Some` only for backends that know their label map.
#[derive(Clone, Debug, Default)]
pub struct RawDetectionSet {
    pub detections: Vec<RawDetection>,
    pub class_names: Option<Arc<ClassNames>>,
}

impl RawDetectionSet {
    pub fn new(detections: Vec<RawDetection>, class_names: Option<Arc<ClassNames>>) -> Self {
        Self {
            detections,
            class_names,
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
