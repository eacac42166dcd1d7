use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::DetectError;
use crate::frame::ImageFrame;

use super::result::RawDetectionSet;

/// Which pretrained model family serves the process.
///
/// Chosen once at startup; never switched per request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Yolo,
    #[serde(alias = "efficient_det", alias = "effdet")]
    EfficientDet,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Yolo => "yolo",
            BackendKind::EfficientDet => "efficientdet",
        }
    }

    /// Human-facing model family name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Yolo => "YOLO",
            BackendKind::EfficientDet => "EfficientDet",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yolo" | "yolov8" => Ok(BackendKind::Yolo),
            "efficientdet" | "efficient_det" | "effdet" => Ok(BackendKind::EfficientDet),
            other => Err(anyhow!(
                "unknown backend '{}' (expected 'yolo' or 'efficientdet')",
                other
            )),
        }
    }
}

/// Detector backend trait.
///
/// A backend wraps one loaded model. `infer` takes `&mut self` so runtimes
/// that are not safe for concurrent inference are serialized by the owning
/// [`super::ModelHandle`].
///
/// Implementations must not keep the frame past the call and must not decode
/// images themselves; the caller hands over a validated `ImageFrame`.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn kind(&self) -> BackendKind;

    /// Run the model on one frame.
    fn infer(&mut self, frame: &ImageFrame) -> Result<RawDetectionSet, DetectError>;

    /// Optional warm-up hook, run once after loading.
    fn warm_up(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
