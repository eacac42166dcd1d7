//! Object Detection Service
//!
//! This crate serves pretrained object-detection models (YOLOv8 and
//! EfficientDet, both as ONNX) behind a small HTTP interface.
//!
//! # Pipeline
//!
//! One request flows through four stages, in this order:
//!
//! 1. **Decode**: upload bytes become an [`ImageFrame`].
//! 2. **Detect**: the process-wide [`ModelHandle`] runs its backend and
//!    returns a [`RawDetectionSet`] whose boxes carry their coordinate space.
//! 3. **Normalize**: [`normalize()`] filters by `min_score` and produces
//!    uniform [`DetectionRecord`]s (normalized box, pixel box, center point).
//! 4. **Crop** (optional): [`crop_and_encode`] renders each accepted box as a
//!    JPEG data URI; failures stay attached to their own record.
//!
//! # Module Structure
//!
//! - `detect`: backends, YOLO/EfficientDet tensor decoding, NMS, labels
//! - `normalize`, `crop`, `record`: post-processing and the wire format
//! - `service`: the pipeline around a shared model handle
//! - `api`: axum server with spawn/stop lifecycle
//! - `config`: layered file + environment configuration

pub mod api;
pub mod config;
pub mod crop;
pub mod detect;
pub mod error;
pub mod frame;
pub mod normalize;
pub mod record;
pub mod service;

pub use crop::{crop_and_encode, CropError, EncodedImage, DEFAULT_JPEG_QUALITY};
pub use detect::{
    BackendKind, ClassNames, Detector, ModelHandle, RawBox, RawDetection, RawDetectionSet,
    StubDetector,
};
pub use error::DetectError;
pub use frame::ImageFrame;
pub use normalize::normalize;
pub use record::{DetectionRecord, DetectionResponse, OriginalSize};
pub use service::{DetectOptions, DetectionService};
