#![cfg(feature = "backend-tract")]

use std::sync::Arc;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::config::ModelSettings;
use crate::detect::backend::{BackendKind, Detector};
use crate::detect::decode::{decode_yolov8, Letterbox, YoloDecodeParams};
use crate::detect::labels::ClassNames;
use crate::detect::result::RawDetectionSet;
use crate::error::DetectError;
use crate::frame::ImageFrame;

/// Tract-based backend for YOLOv8 ONNX exports.
///
/// Frames are letterboxed into the square model input; decoded boxes are
/// unpadded and scaled back to original-image pixel corners.
pub struct YoloBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    class_names: Arc<ClassNames>,
    /// Class count from the model's own metadata, when it carries one.
    head_classes: Option<usize>,
    confidence: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl YoloBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    ///
    /// Class names are read from the exporter's `names` metadata property,
    /// then from the configured labels file, then the built-in COCO list.
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        let path = &settings.path;
        let onnx = tract_onnx::onnx();
        let proto = onnx
            .proto_model_for_path(path)
            .with_context(|| format!("failed to read ONNX model from {}", path.display()))?;
        let metadata_names = proto
            .metadata_props
            .iter()
            .find(|prop| prop.key == "names")
            .and_then(|prop| ClassNames::from_yolo_metadata(&prop.value));

        let size = settings.input_size as usize;
        let model = onnx
            .model_for_proto_model(&proto)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let head_classes = metadata_names.as_ref().map(ClassNames::len);
        let class_names = match (metadata_names, &settings.labels_path) {
            (Some(names), _) => names,
            (None, Some(labels)) => ClassNames::from_file(labels, 0)?,
            (None, None) => ClassNames::coco80(),
        };
        log::info!(
            "yolo model {} ready ({}x{} input, {} classes)",
            path.display(),
            size,
            size,
            class_names.len()
        );

        Ok(Self {
            model,
            input_size: settings.input_size,
            class_names: Arc::new(class_names),
            head_classes,
            confidence: settings.confidence,
            iou_threshold: settings.iou_threshold,
            max_detections: settings.max_detections,
        })
    }

    fn build_input(&self, frame: &ImageFrame) -> Tensor {
        let size = self.input_size;
        let letterbox = Letterbox::fit(frame.width(), frame.height(), size);
        let resized = imageops::resize(
            frame.image(),
            letterbox.new_width,
            letterbox.new_height,
            FilterType::Triangle,
        );
        let pad = Letterbox::PAD_VALUE as f32 / 255.0;
        let size = size as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            let (x, y) = (x as u32, y as u32);
            if !letterbox.contains(x, y) {
                return pad;
            }
            resized.get_pixel(x - letterbox.pad_x, y - letterbox.pad_y)[channel] as f32 / 255.0
        })
        .into_tensor()
    }
}

impl Detector for YoloBackend {
    fn name(&self) -> &'static str {
        "tract-yolov8"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Yolo
    }

    fn infer(&mut self, frame: &ImageFrame) -> Result<RawDetectionSet, DetectError> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")
            .map_err(DetectError::Inference)?;
        let output = outputs
            .first()
            .ok_or_else(|| DetectError::output_shape("model produced no outputs"))?;
        let data = output
            .as_slice::<f32>()
            .map_err(|_| DetectError::output_shape("model output tensor was not f32"))?;

        let params = YoloDecodeParams {
            confidence: self.confidence,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
            input_size: self.input_size,
            image_width: frame.width(),
            image_height: frame.height(),
            num_classes: self.head_classes,
        };
        let detections = decode_yolov8(data, output.shape(), &params)?;
        Ok(RawDetectionSet::new(
            detections,
            Some(self.class_names.clone()),
        ))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = ImageFrame::from_rgb(image::RgbImage::new(self.input_size, self.input_size));
        self.infer(&blank)?;
        Ok(())
    }
}
