#![cfg(feature = "backend-tract")]

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::config::ModelSettings;
use crate::detect::backend::{BackendKind, Detector};
use crate::detect::decode::decode_efficientdet;
use crate::detect::labels::ClassNames;
use crate::detect::result::RawDetectionSet;
use crate::error::DetectError;
use crate::frame::ImageFrame;

const BOXES_OUTPUT: &str = "detection_boxes";
const CLASSES_OUTPUT: &str = "detection_classes";
const SCORES_OUTPUT: &str = "detection_scores";

/// Tract-based backend for an ONNX conversion of the EfficientDet detection
/// graph (uint8 NHWC input, normalized `(ymin, xmin, ymax, xmax)` boxes).
pub struct EfficientDetBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    boxes_idx: usize,
    classes_idx: usize,
    scores_idx: usize,
    class_names: Option<Arc<ClassNames>>,
}

impl EfficientDetBackend {
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        let path = &settings.path;
        let size = settings.input_size as usize;
        let typed = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to load ONNX model from {}", path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(u8::datum_type(), tvec!(1, size, size, 3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?;

        let boxes_idx = output_index(&typed, BOXES_OUTPUT)?;
        let classes_idx = output_index(&typed, CLASSES_OUTPUT)?;
        let scores_idx = output_index(&typed, SCORES_OUTPUT)?;
        let model = typed
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        // EfficientDet reports COCO-91 ids starting at 1.
        let class_names = match &settings.labels_path {
            Some(labels) => Some(Arc::new(ClassNames::from_file(labels, 1)?)),
            None => None,
        };
        log::info!(
            "efficientdet model {} ready ({}x{} input)",
            path.display(),
            size,
            size
        );

        Ok(Self {
            model,
            input_size: settings.input_size,
            boxes_idx,
            classes_idx,
            scores_idx,
            class_names,
        })
    }

    fn build_input(&self, frame: &ImageFrame) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(frame.image(), size, size, FilterType::Triangle);
        let size = size as usize;
        tract_ndarray::Array4::from_shape_fn((1, size, size, 3), |(_, y, x, channel)| {
            resized.get_pixel(x as u32, y as u32)[channel]
        })
        .into_tensor()
    }
}

/// Locate a graph output by name, ignoring a `:N` tensor suffix.
fn output_index(model: &TypedModel, name: &str) -> Result<usize> {
    let outlets = model.output_outlets()?;
    outlets
        .iter()
        .position(|outlet| {
            let label = model
                .outlet_label(*outlet)
                .unwrap_or_else(|| model.node(outlet.node).name.as_str());
            let base = label.split(':').next().unwrap_or(label);
            base == name
        })
        .ok_or_else(|| anyhow!("model does not expose a '{}' output", name))
}

fn output_values(outputs: &TVec<TValue>, idx: usize, name: &str) -> Result<Vec<f32>, DetectError> {
    let value = outputs
        .get(idx)
        .ok_or_else(|| DetectError::output_shape(format!("missing '{}' output", name)))?;
    let as_f32 = value
        .cast_to::<f32>()
        .map_err(|e| DetectError::output_shape(format!("'{}' is not numeric: {}", name, e)))?;
    let slice = as_f32
        .as_slice::<f32>()
        .map_err(|e| DetectError::output_shape(format!("'{}' unreadable: {}", name, e)))?;
    Ok(slice.to_vec())
}

impl Detector for EfficientDetBackend {
    fn name(&self) -> &'static str {
        "tract-efficientdet"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::EfficientDet
    }

    fn infer(&mut self, frame: &ImageFrame) -> Result<RawDetectionSet, DetectError> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")
            .map_err(DetectError::Inference)?;

        let boxes = output_values(&outputs, self.boxes_idx, BOXES_OUTPUT)?;
        let classes = output_values(&outputs, self.classes_idx, CLASSES_OUTPUT)?;
        let scores = output_values(&outputs, self.scores_idx, SCORES_OUTPUT)?;
        let detections = decode_efficientdet(&boxes, &classes, &scores)?;
        Ok(RawDetectionSet::new(detections, self.class_names.clone()))
    }
}
