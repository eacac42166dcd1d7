use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;

use crate::detect::backend::{BackendKind, Detector};
use crate::detect::labels::ClassNames;
use crate::detect::result::{RawDetection, RawDetectionSet};
use crate::error::DetectError;
use crate::frame::ImageFrame;

/// Stub backend for testing. Returns a fixed detection set for every frame.
pub struct StubDetector {
    kind: BackendKind,
    detections: Vec<RawDetection>,
    class_names: Option<Arc<ClassNames>>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl StubDetector {
    pub fn new(kind: BackendKind, detections: Vec<RawDetection>) -> Self {
        Self {
            kind,
            detections,
            class_names: None,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_class_names(mut self, names: ClassNames) -> Self {
        self.class_names = Some(Arc::new(names));
        self
    }

    /// Make every `infer` call fail with an inference error.
    pub fn failing(kind: BackendKind, reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::new(kind, Vec::new())
        }
    }

    /// Shared counter of `infer` calls; stays readable after the stub has
    /// been moved into a `ModelHandle`.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn infer(&mut self, _frame: &ImageFrame) -> Result<RawDetectionSet, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.failure {
            return Err(DetectError::Inference(anyhow!("{}", reason)));
        }
        Ok(RawDetectionSet::new(
            self.detections.clone(),
            self.class_names.clone(),
        ))
    }
}
