use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::anyhow;

use crate::config::ModelSettings;
use crate::error::DetectError;
use crate::frame::ImageFrame;

use super::backend::{BackendKind, Detector};
use super::backends::load_detector;
use super::result::RawDetectionSet;

enum ModelState {
    Loaded(Mutex<Box<dyn Detector>>),
    Unavailable(String),
}

/// Process-wide model handle.
///
/// Loaded once at startup and never reloaded. A load failure is kept as a
/// persistent unavailable state (with its reason) instead of being raised, so
/// the service stays reachable for health checks. The detector sits behind a
/// `Mutex` because `Detector::infer` takes `&mut self`.
pub struct ModelHandle {
    backend: BackendKind,
    model_path: PathBuf,
    state: ModelState,
}

impl ModelHandle {
    /// Load the configured backend. Never fails; check [`Self::is_loaded`].
    pub fn load(settings: &ModelSettings) -> Self {
        let loaded = load_detector(settings).and_then(|mut detector| {
            detector.warm_up()?;
            Ok(detector)
        });
        match loaded {
            Ok(detector) => {
                log::info!(
                    "{} model loaded from {} ({})",
                    settings.backend.display_name(),
                    settings.path.display(),
                    detector.name()
                );
                Self::from_detector(settings.path.clone(), detector)
            }
            Err(err) => {
                log::error!(
                    "failed to load {} model from {}: {:#}",
                    settings.backend.display_name(),
                    settings.path.display(),
                    err
                );
                Self::unavailable(settings.backend, settings.path.clone(), format!("{:#}", err))
            }
        }
    }

    /// Wrap an already constructed detector.
    pub fn from_detector(model_path: impl Into<PathBuf>, detector: Box<dyn Detector>) -> Self {
        Self {
            backend: detector.kind(),
            model_path: model_path.into(),
            state: ModelState::Loaded(Mutex::new(detector)),
        }
    }

    pub fn unavailable(
        backend: BackendKind,
        model_path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            model_path: model_path.into(),
            state: ModelState::Unavailable(reason.into()),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    pub fn load_error(&self) -> Option<&str> {
        match &self.state {
            ModelState::Loaded(_) => None,
            ModelState::Unavailable(reason) => Some(reason),
        }
    }

    /// Fails fast with `ModelUnavailable` when nothing is loaded.
    pub fn ensure_loaded(&self) -> Result<(), DetectError> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(DetectError::ModelUnavailable {
                backend: self.backend.display_name(),
            })
        }
    }

    /// Run inference on one frame, serialized against other requests.
    pub fn infer(&self, frame: &ImageFrame) -> Result<RawDetectionSet, DetectError> {
        let detector = match &self.state {
            ModelState::Loaded(detector) => detector,
            ModelState::Unavailable(_) => {
                return Err(DetectError::ModelUnavailable {
                    backend: self.backend.display_name(),
                })
            }
        };
        let mut guard = detector
            .lock()
            .map_err(|_| DetectError::Inference(anyhow!("detector lock poisoned")))?;
        guard.infer(frame)
    }
}
