pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod efficientdet;
#[cfg(feature = "backend-tract")]
pub mod yolo;

pub use stub::StubDetector;

#[cfg(feature = "backend-tract")]
pub use efficientdet::EfficientDetBackend;
#[cfg(feature = "backend-tract")]
pub use yolo::YoloBackend;

use anyhow::Result;

use crate::config::ModelSettings;
use crate::detect::backend::Detector;

/// Load the backend selected by `settings`.
#[cfg(feature = "backend-tract")]
pub fn load_detector(settings: &ModelSettings) -> Result<Box<dyn Detector>> {
    use crate::detect::backend::BackendKind;

    let detector: Box<dyn Detector> = match settings.backend {
        BackendKind::Yolo => Box::new(YoloBackend::load(settings)?),
        BackendKind::EfficientDet => Box::new(EfficientDetBackend::load(settings)?),
    };
    Ok(detector)
}

#[cfg(not(feature = "backend-tract"))]
pub fn load_detector(_settings: &ModelSettings) -> Result<Box<dyn Detector>> {
    Err(anyhow::anyhow!("built without the backend-tract feature"))
}
