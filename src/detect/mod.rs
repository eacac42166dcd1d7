mod backend;
mod backends;
mod decode;
mod handle;
mod labels;
mod nms;
mod result;

pub use backend::{BackendKind, Detector};
pub use backends::{load_detector, StubDetector};
#[cfg(feature = "backend-tract")]
pub use backends::{EfficientDetBackend, YoloBackend};
pub use decode::{decode_efficientdet, decode_yolov8, Letterbox, YoloDecodeParams};
pub use handle::ModelHandle;
pub use labels::{ClassNames, COCO80};
pub use nms::{nms, Candidate};
pub use result::{RawBox, RawDetection, RawDetectionSet};
