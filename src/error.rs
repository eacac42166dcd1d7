use thiserror::Error;

/// Request-level failures of the detection pipeline.
///
/// Every variant rejects the whole request. Per-detection crop failures are
/// reported through [`crate::crop::CropError`] instead and never abort a
/// response.
#[derive(Debug, Error)]
pub enum DetectError {
    /// The model failed to load at startup; inference is never attempted.
    #[error("{backend} model not loaded on server")]
    ModelUnavailable { backend: &'static str },

    /// Uploaded bytes are not a decodable image.
    #[error("invalid image: {0}")]
    Decode(String),

    /// The multipart body did not carry an `image` field.
    #[error("missing multipart field 'image'")]
    MissingImage,

    /// A request parameter could not be interpreted.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Backend output tensors were missing or did not have the expected layout.
    #[error("malformed model output: {0}")]
    OutputShape(String),

    /// The backend failed while running the model.
    #[error("inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),
}

impl DetectError {
    pub fn output_shape(msg: impl Into<String>) -> Self {
        DetectError::OutputShape(msg.into())
    }

    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        DetectError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

impl From<image::ImageError> for DetectError {
    fn from(err: image::ImageError) -> Self {
        DetectError::Decode(err.to_string())
    }
}
