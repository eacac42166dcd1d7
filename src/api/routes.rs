use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use super::AppState;
use crate::detect::BackendKind;
use crate::error::DetectError;
use crate::service::DetectOptions;

/// A failed request: status plus a `{"detail": ...}` body.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        let status = match &err {
            DetectError::ModelUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DetectError::Decode(_) => StatusCode::BAD_REQUEST,
            DetectError::MissingImage | DetectError::InvalidParameter { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DetectError::OutputShape(_) | DetectError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::warn!("detect request failed ({}): {}", self.status, self.detail);
        } else {
            log::debug!("detect request rejected ({}): {}", self.status, self.detail);
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub(crate) async fn root() -> Json<Value> {
    Json(json!({ "status": "Server running fine" }))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<Value> {
    let handle = state.service.handle();
    match handle.backend() {
        BackendKind::Yolo => Json(json!({ "yolo_model_loaded": handle.is_loaded() })),
        BackendKind::EfficientDet => Json(json!({
            "model_loaded": handle.is_loaded(),
            "model_path": handle.model_path().display().to_string(),
        })),
    }
}

pub(crate) async fn debug(State(state): State<AppState>) -> Json<Value> {
    let handle = state.service.handle();
    let env: BTreeMap<String, String> = std::env::vars()
        .filter(|(key, _)| key.starts_with("DETECT_"))
        .collect();
    let cwd = std::env::current_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|err| format!("unavailable: {}", err));
    let parallelism = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "pid": std::process::id(),
        "cwd": cwd,
        "os": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "available_parallelism": parallelism,
        "uptime_secs": state.started.elapsed().as_secs(),
        "backend": handle.backend().as_str(),
        "model_path": handle.model_path().display().to_string(),
        "model_loaded": handle.is_loaded(),
        "load_error": handle.load_error(),
        "env": env,
    }))
}

#[derive(Default)]
struct DetectForm {
    image: Option<Bytes>,
    crop: Option<String>,
    min_score: Option<String>,
}

pub(crate) async fn detect(
    State(state): State<AppState>,
    query: Option<Query<HashMap<String, String>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    // Availability is checked before any of the body is read.
    state.service.handle().ensure_loaded()?;

    let mut multipart = multipart
        .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
    let form = read_form(&mut multipart).await?;
    let query = query.map(|Query(q)| q).unwrap_or_default();

    let crop = match form.crop.as_deref().or(query.get("crop").map(String::as_str)) {
        Some(raw) => parse_bool("crop", raw)?,
        None => false,
    };
    let min_score = match form
        .min_score
        .as_deref()
        .or(query.get("min_score").map(String::as_str))
    {
        Some(raw) => parse_score("min_score", raw)?,
        None => state.service.default_options().min_score,
    };
    let image = form.image.ok_or(DetectError::MissingImage)?;

    let _permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "server shutting down"))?;
    let service = state.service.clone();
    let opts = DetectOptions { crop, min_score };
    let response = tokio::task::spawn_blocking(move || service.detect(&image, opts))
        .await
        .map_err(|err| {
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("detection task failed: {}", err),
            )
        })??;

    let body = serde_json::to_value(&response).map_err(|err| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    })?;
    Ok(Json(body))
}

async fn read_form(multipart: &mut Multipart) -> Result<DetectForm, ApiError> {
    let mut form = DetectForm::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(ApiError::new(err.status(), err.body_text())),
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" if form.image.is_none() => {
                form.image = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| ApiError::new(err.status(), err.body_text()))?,
                );
            }
            "crop" | "min_score" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| ApiError::new(err.status(), err.body_text()))?;
                if name == "crop" {
                    form.crop = Some(text);
                } else {
                    form.min_score = Some(text);
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

pub(crate) fn parse_bool(name: &'static str, raw: &str) -> Result<bool, DetectError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(DetectError::invalid_parameter(
            name,
            format!("'{}' is not a boolean", raw),
        )),
    }
}

pub(crate) fn parse_score(name: &'static str, raw: &str) -> Result<f32, DetectError> {
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|_| DetectError::invalid_parameter(name, format!("'{}' is not a number", raw)))?;
    if !value.is_finite() {
        return Err(DetectError::invalid_parameter(name, "must be finite"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans_accept_common_spellings() {
        for raw in ["true", "TRUE", "1", "yes", "On"] {
            assert!(parse_bool("crop", raw).unwrap(), "{raw}");
        }
        for raw in ["false", "0", "No", "off"] {
            assert!(!parse_bool("crop", raw).unwrap(), "{raw}");
        }
        assert!(matches!(
            parse_bool("crop", "maybe"),
            Err(DetectError::InvalidParameter { name: "crop", .. })
        ));
    }

    #[test]
    fn scores_must_be_finite_numbers() {
        assert_eq!(parse_score("min_score", " 0.25 ").unwrap(), 0.25);
        assert!(parse_score("min_score", "abc").is_err());
        assert!(parse_score("min_score", "NaN").is_err());
        assert!(parse_score("min_score", "inf").is_err());
    }

    #[test]
    fn errors_map_to_http_statuses() {
        let status = |err: DetectError| ApiError::from(err).status;
        assert_eq!(
            status(DetectError::ModelUnavailable { backend: "YOLO" }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(DetectError::Decode("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(DetectError::MissingImage), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            status(DetectError::invalid_parameter("crop", "nope")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status(DetectError::output_shape("no boxes")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
