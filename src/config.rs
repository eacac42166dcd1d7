use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::crop::DEFAULT_JPEG_QUALITY;
use crate::detect::BackendKind;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_YOLO_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_EFFICIENTDET_MODEL_PATH: &str = "efficientdet_d0_coco17_tpu-32/model.onnx";
const DEFAULT_YOLO_INPUT_SIZE: u32 = 640;
const DEFAULT_EFFICIENTDET_INPUT_SIZE: u32 = 512;
const DEFAULT_YOLO_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.7;
const DEFAULT_MAX_DETECTIONS: usize = 300;
const DEFAULT_MIN_SCORE: f32 = 0.7;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_MAX_CONCURRENCY: usize = 1;
const MIN_INPUT_SIZE: u32 = 32;

#[derive(Debug, Deserialize, Default)]
struct ServiceConfigFile {
    api: Option<ApiConfigFile>,
    model: Option<ModelConfigFile>,
    detect: Option<DetectConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
    max_concurrency: Option<usize>,
    cors_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<BackendKind>,
    path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    default_min_score: Option<f32>,
    crop_quality: Option<u8>,
}

/// Model selection and backend post-processing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub backend: BackendKind,
    pub path: PathBuf,
    pub labels_path: Option<PathBuf>,
    /// Square input size frames are resized to before inference.
    pub input_size: u32,
    /// YOLO pre-filter confidence applied before NMS.
    pub confidence: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl ModelSettings {
    pub fn defaults_for(backend: BackendKind) -> Self {
        let (path, input_size) = match backend {
            BackendKind::Yolo => (DEFAULT_YOLO_MODEL_PATH, DEFAULT_YOLO_INPUT_SIZE),
            BackendKind::EfficientDet => {
                (DEFAULT_EFFICIENTDET_MODEL_PATH, DEFAULT_EFFICIENTDET_INPUT_SIZE)
            }
        };
        Self {
            backend,
            path: PathBuf::from(path),
            labels_path: None,
            input_size,
            confidence: DEFAULT_YOLO_CONFIDENCE,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub backend: Option<BackendKind>,
    pub model_path: Option<PathBuf>,
    pub api_addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_addr: String,
    pub max_upload_bytes: usize,
    pub max_concurrency: usize,
    /// Allowed CORS origins; empty means any origin.
    pub cors_origins: Vec<String>,
    pub model: ModelSettings,
    pub default_min_score: f32,
    pub crop_quality: u8,
}

impl ServiceConfig {
    /// Load from the file named by `DETECT_CONFIG` (if any) plus environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok().map(PathBuf::from);
        Self::load_with(config_path.as_deref(), &ConfigOverrides::default())
    }

    /// Layering: file, then `DETECT_*` environment, then `overrides`.
    pub fn load_with(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut file = match config_path {
            Some(path) => read_config_file(path)?,
            None => ServiceConfigFile::default(),
        };
        apply_env(&mut file)?;
        apply_overrides(&mut file, overrides);
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ServiceConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let model_file = file.model.unwrap_or_default();
        let detect = file.detect.unwrap_or_default();

        let backend = model_file.backend.unwrap_or(BackendKind::Yolo);
        let defaults = ModelSettings::defaults_for(backend);
        let model = ModelSettings {
            backend,
            path: model_file.path.unwrap_or(defaults.path),
            labels_path: model_file.labels_path,
            input_size: model_file.input_size.unwrap_or(defaults.input_size),
            confidence: model_file.confidence.unwrap_or(defaults.confidence),
            iou_threshold: model_file.iou_threshold.unwrap_or(defaults.iou_threshold),
            max_detections: model_file.max_detections.unwrap_or(defaults.max_detections),
        };

        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            max_concurrency: api.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
            cors_origins: api.cors_origins.unwrap_or_default(),
            model,
            default_min_score: detect.default_min_score.unwrap_or(DEFAULT_MIN_SCORE),
            crop_quality: detect.crop_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        }
    }

    fn validate(&self) -> Result<()> {
        self.api_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("invalid api address '{}': {}", self.api_addr, e))?;
        if !(0.0..=1.0).contains(&self.default_min_score) {
            return Err(anyhow!("default_min_score must be within [0, 1]"));
        }
        if !(1..=100).contains(&self.crop_quality) {
            return Err(anyhow!("crop_quality must be within 1..=100"));
        }
        if self.max_concurrency == 0 {
            return Err(anyhow!("max_concurrency must be greater than zero"));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        if self.model.input_size < MIN_INPUT_SIZE {
            return Err(anyhow!("model input_size must be at least {}", MIN_INPUT_SIZE));
        }
        if !(0.0..=1.0).contains(&self.model.confidence)
            || !(0.0..=1.0).contains(&self.model.iou_threshold)
        {
            return Err(anyhow!("model confidence and iou_threshold must be within [0, 1]"));
        }
        if self.model.max_detections == 0 {
            return Err(anyhow!("model max_detections must be greater than zero"));
        }
        Ok(())
    }
}

fn apply_env(file: &mut ServiceConfigFile) -> Result<()> {
    let api = file.api.get_or_insert_with(ApiConfigFile::default);
    if let Some(addr) = non_empty_env("DETECT_API_ADDR") {
        api.addr = Some(addr);
    }
    if let Some(limit) = non_empty_env("DETECT_MAX_UPLOAD_BYTES") {
        api.max_upload_bytes = Some(
            limit
                .parse()
                .map_err(|_| anyhow!("DETECT_MAX_UPLOAD_BYTES must be an integer byte count"))?,
        );
    }
    if let Some(limit) = non_empty_env("DETECT_MAX_CONCURRENCY") {
        api.max_concurrency = Some(
            limit
                .parse()
                .map_err(|_| anyhow!("DETECT_MAX_CONCURRENCY must be a positive integer"))?,
        );
    }
    if let Ok(origins) = std::env::var("DETECT_CORS_ORIGINS") {
        let parsed = split_csv(&origins);
        if !parsed.is_empty() {
            api.cors_origins = Some(parsed);
        }
    }

    let model = file.model.get_or_insert_with(ModelConfigFile::default);
    if let Some(backend) = non_empty_env("DETECT_BACKEND") {
        model.backend = Some(backend.parse()?);
    }
    if let Some(path) = non_empty_env("DETECT_MODEL_PATH") {
        model.path = Some(PathBuf::from(path));
    }
    if let Some(path) = non_empty_env("DETECT_LABELS_PATH") {
        model.labels_path = Some(PathBuf::from(path));
    }

    if let Some(score) = non_empty_env("DETECT_MIN_SCORE") {
        let score: f32 = score
            .parse()
            .map_err(|_| anyhow!("DETECT_MIN_SCORE must be a number"))?;
        file.detect
            .get_or_insert_with(DetectConfigFile::default)
            .default_min_score = Some(score);
    }
    Ok(())
}

fn apply_overrides(file: &mut ServiceConfigFile, overrides: &ConfigOverrides) {
    if let Some(addr) = &overrides.api_addr {
        file.api.get_or_insert_with(ApiConfigFile::default).addr = Some(addr.clone());
    }
    let model = file.model.get_or_insert_with(ModelConfigFile::default);
    if let Some(backend) = overrides.backend {
        model.backend = Some(backend);
    }
    if let Some(path) = &overrides.model_path {
        model.path = Some(path.clone());
    }
}

fn read_config_file(path: &Path) -> Result<ServiceConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
