//! detectd - object detection HTTP service
//!
//! This daemon:
//! 1. Loads the configured detector model once (a failure is reported, not fatal)
//! 2. Serves `/`, `/health`, `/detect` (and `/debug` for YOLO)
//! 3. Stops gracefully on Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use detection_service::{
    api::{ApiConfig, ApiServer},
    config::{ConfigOverrides, ServiceConfig},
    detect::{BackendKind, ModelHandle},
    service::DetectionService,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve YOLO or EfficientDet object detection over HTTP")]
struct Args {
    /// Path to a TOML or JSON config file.
    #[arg(long, env = "DETECT_CONFIG")]
    config: Option<PathBuf>,

    /// Detector backend (yolo or efficientdet).
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Path to the ONNX model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Listen address.
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let overrides = ConfigOverrides {
        backend: args.backend,
        model_path: args.model,
        api_addr: args.addr,
    };
    let config = ServiceConfig::load_with(args.config.as_deref(), &overrides)?;
    log::info!(
        "loading {} model from {}",
        config.model.backend.display_name(),
        config.model.path.display()
    );

    let handle = ModelHandle::load(&config.model);
    if let Some(reason) = handle.load_error() {
        log::warn!("serving without a model; /detect will answer 503 ({})", reason);
    }
    let service = Arc::new(DetectionService::from_config(handle, &config));

    let api_handle = ApiServer::new(ApiConfig::from(&config), service).spawn()?;
    log::info!("detection api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("detectd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
