use anyhow::{anyhow, Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{oneshot, Semaphore};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ServiceConfig;
use crate::detect::BackendKind;
use crate::service::DetectionService;

mod routes;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_upload_bytes: usize,
    pub max_concurrency: usize,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            max_upload_bytes: 16 * 1024 * 1024,
            max_concurrency: 1,
            cors_origins: Vec::new(),
        }
    }
}

impl From<&ServiceConfig> for ApiConfig {
    fn from(cfg: &ServiceConfig) -> Self {
        Self {
            addr: cfg.api_addr.clone(),
            max_upload_bytes: cfg.max_upload_bytes,
            max_concurrency: cfg.max_concurrency,
            cors_origins: cfg.cors_origins.clone(),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections, let in-flight requests finish, and join
    /// the server thread.
    pub fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            // The receiver is gone if the server already exited on its own.
            let _ = shutdown.send(());
        }
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Shared per-process state handed to every route.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) service: Arc<DetectionService>,
    pub(crate) permits: Arc<Semaphore>,
    pub(crate) started: Instant,
}

pub struct ApiServer {
    cfg: ApiConfig,
    service: Arc<DetectionService>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, service: Arc<DetectionService>) -> Self {
        Self { cfg, service }
    }

    /// Bind synchronously (port 0 picks a free port) and serve on a
    /// dedicated thread with its own tokio runtime.
    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid api address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("failed to bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("detect-api")
            .build()
            .context("failed to build api runtime")?;
        let app = router(&self.cfg, self.service);

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let join = std::thread::spawn(move || {
            let served = runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener)?;
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                    })
                    .await
            });
            if let Err(err) = served {
                log::error!("detection api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown: Some(shutdown),
            join: Some(join),
        })
    }
}

fn router(cfg: &ApiConfig, service: Arc<DetectionService>) -> Router {
    let backend = service.handle().backend();
    let state = AppState {
        service,
        permits: Arc::new(Semaphore::new(cfg.max_concurrency.max(1))),
        started: Instant::now(),
    };

    let mut app = Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/detect", post(routes::detect));
    if backend == BackendKind::Yolo {
        app = app.route("/debug", get(routes::debug));
    }
    app.layer(DefaultBodyLimit::max(cfg.max_upload_bytes))
        .layer(cors_layer(&cfg.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("ignoring invalid cors origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}
