//! Collector HTTP service
//!
//! ## Architecture
//!
//! - **Axum** router with one handler per endpoint
//! - **Ingress stages** (see [`middleware`]) wrapped around every route
//! - **Merge engine** shared through [`ApiState`]
//!
//! ## Endpoints
//!
//! - `POST /update/{type}/{name}/{value}` - single update from the path
//! - `POST /update/` - single update as JSON, answers with the stored metric
//! - `POST /updates/` - batch update as a JSON array
//! - `GET /value/{type}/{name}` - stored value as plain text
//! - `POST /value/` - stored metric as JSON
//! - `GET /` - listing of every metric (text or HTML)
//! - `GET /ping` - storage health

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use middleware::IngressSecurity;
pub use state::ApiState;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

/// Largest request body accepted by default (8 MiB)
pub const DEFAULT_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    pub security: IngressSecurity,

    /// Upper bound for request bodies, before and after decoding
    pub body_limit: usize,
}

impl ApiConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            security: IngressSecurity::default(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_security(mut self, security: IngressSecurity) -> Self {
        self.security = security;
        self
    }
}

/// Routes wrapped in the ingress stages
pub fn build_router(state: ApiState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .route("/", get(routes::list::list_metrics))
        .route("/ping", get(routes::ping::ping))
        .route("/update/", post(routes::update::update_json))
        .route(
            "/update/:kind/:name/:value",
            post(routes::update::update_from_path),
        )
        .route("/updates/", post(routes::update::update_batch))
        .route("/value/", post(routes::value::post_value))
        .route("/value/:kind/:name", get(routes::value::get_value))
        // caps the body handlers see, i.e. after gzip inflation
        .layer(DefaultBodyLimit::max(config.body_limit))
        .with_state(state);

    middleware::apply_stages(router, &config.security, config.body_limit)
        .layer(RequestBodyLimitLayer::new(config.body_limit))
}

/// A running collector HTTP server
pub struct ApiServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ApiServer {
    /// Address the server actually listens on
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and wait up to `timeout` for in-flight
    /// requests to finish
    ///
    /// On timeout the serve task is aborted. Connections still running after
    /// that can only reach storage that is about to be closed; closed backends
    /// refuse their updates.
    pub async fn shutdown(mut self, timeout: Duration) -> anyhow::Result<()> {
        self.cancel.cancel();

        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!("API server did not drain within {timeout:?}, aborting");
                self.task.abort();
                match self.task.await {
                    Err(e) if !e.is_cancelled() => return Err(e.into()),
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

/// Spawn the API server
///
/// This binds the listener and serves in a background task.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<ApiServer> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!(
        "API server listening on {addr} (stages: {:?})",
        config.security.active_stages()
    );

    Ok(serve(listener, addr, app))
}

fn serve(listener: tokio::net::TcpListener, addr: SocketAddr, app: Router) -> ApiServer {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        {
            error!("API server error: {e}");
        }
    });

    ApiServer { addr, cancel, task }
}
