//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the upload and health handlers
//! - Wire up middleware in a fixed order
//! - Bind the server to a listener and drain on shutdown
//!
//! # Middleware Order (outermost first)
//! ```text
//! metrics → request id → trace → timeout → rate limit → security headers
//!     → CORS → static files → markup sanitizer → operator check → routes
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::InvalidHeaderValue, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::http::request::{propagate_request_id, set_request_id, RequestSpan};
use crate::lifecycle::Shutdown;
use crate::observability::metrics::track_requests;
use crate::sanitize::{reject_operator_keys, sanitize_markup, SanitizeState};
use crate::security::{
    cors_layer, rate_limit_middleware, security_headers_middleware, RateLimiterState,
    SecurityHeaders,
};
use crate::static_files::{serve_static, StaticResolver};
use crate::upload::{upload_router, UploadService};

/// Failures while assembling the server from configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("upload directory unavailable: {0}")]
    UploadDir(#[source] io::Error),

    #[error("static root unavailable: {0}")]
    StaticRoot(#[source] io::Error),

    #[error("invalid header value in configuration: {0}")]
    Header(#[from] InvalidHeaderValue),
}

/// The HTTP front of the service.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Build the server. Creates the upload directory if it is missing.
    pub async fn new(config: AppConfig) -> Result<Self, ServerError> {
        let upload = Arc::new(UploadService::new(&config.upload).map_err(ServerError::UploadDir)?);
        upload
            .storage
            .ensure_dir()
            .await
            .map_err(ServerError::UploadDir)?;
        tracing::info!(dir = %upload.storage.dir().display(), "Upload directory ready");

        let resolver = Arc::new(
            StaticResolver::new(&config.static_files.root).map_err(ServerError::StaticRoot)?,
        );

        let router = Self::build_router(&config, upload, resolver)?;
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(
        config: &AppConfig,
        upload: Arc<UploadService>,
        resolver: Arc<StaticResolver>,
    ) -> Result<Router, ServerError> {
        let sanitize = Arc::new(SanitizeState::new(&config.security));

        let routes = Router::new()
            .route("/health", get(health))
            .merge(upload_router(upload, &config.upload))
            .fallback(not_found);

        // Router::layer runs after routing; the sanitizers rewrite the path, so
        // everything below wraps the routes as one service instead.
        let mut router = Router::new()
            .fallback_service(routes)
            .layer(from_fn_with_state(sanitize.clone(), reject_operator_keys))
            .layer(from_fn_with_state(sanitize, sanitize_markup))
            .layer(from_fn_with_state(resolver, serve_static))
            .layer(cors_layer(&config.cors)?);

        if config.security.enable_headers {
            let headers = Arc::new(SecurityHeaders::new(&config.security)?);
            router = router.layer(from_fn_with_state(headers, security_headers_middleware));
        }

        if config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiterState::new(&config.rate_limit));
            router = router.layer(from_fn_with_state(limiter, rate_limit_middleware));
        }

        Ok(router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
            .layer(set_request_id())
            .layer(from_fn(track_requests)))
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` is triggered, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" })))
}
