//! Upload Shield
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ metrics ─▶ request id ─▶ trace ─▶ timeout
//!                                                         │
//!                     ┌───────────────────────────────────┘
//!                     ▼
//!                rate limit ─▶ security headers ─▶ CORS
//!                                                   │
//!                     ┌─────────────────────────────┘
//!                     ▼
//!               static files ──(hit)──▶ file stream
//!                     │
//!                     ▼ (miss)
//!            markup sanitizer ─▶ operator check ──(hit)──▶ 400
//!                                     │
//!                                     ▼
//!                      /upload ─▶ storage ─▶ validator ─▶ 201 | 400
//!                      /health
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use upload_shield::config::loader::{load_config, ConfigError};
use upload_shield::config::validation::validate_config;
use upload_shield::config::AppConfig;
use upload_shield::lifecycle::signals::shutdown_signal;
use upload_shield::observability::{logging, metrics};
use upload_shield::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "upload-shield")]
#[command(about = "Hardened HTTP backend for validated image uploads", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "UPLOAD_SHIELD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding `listener.bind_address`.
    #[arg(short, long, env = "BIND_ADDRESS")]
    bind: Option<String>,
}

fn load(cli: &Cli) -> Result<AppConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init(&config.observability);
    tracing::info!("upload-shield v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        static_root = %config.static_files.root,
        upload_dir = %config.upload.dir,
        rate_limit = config.rate_limit.enabled,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    let server = HttpServer::new(config).await?;
    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
