//! Local transcription API server.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                  LOOPBACK API                    │
//!                       │                                                  │
//!   Client (127.0.0.1)  │  ┌─────────┐   ┌────────────┐   ┌───────────┐    │
//!   ────────────────────┼─▶│   net   │──▶│    http    │──▶│  routing  │    │
//!                       │  │listener │   │ request +  │   │  router   │    │
//!                       │  └─────────┘   │ multipart  │   └─────┬─────┘    │
//!                       │                └────────────┘         │          │
//!                       │                                       ▼          │
//!                       │  ┌──────────┐                  ┌────────────┐    │
//!   ◀───────────────────┼──│ response │◀─────────────────│    api     │    │
//!                       │  └──────────┘                  │  handlers  │    │
//!                       │                                └─────┬──────┘    │
//!                       │                                      ▼           │
//!                       │                        ModelService / Transcriber│
//!                       │                                                  │
//!                       │   config · lifecycle · observability             │
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use loopback_api::api::{self, ModelCatalog, OfflineTranscriber, Services};
use loopback_api::config::{self, validate_config, ConfigError};
use loopback_api::http::ApiServer;
use loopback_api::lifecycle::{signals, Shutdown};
use loopback_api::net::Listener;
use loopback_api::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "loopback-api", version, about = "Local HTTP API for on-device transcription")]
struct Args {
    /// TOML configuration file; defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override listener.bind_address (must be loopback)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<String>,

    /// Override observability.log_level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = config::load_or_default(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "loopback-api starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        max_body_size = config.limits.max_body_size,
        multipart_mode = ?config.limits.multipart_mode,
        read_timeout_secs = config.timeouts.read_secs,
        handler_timeout_secs = config.timeouts.handler_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let services = Services::new(Arc::new(ModelCatalog::new()), Arc::new(OfflineTranscriber))
        .with_multipart_mode(config.limits.multipart_mode);
    let router = api::build_router(Arc::new(services));
    tracing::info!(routes = ?router.routes(), "Routes registered");

    let listener = Listener::bind(&config.listener).await?;
    let server = ApiServer::new(&config, router);

    let shutdown = Arc::new(Shutdown::new());
    let signal = shutdown.subscribe();
    tokio::spawn({
        let shutdown = Arc::clone(&shutdown);
        async move { signals::shutdown_on_signal(&shutdown).await }
    });

    server.run(listener, signal).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
