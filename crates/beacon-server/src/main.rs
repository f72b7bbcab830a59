//! # Beacon Server
//!
//! Accepts events over HTTP and pushes them to every connected WebSocket
//! subscriber.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! beacon
//!
//! # Run with custom config
//! beacon --config /path/to/beacon.toml
//!
//! # Run with environment variables
//! BEACON_INGEST_PORT=9080 BEACON_HOST=0.0.0.0 beacon
//!
//! # Submit an event
//! curl -X POST localhost:8080/api/event -d '{"type":"alert","data":{"x":1}}'
//! ```
//!
//! Type `s` on stdin for a status line, `q` to quit.

mod config;
mod console;
mod fanout;
mod ingest;
mod metrics;
mod service;
mod session;
mod subscriptions;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str =
    "beacon=info,beacon_server=info,beacon_core=info,beacon_protocol=info,beacon_transport=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = config_path_from_args(std::env::args().skip(1))?;
    let config = config::Config::load(config_path.as_deref())?;

    info!("Starting Beacon server on {}", config.host);

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let service = service::Service::start(&config).await?;
    info!(
        "Submit events to http://{}{}, subscribe at ws://{}",
        service.ingest_addr(),
        ingest::EVENT_PATH,
        service.subscribe_addr()
    );

    let shutdown = service.shutdown_handle();
    if let Err(e) = console::spawn_stdin_console(
        Arc::clone(service.queue()),
        Arc::clone(service.registry()),
        Arc::clone(&shutdown),
    ) {
        error!("Failed to start console: {}", e);
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.send_replace(true);
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    service.wait().await;
    info!("Beacon stopped");

    Ok(())
}

/// Extract `--config <path>` (or `--config=<path>`) from the arguments.
fn config_path_from_args(mut args: impl Iterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut path = None;
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            match args.next() {
                Some(value) => path = Some(PathBuf::from(value)),
                None => bail!("{arg} requires a path"),
            }
        } else if let Some(value) = arg.strip_prefix("--config=") {
            path = Some(PathBuf::from(value));
        } else {
            bail!("Unknown argument: {arg}");
        }
    }
    Ok(path)
}
