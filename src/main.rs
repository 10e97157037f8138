//! Web request pipeline (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ trace ─▶ request id ─▶ request context
//!                                              │
//!                                              ▼
//!                    ┌──────────── filter chain ────────────┐
//!                    │  RemoteIpFilter (/*) ─▶ XSSFilter (/*) │
//!                    └──────────────────┬────────────────────┘
//!                                       ▼
//!                        path match policy ─▶ route lookup
//!                                       │
//!                                       ▼
//!                    negotiation (mediaType=json|xml, default JSON)
//!                                       │
//!                                       ▼
//!   Client Response ◀── serializer (dates yyyy-MM-dd HH:mm:ss.SSS, pretty, UTF-8)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use web_pipeline::lifecycle::startup;
use web_pipeline::observability::{logging, metrics};
use web_pipeline::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "web-pipeline")]
#[command(about = "HTTP request pipeline with filters, negotiation and JSON/XML rendering", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = startup::load(cli.config.as_deref())?;
    logging::init(&config.observability);

    tracing::info!("web-pipeline v{} starting", env!("CARGO_PKG_VERSION"));

    if cli.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
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

    // Build the whole pipeline before binding so a bad config never accepts traffic.
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
