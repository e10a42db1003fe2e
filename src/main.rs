//! Development reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                    DEV PROXY                      │
//!   Client Request   │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   │
//!   ─────────────────┼─▶│listener │──▶│  server  │──▶│  RouteTable  │   │
//!                    │  └─────────┘   └──────────┘   └──────┬───────┘   │
//!                    │                     no match         │ match     │
//!                    │               ┌──────────┐           ▼           │
//!                    │               │ fallback │    ┌──────────────┐   │
//!                    │               └──────────┘    │ PathRewriter │   │
//!                    │                               └──────┬───────┘   │
//!                    │                   standard ┌─────────┴──────┐    │
//!                    │                            ▼         upgrade ▼   │
//!                    │                     ┌───────────┐ ┌───────────┐  │
//!   Client Response  │                     │ Forwarder │ │  Bridge   │  │
//!   ◀────────────────┼─────────────────────┤           │ │           │──┼──▶ Backend
//!                    │                     └─────┬─────┘ └─────┬─────┘  │
//!                    │                           └──▶ dialer ◀─┘        │
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use dev_proxy::lifecycle::startup::{self, Overrides};
use dev_proxy::lifecycle::{signals, Shutdown};
use dev_proxy::observability::logging;
use dev_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "dev-proxy")]
#[command(about = "Development server reverse proxy with WebSocket bridging", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind, overriding the config file.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory served for requests no route matches.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = Overrides {
        host: cli.host,
        port: cli.port,
        static_dir: cli.static_dir,
        log_level: cli.log_level.clone(),
    };

    let loaded = startup::load(cli.config.as_deref(), overrides);
    let log_level = match &loaded {
        Ok(config) => config.observability.log_level.clone(),
        Err(_) => cli.log_level.unwrap_or_else(|| "info".to_string()),
    };
    logging::init(&log_level);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    tracing::info!("dev-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let routes = startup::compile_routes(&config)?;
    tracing::info!(
        bind_address = %config.server.bind_address(),
        routes = routes.len(),
        static_dir = ?config.server.static_dir,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, routes);
    if let Err(e) = server.bind_and_run(shutdown.subscribe()).await {
        tracing::error!(error = %e, "Server failed");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
