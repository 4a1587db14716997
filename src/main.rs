//! Dispatch gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                   DISPATCH GATEWAY                   │
//!                          │                                                      │
//!     Client Request       │  ┌──────────┐   ┌────────────┐   ┌───────────────┐   │
//!     ─────────────────────┼─▶│   http   │──▶│  static    │──▶│  static origin│───┼──▶ Origin
//!                          │  │  server  │   │  content   │   └───────────────┘   │
//!                          │  └──────────┘   └─────┬──────┘                       │
//!                          │                       │ gateway                      │
//!                          │                       ▼                              │
//!                          │                ┌─────────────┐                       │
//!                          │                │  endpoints  │                       │
//!                          │                └──┬───────┬──┘                       │
//!                          │          aggregate│       │sse                       │
//!                          │                   ▼       ▼                          │
//!                          │        ┌──────────────┐ ┌──────────────┐           │
//!                          │        │ fan-out +    │ │ keep-alive + │───────────┼──▶ Backends
//!                          │        │ combiner     │ │ line relay   │           │
//!                          │        └──────────────┘ └──────────────┘           │
//!                          │                                                      │
//!                          │  config · routing · security · observability ·       │
//!                          │  lifecycle                                           │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use dispatch_gateway::config::{load_config, GatewayConfig};
use dispatch_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use dispatch_gateway::net::load_tls_config;
use dispatch_gateway::observability::{logging, metrics};
use dispatch_gateway::HttpServer;

/// How long open connections may drain once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "dispatch-gateway", version, about = "Static, SSE and aggregating API gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dispatch-gateway starting");
    tracing::info!(
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        endpoints = config.endpoints.len(),
        static_routes = config.static_content.routes.len(),
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    let server_rx = shutdown.subscribe();
    let mut drain_rx = shutdown.subscribe();
    spawn_signal_handler(shutdown.clone());

    let addr: SocketAddr = config.listener.bind_address.parse()?;
    let tls = match &config.listener.tls {
        Some(tls) => Some(load_tls_config(tls).await?),
        None => None,
    };
    let server = HttpServer::new(config)?;

    let mut serving = match tls {
        Some(tls) => tokio::spawn(server.run_tls(addr, tls, server_rx)),
        None => {
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            tokio::spawn(server.run(listener, server_rx))
        }
    };

    tokio::select! {
        result = &mut serving => result??,
        _ = drain_rx.recv() => match tokio::time::timeout(SHUTDOWN_GRACE, &mut serving).await {
            Ok(result) => result??,
            Err(_) => tracing::warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Connections still open after grace period, exiting"
            ),
        },
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
