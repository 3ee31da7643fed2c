use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use gatelimit::config::GatelimitConfig;
use gatelimit::http::{AppState, HttpServer};
use gatelimit::ratelimit::{spawn_sweeper, PolicyTable, SlidingWindowLimiter};

#[derive(Parser, Debug)]
#[command(name = "gatelimit")]
#[command(about = "Sliding-window HTTP rate limiting service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Gatelimit Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let mut config = match args.config {
        Some(ref path) => GatelimitConfig::from_file(path)?,
        None => GatelimitConfig::default(),
    };
    if let Some(addr) = args.listen_addr {
        config.server.http_addr = addr;
    }
    info!(http_addr = %config.server.http_addr, "Configuration loaded");

    // Validate policies up front so misconfigured limits fail at startup
    let policies = PolicyTable::from_config(&config.policies)?;
    info!(categories = policies.len(), "Rate limit policies validated");

    // Initialize the rate limiter and the idle-key sweeper
    let limiter = Arc::new(SlidingWindowLimiter::new());
    let sweeper = spawn_sweeper(
        Arc::clone(&limiter),
        Duration::from_secs(config.server.sweep_interval_secs),
    );
    info!(
        sweep_interval_secs = config.server.sweep_interval_secs,
        "Rate limiter initialized"
    );

    // Create and start the HTTP server
    let state = AppState::new(limiter, Arc::new(RwLock::new(policies)));
    let server = HttpServer::new(config.server.http_addr, state);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.abort();
    info!("Gatelimit Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
