//! HTTP server for the standalone decision API.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tracing::{error, info};

use super::service::{check_handler, health_handler, AppState};
use crate::error::Result;

/// HTTP server exposing the rate limit decision API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared application state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Build the router for the decision API.
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/healthz", get(health_handler))
            .route("/v1/check", post(check_handler))
            .with_state(state)
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server for rate limit decision API");

        axum::serve(listener, Self::router(self.state))
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            "Starting HTTP server for rate limit decision API with graceful shutdown"
        );

        axum::serve(listener, Self::router(self.state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}
