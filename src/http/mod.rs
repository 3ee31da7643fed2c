//! HTTP layer: the standalone decision API and embeddable middleware.

mod middleware;
mod server;
mod service;

pub use middleware::{client_addr, rate_limit_middleware, RateLimitState};
pub use server::HttpServer;
pub use service::{check_handler, health_handler, AppState, CheckRequest, CheckResponse};
