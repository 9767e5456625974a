//! HTTP adapter for the rate limiter.
//!
//! The limiter itself knows nothing about HTTP; this module turns verdicts
//! into status codes and headers and exposes the limiter as a small JSON API.

mod server;
mod service;
mod shaper;

pub use server::HttpServer;
pub use service::{router, ActionRequest, ApiError, AppState, ErrorResponse, HealthResponse};
pub use shaper::{
    retry_after_secs, ResetFormat, ResponseShaper, ShapedResponse, X_RATELIMIT_LIMIT,
    X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
