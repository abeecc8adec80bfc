//! Axum HTTP API server for the render gateway.
//!
//! This crate provides:
//! - Upload, execute and job-status endpoints over the in-process queue
//! - A JSON error envelope for every failure path
//! - Rate limiting, security headers and request ids
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorEnvelope};
pub use routes::create_router;
pub use state::AppState;
