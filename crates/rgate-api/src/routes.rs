//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use rgate_storage::{OUTPUTS_PREFIX, UPLOADS_PREFIX};

use crate::error::ApiError;
use crate::handlers::{execute, execute_plan, get_job, health, plan_schema, upload};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, json_error_responses, rate_limit_middleware, request_id, request_logging, security_headers,
    ClientRateLimiter,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = ClientRateLimiter::per_second(state.config.rate_limit_rps);

    let api_routes = Router::new()
        .route("/upload", post(upload))
        .route("/execute", post(execute))
        .route("/execute-plan", post(execute_plan))
        .route("/jobs/:id", get(get_job))
        .route("/plan-schema", get(plan_schema))
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    // Health stays outside the rate limiter
    let health_routes = Router::new().route("/api/health", get(health));

    let static_routes = Router::new()
        .nest_service(UPLOADS_PREFIX, ServeDir::new(state.uploads.dir()))
        .nest_service(OUTPUTS_PREFIX, ServeDir::new(state.outputs.dir()));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(static_routes)
        .merge(metrics_routes)
        .fallback(route_not_found)
        // Uploads are bounded by MAX_UPLOAD_SIZE rather than axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_size))
        .layer(middleware::from_fn(json_error_responses))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
