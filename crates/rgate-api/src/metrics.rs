//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Renders run for seconds to tens of minutes.
const RENDER_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0];

/// Install the Prometheus recorder. Worker and queue metrics recorded in
/// other crates land in the same registry.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(names::RENDER_DURATION_SECONDS.to_string()), RENDER_BUCKETS)?
        .set_buckets_for_metric(Matcher::Full(names::FFMPEG_RUN_SECONDS.to_string()), RENDER_BUCKETS)?
        .install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "rgate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "rgate_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "rgate_http_requests_in_flight";

    // Submission metrics
    pub const JOBS_SUBMITTED_TOTAL: &str = "rgate_jobs_submitted_total";
    pub const UPLOADS_TOTAL: &str = "rgate_uploads_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "rgate_upload_bytes_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "rgate_rate_limit_hits_total";

    // Recorded by the worker and media runner
    pub const RENDER_DURATION_SECONDS: &str = "rgate_render_duration_seconds";
    pub const FFMPEG_RUN_SECONDS: &str = "rgate_ffmpeg_run_seconds";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a job accepted by a submission endpoint.
pub fn record_job_submitted(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::JOBS_SUBMITTED_TOTAL, &labels).increment(1);
}

/// Record a stored upload.
pub fn record_upload(size: u64) {
    counter!(names::UPLOADS_TOTAL).increment(1);
    counter!(names::UPLOAD_BYTES_TOTAL).increment(size);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels (job ids, file names).
fn sanitize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut out = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        let parent = if i > 0 { segments[i - 1] } else { "" };
        let replaced = match parent {
            "jobs" if !segment.is_empty() => ":id",
            "uploads" | "outputs" if i == 2 && !segment.is_empty() => ":file",
            _ if is_identifier(segment) => ":id",
            _ => segment,
        };
        out.push(replaced);
    }
    out.join("/")
}

fn is_identifier(segment: &str) -> bool {
    let numeric = !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit());
    let uuid_like = segment.len() == 36
        && segment.bytes().filter(|b| *b == b'-').count() == 4
        && segment.bytes().all(|b| b.is_ascii_hexdigit() || b == b'-');
    numeric || uuid_like
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
