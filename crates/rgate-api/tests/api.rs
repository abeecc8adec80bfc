//! API integration tests against the real router and queue actor.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use rgate_api::{create_router, ApiConfig, AppState};
use rgate_media::{FfmpegInfo, FfmpegRunner};
use rgate_models::{EngineId, JobId};
use rgate_queue::{JobQueue, QueueConfig, QueueHandle};
use rgate_storage::{LocalStore, MemoryErrorStore, StorageConfig};
use rgate_worker::{ErrorHandler, ExecutorDeps, JobExecutor, RetryPolicy, SourceFetcher, WorkerConfig};

const BOUNDARY: &str = "rgate-test-boundary";

struct TestApp {
    tmp: TempDir,
    storage: StorageConfig,
    queue: QueueHandle,
    router: Router,
}

fn test_app() -> TestApp {
    test_app_with(ApiConfig::default())
}

fn test_app_with(config: ApiConfig) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let storage = StorageConfig::rooted(tmp.path());
    let (queue, _task) = JobQueue::spawn(QueueConfig::default());
    let state = AppState::new(config, queue.clone(), &storage, FfmpegInfo::unavailable());
    TestApp {
        router: create_router(state, None),
        tmp,
        storage,
        queue,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn upload(&self, filename: &str, data: &[u8]) -> Response<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: video/mp4\r\n\r\n",
                b = BOUNDARY,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}

async fn json_body(response: Response<Body>) -> Value {
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(
        content_type.starts_with("application/json"),
        "expected JSON, got {:?}",
        content_type
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn plan_json() -> Value {
    json!({
        "plan_id": "plan-42",
        "project_id": "proj-7",
        "output_format": { "width": 640, "height": 360 },
        "timeline": [
            {
                "segment_id": "s1",
                "trim_start_ms": 0,
                "trim_end_ms": 2000,
                "timeline_start_ms": 0,
                "timeline_end_ms": 2000,
                "output_duration_ms": 2000
            }
        ]
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let response = app.get("/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["ffmpeg"]["available"], false);
    assert_eq!(body["queueLength"], 0);
    assert!(body["currentJob"].is_null());
    assert!(body["uploadsDir"].as_str().unwrap().ends_with("uploads"));
    assert!(body["outputsDir"].as_str().unwrap().ends_with("outputs"));
    assert!(body["time"].is_string());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = test_app();
    let response = app
        .send(
            Request::builder()
                .uri("/api/health")
                .header("X-Request-ID", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_execute_plan_queues_in_order() {
    let app = test_app();
    let request = json!({
        "sourceVideoUrl": "https://cdn.example.com/source.mp4",
        "plan": plan_json(),
        "outputName": "promo"
    });

    let first = app.post_json("/api/execute-plan", request.clone()).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let first = json_body(first).await;
    assert_eq!(first["ok"], true);
    assert_eq!(first["status"], "queued");
    assert_eq!(first["queuePosition"], 0);
    let job_id = first["jobId"].as_str().unwrap().to_string();
    assert_eq!(first["statusUrl"], format!("/api/jobs/{}", job_id));

    let second = json_body(app.post_json("/api/execute-plan", request).await).await;
    assert_eq!(second["queuePosition"], 1);

    let status = app.get(&format!("/api/jobs/{}", job_id)).await;
    assert_eq!(status.status(), StatusCode::OK);
    let status = json_body(status).await;
    assert_eq!(status["ok"], true);
    assert_eq!(status["jobId"], job_id.as_str());
    assert_eq!(status["status"], "queued");
    assert_eq!(status["progressPct"], 0);
    assert!(status["createdAt"].is_string());

    let claimed = app.queue.claim().await.unwrap();
    assert_eq!(claimed.job.id, JobId::from_string(job_id));
    assert_eq!(
        claimed.plan.source_video_url.as_deref(),
        Some("https://cdn.example.com/source.mp4")
    );
    assert_eq!(claimed.output_name.as_deref(), Some("promo"));
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = test_app();
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/execute-plan")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "INPUT_ERROR");
}

#[tokio::test]
async fn test_missing_content_type_is_input_error() {
    let app = test_app();
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/execute")
                .body(Body::from(r#"{"sourcePath":"x.mp4"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "INPUT_ERROR");
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = test_app();
    let response = app.get("/api/jobs/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unknown_route_and_missing_file_are_json() {
    let app = test_app();

    let response = app.get("/api/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");

    let response = app.get("/outputs/missing.mp4").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_wrong_method_is_json() {
    let app = test_app();
    let response = app.get("/api/execute").await;
    assert!(response.status().is_client_error());
    let body = json_body(response).await;
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn test_plan_schema() {
    let app = test_app();
    let response = app.get("/api/plan-schema").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert!(body["schema"]["properties"]["timeline"].is_object());
}

#[tokio::test]
async fn test_upload_then_execute() {
    let app = test_app();

    let response = app.upload("clip.mp4", b"not really a video").await;
    assert_eq!(response.status(), StatusCode::OK);
    let uploaded = json_body(response).await;
    assert_eq!(uploaded["ok"], true);
    assert_eq!(uploaded["filename"], "clip.mp4");
    assert_eq!(uploaded["mimetype"], "video/mp4");
    assert_eq!(uploaded["size"], 18);
    let file_path = uploaded["filePath"].as_str().unwrap().to_string();
    assert!(file_path.starts_with("/uploads/"));
    assert!(file_path.ends_with(".mp4"));

    let served = app.get(uploaded["publicUrl"].as_str().unwrap()).await;
    assert_eq!(served.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(served.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"not really a video");

    let response = app
        .post_json(
            "/api/execute",
            json!({
                "sourcePath": file_path,
                "trim": { "startMs": 500, "endMs": 2500 },
                "resize": { "width": 640, "height": 360 },
                "audio": { "mute": true }
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = json_body(response).await;
    assert_eq!(accepted["status"], "queued");

    let claimed = app.queue.claim().await.unwrap();
    assert_eq!(claimed.plan.source_video_url.as_deref(), Some(file_path.as_str()));
    assert_eq!(claimed.plan.timeline.len(), 1);
    assert_eq!(claimed.plan.timeline[0].trim_start_ms, 500);
    assert!(claimed.plan.audio_tracks.is_empty());
    assert!(app.storage.uploads_dir.exists());
}

#[tokio::test]
async fn test_upload_without_file_part() {
    let app = test_app();
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "INPUT_ERROR");
}

#[tokio::test]
async fn test_execute_rejects_bad_sources() {
    let app = test_app();

    let missing = app
        .post_json(
            "/api/execute",
            json!({ "sourcePath": "/uploads/gone.mp4", "trim": { "startMs": 0, "endMs": 1000 } }),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body = json_body(missing).await;
    assert_eq!(body["error"]["code"], "INPUT_ERROR");
    assert!(body["error"]["message"].as_str().unwrap().contains("not found"));

    let empty = app.post_json("/api/execute", json!({ "sourcePath": "" })).await;
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(empty).await["error"]["code"], "INPUT_ERROR");

    assert_eq!(app.queue.snapshot().job_count(), 0);
}

#[tokio::test]
async fn test_body_limit_is_json() {
    let app = test_app_with(ApiConfig {
        max_upload_size: 64,
        ..Default::default()
    });
    let big = json!({ "plan": { "plan_id": "x".repeat(200) } }).to_string();
    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/execute-plan")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::CONTENT_LENGTH, big.len())
                .body(Body::from(big))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "INPUT_ERROR");
}

#[tokio::test]
async fn test_rate_limiting_spares_health() {
    let app = test_app_with(ApiConfig {
        rate_limit_rps: 1,
        ..Default::default()
    });
    let limited = || {
        Request::builder()
            .uri("/api/plan-schema")
            .header("X-Forwarded-For", "192.168.1.100")
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.send(limited()).await.status(), StatusCode::OK);
    let response = app.send(limited()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "1");
    assert_eq!(json_body(response).await["ok"], false);

    for _ in 0..3 {
        let health = app
            .send(
                Request::builder()
                    .uri("/api/health")
                    .header("X-Forwarded-For", "192.168.1.100")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(health.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_plan_export_job_resolves_to_partial_success() {
    let app = test_app();
    let outputs = LocalStore::outputs(&app.storage);
    let deps = ExecutorDeps {
        queue: app.queue.clone(),
        runner: Arc::new(FfmpegRunner::new("ffmpeg")),
        fetcher: SourceFetcher::new(
            vec![LocalStore::uploads(&app.storage), outputs.clone()],
            Duration::from_secs(5),
        )
        .unwrap(),
        outputs,
        errors: ErrorHandler::new(Arc::new(MemoryErrorStore::new()), RetryPolicy::default()),
        engines: vec![EngineId::PlanExport],
    };
    let config = WorkerConfig {
        work_dir: app.tmp.path().join("work"),
        engines: vec![EngineId::PlanExport],
        ..Default::default()
    };
    let executor = Arc::new(JobExecutor::new(config, deps));
    let worker = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move { executor.run().await })
    };

    let accepted = json_body(
        app.post_json(
            "/api/execute-plan",
            json!({ "sourceVideoUrl": "https://cdn.example.com/a.mp4", "plan": plan_json() }),
        )
        .await,
    )
    .await;
    let status_url = accepted["statusUrl"].as_str().unwrap().to_string();

    let mut job = Value::Null;
    for _ in 0..200 {
        job = json_body(app.get(&status_url).await).await;
        if job["status"] != "queued" && job["status"] != "running" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(job["status"], "partial_success");
    assert_eq!(job["engine"], "plan_export");
    assert_eq!(job["artifacts"]["engine"], "plan_export");
    assert!(job["artifacts"]["args"].is_array());
    assert!(job.get("outputUrl").is_none());

    executor.shutdown();
    worker.await.unwrap().unwrap();
}
