//! Client tests against a mock gateway.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rgate_client::{ClientConfig, ClientError, GatewayClient};
use rgate_models::{ErrorCode, ExecutionPlan, JobId, JobStatus, TransformOptions, TrimOptions};

fn client(server: &MockServer) -> GatewayClient {
    let config = ClientConfig {
        max_retries: 0,
        ..Default::default()
    }
    .with_base_url(server.uri());
    GatewayClient::new(config).unwrap()
}

fn job_json(status: &str) -> Value {
    let progress = if status == "done" { 100 } else { 0 };
    json!({
        "ok": true,
        "jobId": "job-1",
        "planId": "plan-1",
        "status": status,
        "queuePosition": 0,
        "progressPct": progress,
        "logsTail": [],
        "createdAt": "2026-01-01T00:00:00Z"
    })
}

fn plan() -> ExecutionPlan {
    serde_json::from_value(json!({
        "plan_id": "plan-1",
        "output_format": { "width": 640, "height": 360 },
        "timeline": [{
            "segment_id": "s1",
            "trim_start_ms": 0,
            "trim_end_ms": 1000,
            "timeline_start_ms": 0,
            "timeline_end_ms": 1000,
            "output_duration_ms": 1000
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "ffmpeg": { "available": true, "path": "/usr/bin/ffmpeg", "version": "6.1" },
            "outputsDir": "./data/outputs",
            "uploadsDir": "./data/uploads",
            "queueLength": 2,
            "currentJob": "job-9",
            "uptime": 12,
            "time": "2026-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let health = client(&server).health().await.unwrap();
    assert!(health.ok);
    assert!(health.ffmpeg.available);
    assert_eq!(health.queue_length, 2);
    assert_eq!(health.current_job, Some(JobId::from_string("job-9")));
}

#[tokio::test]
async fn test_html_response_is_invalid_content_type() {
    let server = MockServer::start().await;
    Mock::given(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<!doctype html><html>proxy</html>", "text/html"))
        .mount(&server)
        .await;

    let err = client(&server).job(&JobId::from_string("job-1")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidContentType);
    match err {
        ClientError::InvalidContentType {
            status,
            content_type,
            preview,
        } => {
            assert_eq!(status, 200);
            assert!(content_type.starts_with("text/html"));
            assert!(preview.starts_with("<!doctype html>"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_json_is_invalid_json() {
    let server = MockServer::start().await;
    Mock::given(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{\"ok\": tru", "application/json"))
        .mount(&server)
        .await;

    let err = client(&server).job(&JobId::from_string("job-1")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidJson);
}

#[tokio::test]
async fn test_error_envelope_keeps_gateway_code() {
    let server = MockServer::start().await;
    Mock::given(path("/api/jobs/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "ok": false,
            "error": { "code": "NOT_FOUND", "message": "Job not found: missing" }
        })))
        .mount(&server)
        .await;

    let err = client(&server).job(&JobId::from_string("missing")).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert!(matches!(err, ClientError::Api { .. }));
}

#[tokio::test]
async fn test_non_2xx_without_envelope_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(path("/api/health"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "boom" })))
        .mount(&server)
        .await;

    let err = client(&server).health().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::HttpError);
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_execute_plan_sends_contract_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/execute-plan"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "ok": true,
            "jobId": "job-1",
            "status": "queued",
            "queuePosition": 3,
            "statusUrl": "/api/jobs/job-1"
        })))
        .mount(&server)
        .await;

    let accepted = client(&server)
        .execute_plan(&plan(), Some("https://cdn.example.com/a.mp4"), Some("promo"))
        .await
        .unwrap();
    assert_eq!(accepted.job_id, JobId::from_string("job-1"));
    assert_eq!(accepted.status, JobStatus::Queued);
    assert_eq!(accepted.queue_position, 3);

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["sourceVideoUrl"], "https://cdn.example.com/a.mp4");
    assert_eq!(body["outputName"], "promo");
    assert_eq!(body["plan"]["plan_id"], "plan-1");
}

#[tokio::test]
async fn test_execute_flattens_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/execute"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "ok": true,
            "jobId": "job-2",
            "status": "queued",
            "queuePosition": 0,
            "statusUrl": "/api/jobs/job-2"
        })))
        .mount(&server)
        .await;

    let options = TransformOptions {
        trim: Some(TrimOptions {
            start_ms: 0,
            end_ms: Some(1500),
        }),
        speed: Some(2.0),
        ..Default::default()
    };
    client(&server).execute("/uploads/a.mp4", &options).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["sourcePath"], "/uploads/a.mp4");
    assert_eq!(body["trim"]["endMs"], 1500);
    assert_eq!(body["speed"], 2.0);
}

#[tokio::test]
async fn test_upload_sends_multipart_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "fileId": "f1",
            "filePath": "/uploads/f1.mp4",
            "publicUrl": "/uploads/f1.mp4",
            "filename": "clip.mp4",
            "size": 5,
            "mimetype": "video/mp4"
        })))
        .mount(&server)
        .await;

    let uploaded = client(&server)
        .upload("clip.mp4", "video/mp4", b"bytes".to_vec())
        .await
        .unwrap();
    assert_eq!(uploaded.file_path, "/uploads/f1.mp4");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"clip.mp4\""));
}

#[tokio::test]
async fn test_upload_file_reads_from_disk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "fileId": "f2",
            "filePath": "/uploads/f2.webm",
            "publicUrl": "/uploads/f2.webm",
            "filename": "take.webm",
            "size": 4,
            "mimetype": "video/webm"
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("take.webm");
    std::fs::write(&file, b"webm").unwrap();

    let uploaded = client(&server).upload_file(&file, "video/webm").await.unwrap();
    assert_eq!(uploaded.filename, "take.webm");

    let missing = client(&server)
        .upload_file(&dir.path().join("nope.webm"), "video/webm")
        .await
        .unwrap_err();
    assert!(matches!(missing, ClientError::Io(_)));
}

#[tokio::test]
async fn test_wait_for_job_polls_until_terminal() {
    let server = MockServer::start().await;
    Mock::given(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_json("running")))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_json("done")))
        .mount(&server)
        .await;

    let job = client(&server)
        .wait_for_job(
            &JobId::from_string("job-1"),
            Duration::from_millis(5),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_wait_for_job_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/api/jobs/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(job_json("queued")))
        .mount(&server)
        .await;

    let err = client(&server)
        .wait_for_job(
            &JobId::from_string("job-1"),
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }));
}
