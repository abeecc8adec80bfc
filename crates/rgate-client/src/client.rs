//! Gateway HTTP client.

use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use rgate_models::{ApiErrorBody, ExecutionPlan, Job, JobId, TransformOptions};

use crate::error::{preview, ClientError, ClientResult};
use crate::types::{ExecuteBody, ExecutePlanBody, HealthResponse, JobAccepted, UploadedFile};

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the gateway
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Retries for idempotent requests
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8787".to_string(),
            timeout: Duration::from_secs(300), // uploads can be large
            max_retries: 2,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("RGATE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            timeout: std::env::var("RGATE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("RGATE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Client for the render gateway.
///
/// Every response is checked against the JSON contract before decoding, so
/// an HTML page from a misrouted proxy surfaces as
/// [`ClientError::InvalidContentType`] rather than a decode failure.
pub struct GatewayClient {
    http: Client,
    config: ClientConfig,
}

impl GatewayClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rgate-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let url = self.url("/api/health");
        self.with_retry(|| async { decode(self.http.get(&url).send().await?).await })
            .await
    }

    /// Upload source bytes under `filename`.
    pub async fn upload(&self, filename: &str, mimetype: &str, data: Vec<u8>) -> ClientResult<UploadedFile> {
        let part = Part::bytes(data).file_name(filename.to_string()).mime_str(mimetype)?;
        let form = Form::new().part("file", part);

        debug!("Uploading {} to {}", filename, self.config.base_url);
        let response = self.http.post(self.url("/api/upload")).multipart(form).send().await?;
        decode(response).await
    }

    /// Upload a file from disk.
    pub async fn upload_file(&self, path: &Path, mimetype: &str) -> ClientResult<UploadedFile> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.bin".to_string());
        self.upload(&filename, mimetype, data).await
    }

    /// Queue a simple transform of `source_path`.
    pub async fn execute(&self, source_path: &str, options: &TransformOptions) -> ClientResult<JobAccepted> {
        let body = ExecuteBody { source_path, options };
        let response = self.http.post(self.url("/api/execute")).json(&body).send().await?;
        decode(response).await
    }

    /// Queue a full execution plan.
    pub async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        source_video_url: Option<&str>,
        output_name: Option<&str>,
    ) -> ClientResult<JobAccepted> {
        let body = ExecutePlanBody {
            source_video_url,
            plan,
            output_name,
        };
        let response = self.http.post(self.url("/api/execute-plan")).json(&body).send().await?;
        decode(response).await
    }

    /// Current state of a job.
    pub async fn job(&self, job_id: &JobId) -> ClientResult<Job> {
        let url = self.url(&format!("/api/jobs/{}", job_id));
        self.with_retry(|| async { decode(self.http.get(&url).send().await?).await })
            .await
    }

    /// Poll until the job is terminal. A failed job is returned, not raised;
    /// inspect `status` and `error`.
    pub async fn wait_for_job(&self, job_id: &JobId, poll_interval: Duration, timeout: Duration) -> ClientResult<Job> {
        let started = Instant::now();
        loop {
            let job = self.job(job_id).await?;
            if job.is_terminal() {
                return Ok(job);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ClientError::Timeout {
                    job_id: job_id.clone(),
                    waited,
                });
            }
            debug!(job_id = %job_id, status = %job.status, progress = job.progress_pct, "Job not finished yet");
            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> ClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ClientResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt));
                    warn!(
                        "Gateway request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Check the JSON contract, then decode.
async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.text().await?;

    if !content_type.to_ascii_lowercase().starts_with("application/json") {
        return Err(ClientError::InvalidContentType {
            status: status.as_u16(),
            content_type,
            preview: preview(&body),
        });
    }

    let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| ClientError::InvalidJson {
        status: status.as_u16(),
        message: e.to_string(),
    })?;

    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        if let Some(Ok(error)) = value
            .get("error")
            .map(|e| serde_json::from_value::<ApiErrorBody>(e.clone()))
        {
            return Err(ClientError::Api {
                status: status.as_u16(),
                error,
            });
        }
    }

    if !status.is_success() {
        return Err(ClientError::http(
            Some(status.as_u16()),
            format!("Gateway returned {} without an error envelope", status),
        ));
    }

    serde_json::from_value(value).map_err(|e| ClientError::InvalidJson {
        status: status.as_u16(),
        message: e.to_string(),
    })
}
