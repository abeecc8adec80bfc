//! API error types.
//!
//! Every failure leaves the server as `{ok:false, error:{code, message, details?}}`.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use rgate_models::{ApiErrorBody, ErrorCode, ModelError};
use rgate_queue::QueueError;
use rgate_storage::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("{0}")]
    Internal(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wire error for this failure.
    pub fn body(&self) -> ApiErrorBody {
        match self {
            ApiError::BadRequest(msg) | ApiError::PayloadTooLarge(msg) => {
                ApiErrorBody::new(ErrorCode::InputError, msg.clone())
            }
            ApiError::NotFound(msg) => ApiErrorBody::new(ErrorCode::NotFound, msg.clone()),
            ApiError::RateLimited => ApiErrorBody::new(ErrorCode::HttpError, self.to_string()),
            ApiError::Internal(msg) => ApiErrorBody::new(ErrorCode::InternalError, msg.clone()),
            ApiError::Model(e) => e.to_body(),
            ApiError::Queue(e) => e.to_body(),
            ApiError::Storage(e) => e.to_body(),
        }
    }

    fn status_code(&self, code: ErrorCode) -> StatusCode {
        match self {
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => status_for_code(code),
        }
    }
}

/// HTTP status for a wire error category.
pub fn status_for_code(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InputError | ErrorCode::PlanError | ErrorCode::InvalidJson | ErrorCode::InvalidContentType => {
            StatusCode::BAD_REQUEST
        }
        ErrorCode::AuthError => StatusCode::UNAUTHORIZED,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
        ErrorCode::FfmpegError | ErrorCode::StorageError | ErrorCode::HttpError | ErrorCode::InternalError => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Wire error category for a bare error status produced outside the handlers.
pub fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorCode::AuthError,
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::TOO_MANY_REQUESTS => ErrorCode::HttpError,
        StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => ErrorCode::NetworkError,
        s if s.is_client_error() => ErrorCode::InputError,
        _ => ErrorCode::InternalError,
    }
}

/// The failure envelope.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ApiErrorBody,
}

impl ErrorEnvelope {
    pub fn new(error: ApiErrorBody) -> Self {
        Self { ok: false, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = self.body();
        let status = self.status_code(body.code);

        if status.is_server_error() {
            error!(code = %body.code, status = status.as_u16(), "Request failed: {}", self);
            // Don't expose internal error details in production
            if body.code == ErrorCode::InternalError
                && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
            {
                body = ApiErrorBody::new(ErrorCode::InternalError, "An internal error occurred");
            }
        }

        (status, Json(ErrorEnvelope::new(body))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge("Request body too large".to_string());
        }
        Self::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(format!("Invalid multipart request: {}", rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge("Upload exceeds the maximum allowed size".to_string());
        }
        Self::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}
