//! Extractors whose rejections use the JSON error envelope.

use axum::extract::FromRequest;

use crate::error::ApiError;

/// `axum::Json` with rejections reported as `INPUT_ERROR`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
