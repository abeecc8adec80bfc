//! Typed client for the render gateway HTTP API.
//!
//! Responses that break the JSON contract are reported distinctly:
//! a non-JSON body is `INVALID_CONTENT_TYPE`, undecodable JSON is
//! `INVALID_JSON`, a gateway error envelope keeps its own code, and any
//! other non-2xx is `HTTP_ERROR`.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientConfig, GatewayClient};
pub use error::{ClientError, ClientResult};
pub use types::{FfmpegStatus, HealthResponse, JobAccepted, UploadedFile};
