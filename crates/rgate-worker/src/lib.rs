//! Render worker for the gateway.
//!
//! This crate provides:
//! - The single job executor (route, compile, execute, store)
//! - Source localization with retry
//! - Failure classification and persisted retry/abort decisions
//! - Worker configuration and structured job logging

pub mod config;
pub mod error;
pub mod error_handler;
pub mod executor;
pub mod fetch;
pub mod logging;
pub mod retry;

pub use config::{parse_engines, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use error_handler::{classify, stage_code, Decision, ErrorContext, ErrorHandler, Handled};
pub use executor::{output_file_name, ExecutorDeps, JobExecutor};
pub use fetch::SourceFetcher;
pub use logging::JobLogger;
pub use retry::RetryPolicy;
