//! Local storage for the render gateway.
//!
//! This crate provides:
//! - The uploads store (caller-provided sources)
//! - The outputs store (rendered artifacts)
//! - The append-only error-record store

pub mod config;
pub mod error;
pub mod local;
pub mod records;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use local::{LocalStore, StoredFile, OUTPUTS_PREFIX, UPLOADS_PREFIX};
pub use records::{ErrorDecision, ErrorRecord, ErrorRecordStore, ErrorStage, JsonlErrorStore, MemoryErrorStore};
