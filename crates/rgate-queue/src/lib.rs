//! In-process job queue for the render gateway.
//!
//! A single actor task owns every job record. Handlers and the worker hold
//! [`QueueHandle`]s; reads go through published snapshots.

pub mod config;
pub mod error;
pub mod queue;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use queue::{ClaimedJob, JobOutcome, JobQueue, JobRequest, JobUpdate, QueueHandle, QueueSnapshot};
