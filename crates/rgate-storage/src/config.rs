//! Storage configuration.

use std::path::PathBuf;

/// Where uploads, outputs and error records live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
    pub outputs_dir: PathBuf,
    /// Append-only JSONL error log
    pub error_log_path: PathBuf,
    /// Prefix for public URLs; empty yields relative URLs
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("./data/uploads"),
            outputs_dir: PathBuf::from("./data/outputs"),
            error_log_path: PathBuf::from("./data/errors.jsonl"),
            public_base_url: String::new(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            uploads_dir: std::env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.uploads_dir),
            outputs_dir: std::env::var("OUTPUTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.outputs_dir),
            error_log_path: std::env::var("ERROR_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.error_log_path),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_default(),
        }
    }

    /// Config rooted in a single directory, for tests and scratch runs.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            uploads_dir: root.join("uploads"),
            outputs_dir: root.join("outputs"),
            error_log_path: root.join("errors.jsonl"),
            public_base_url: String::new(),
        }
    }
}
