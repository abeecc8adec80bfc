//! Source localization.
//!
//! Plans name their media by store reference or URL. Before encoding, each
//! distinct asset is pinned to a file on disk: store references resolve in
//! place, remote URLs are downloaded into the job's work directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use rgate_storage::LocalStore;

use crate::error::{WorkerError, WorkerResult};

/// Resolves plan assets to local files.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    stores: Vec<LocalStore>,
}

impl SourceFetcher {
    /// Fetcher resolving against `stores` in order, downloading everything else.
    pub fn new(stores: Vec<LocalStore>, timeout: Duration) -> WorkerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rgate-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WorkerError::network("", format!("HTTP client setup failed: {}", e), None, false))?;
        Ok(Self { client, stores })
    }

    /// Pin one asset to a local file. `index` keeps download names distinct.
    ///
    /// This is a single attempt; retry decisions belong to the caller.
    pub async fn localize(&self, reference: &str, dest_dir: &Path, index: usize) -> WorkerResult<PathBuf> {
        if let Some(path) = self.stores.iter().find_map(|s| s.resolve_reference(reference)) {
            return match tokio::fs::try_exists(&path).await {
                Ok(true) => Ok(path),
                _ => Err(WorkerError::SourceMissing(reference.to_string())),
            };
        }

        let url = url::Url::parse(reference).map_err(|_| WorkerError::UnsupportedSource(reference.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WorkerError::UnsupportedSource(reference.to_string()));
        }

        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(format!("source-{}.{}", index, extension_of(&url)));
        let size = self.download(reference, &dest).await?;
        debug!(size, "Downloaded {} -> {}", reference, dest.display());
        Ok(dest)
    }

    async fn download(&self, url: &str, dest: &Path) -> WorkerResult<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| WorkerError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::from_status(url, status));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| WorkerError::from_reqwest(url, &e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

fn extension_of(url: &url::Url) -> String {
    let ext = Path::new(url.path())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));
    ext.unwrap_or_else(|| "bin".to_string())
}
