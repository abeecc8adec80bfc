//! Local file stores for uploads and rendered outputs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};

/// URL prefix for uploaded sources.
pub const UPLOADS_PREFIX: &str = "/uploads";
/// URL prefix for rendered outputs.
pub const OUTPUTS_PREFIX: &str = "/outputs";

/// A file written into a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub file_id: String,
    /// Store-relative reference usable as `sourcePath`.
    pub file_path: String,
    pub public_url: String,
    pub filename: String,
    pub size: u64,
    pub mimetype: String,
    #[serde(skip)]
    pub disk_path: PathBuf,
}

/// A directory served under a URL prefix.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
    url_prefix: &'static str,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: &'static str, public_base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn uploads(config: &StorageConfig) -> Self {
        Self::new(&config.uploads_dir, UPLOADS_PREFIX, config.public_base_url.clone())
    }

    pub fn outputs(config: &StorageConfig) -> Self {
        Self::new(&config.outputs_dir, OUTPUTS_PREFIX, config.public_base_url.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the backing directory.
    pub async fn ensure_dir(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StorageError::config_error(format!("cannot create {}: {}", self.dir.display(), e))
        })
    }

    /// Store-relative reference, e.g. `/uploads/abc.mp4`.
    pub fn reference(&self, name: &str) -> String {
        format!("{}/{}", self.url_prefix, name)
    }

    /// Public URL for a stored name.
    pub fn public_url(&self, name: &str) -> String {
        format!("{}{}", self.public_base_url, self.reference(name))
    }

    /// Disk path for a stored name. Rejects anything that is not a plain file name.
    pub fn path_of(&self, name: &str) -> StorageResult<PathBuf> {
        if !is_plain_name(name) {
            return Err(StorageError::invalid_key(name));
        }
        Ok(self.dir.join(name))
    }

    /// Map a caller reference onto a file in this store.
    ///
    /// Accepts `/uploads/<name>`, `uploads/<name>`, the public URL, or a bare
    /// name. Returns `None` when the reference does not point into this store.
    pub fn resolve_reference(&self, reference: &str) -> Option<PathBuf> {
        let reference = reference.trim();
        let reference = reference
            .strip_prefix(self.public_base_url.as_str())
            .filter(|_| !self.public_base_url.is_empty())
            .unwrap_or(reference);

        let prefix = self.url_prefix.trim_start_matches('/');
        let name = reference
            .trim_start_matches('/')
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(reference);
        let name = name.split(['?', '#']).next().unwrap_or(name);

        if is_plain_name(name) {
            Some(self.dir.join(name))
        } else {
            None
        }
    }

    /// Write an upload under a fresh id, keeping the original extension.
    pub async fn save_bytes(&self, original_name: &str, mimetype: &str, data: &[u8]) -> StorageResult<StoredFile> {
        self.ensure_dir().await?;

        let file_id = Uuid::new_v4().to_string();
        let name = match extension_of(original_name) {
            Some(ext) => format!("{}.{}", file_id, ext),
            None => file_id.clone(),
        };
        let disk_path = self.path_of(&name)?;

        tokio::fs::write(&disk_path, data)
            .await
            .map_err(|e| StorageError::write_failed(format!("{}: {}", disk_path.display(), e)))?;
        info!(file_id = %file_id, size = data.len(), "Stored upload {}", disk_path.display());

        Ok(StoredFile {
            file_id,
            file_path: self.reference(&name),
            public_url: self.public_url(&name),
            filename: original_name.to_string(),
            size: data.len() as u64,
            mimetype: mimetype.to_string(),
            disk_path,
        })
    }

    /// Move a finished file into the store as `name`. An existing file of
    /// that name is never replaced.
    pub async fn import_file(&self, source: &Path, name: &str, mimetype: &str) -> StorageResult<StoredFile> {
        self.ensure_dir().await?;
        let disk_path = self.path_of(name)?;
        if tokio::fs::try_exists(&disk_path).await? {
            return Err(StorageError::AlreadyExists(self.reference(name)));
        }

        if tokio::fs::rename(source, &disk_path).await.is_err() {
            // Different filesystem: fall back to copy + remove
            debug!("rename failed, copying {} -> {}", source.display(), disk_path.display());
            tokio::fs::copy(source, &disk_path)
                .await
                .map_err(|e| StorageError::write_failed(format!("{}: {}", disk_path.display(), e)))?;
            let _ = tokio::fs::remove_file(source).await;
        }

        let size = tokio::fs::metadata(&disk_path).await?.len();
        info!(size, "Stored output {}", disk_path.display());

        Ok(StoredFile {
            file_id: name.to_string(),
            file_path: self.reference(name),
            public_url: self.public_url(name),
            filename: name.to_string(),
            size,
            mimetype: mimetype.to_string(),
            disk_path,
        })
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

/// Lowercased alphanumeric extension of a file name.
fn extension_of(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> LocalStore {
        LocalStore::uploads(&StorageConfig::rooted(tmp.path()))
    }

    #[tokio::test]
    async fn test_save_bytes_keeps_extension() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let stored = store.save_bytes("My Clip.MP4", "video/mp4", b"data").await.unwrap();
        assert!(stored.file_path.starts_with("/uploads/"));
        assert!(stored.file_path.ends_with(".mp4"));
        assert_eq!(stored.public_url, stored.file_path);
        assert_eq!(stored.size, 4);
        assert_eq!(tokio::fs::read(&stored.disk_path).await.unwrap(), b"data");
    }

    #[test]
    fn test_resolve_reference() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let expected = tmp.path().join("uploads").join("a.mp4");
        assert_eq!(store.resolve_reference("/uploads/a.mp4"), Some(expected.clone()));
        assert_eq!(store.resolve_reference("uploads/a.mp4"), Some(expected.clone()));
        assert_eq!(store.resolve_reference("a.mp4"), Some(expected));
        assert_eq!(store.resolve_reference("/uploads/../secret"), None);
        assert_eq!(store.resolve_reference("https://cdn.example.com/a.mp4"), None);
    }

    #[test]
    fn test_public_base_url() {
        let tmp = TempDir::new().unwrap();
        let mut config = StorageConfig::rooted(tmp.path());
        config.public_base_url = "https://render.example.com".to_string();
        let store = LocalStore::outputs(&config);

        assert_eq!(store.public_url("j.mp4"), "https://render.example.com/outputs/j.mp4");
        assert!(store.resolve_reference("https://render.example.com/outputs/j.mp4").is_some());
    }

    #[tokio::test]
    async fn test_import_file_moves() {
        let tmp = TempDir::new().unwrap();
        let outputs = LocalStore::outputs(&StorageConfig::rooted(tmp.path()));
        let src = tmp.path().join("render.mp4");
        tokio::fs::write(&src, b"rendered").await.unwrap();

        let stored = outputs.import_file(&src, "job-1.mp4", "video/mp4").await.unwrap();
        assert_eq!(stored.size, 8);
        assert_eq!(stored.public_url, "/outputs/job-1.mp4");
        assert!(!src.exists());
        assert!(outputs.import_file(&src, "../x.mp4", "video/mp4").await.is_err());
    }

    #[tokio::test]
    async fn test_import_file_never_replaces() {
        let tmp = TempDir::new().unwrap();
        let outputs = LocalStore::outputs(&StorageConfig::rooted(tmp.path()));
        let first = tmp.path().join("first.mp4");
        let second = tmp.path().join("second.mp4");
        tokio::fs::write(&first, b"first").await.unwrap();
        tokio::fs::write(&second, b"second").await.unwrap();

        let stored = outputs.import_file(&first, "promo.mp4", "video/mp4").await.unwrap();
        let err = outputs.import_file(&second, "promo.mp4", "video/mp4").await.unwrap_err();

        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(err.code(), rgate_models::ErrorCode::StorageError);
        assert_eq!(tokio::fs::read(&stored.disk_path).await.unwrap(), b"first");
    }
}
