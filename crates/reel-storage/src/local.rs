//! Local-directory backend for development and single-host setups.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::{validate_key, MediaStore};

/// Moves published files under `root`; URLs are `base_url/key`.
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
    base_url: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `LOCAL_MEDIA_DIR` (default `./public`) served at `LOCAL_MEDIA_BASE_URL`.
    pub fn from_env() -> StorageResult<Self> {
        let root = std::env::var("LOCAL_MEDIA_DIR").unwrap_or_else(|_| "./public".to_string());
        let base_url = std::env::var("LOCAL_MEDIA_BASE_URL")
            .map_err(|_| StorageError::config_error("LOCAL_MEDIA_BASE_URL not set"))?;
        Ok(Self::new(root, base_url))
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn publish(&self, local: &Path, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        let target = self.path_for(key);
        reel_media::move_file(local, &target).await?;
        info!(key, "Published {} to {}", local.display(), target.display());
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
