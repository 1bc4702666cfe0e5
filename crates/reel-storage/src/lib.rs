//! Public storage for finished videos.
//!
//! The worker hands a local file to a [`MediaStore`] and gets back the URL
//! the poster and dashboard will use.

pub mod error;
pub mod local;
pub mod r2;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

pub use error::{StorageError, StorageResult};
pub use local::LocalMediaStore;
pub use r2::{R2Client, R2Config};

/// Destination for published media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Publish `local` under `key` and return its public URL. The local
    /// file may be consumed.
    async fn publish(&self, local: &Path, key: &str) -> StorageResult<String>;

    /// Remove a published object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Object key for a rendered video.
pub fn video_key(user_id: &str, video_id: &str) -> String {
    format!("videos/{}/{}.mp4", user_id, video_id)
}

/// Reject keys that could escape the bucket prefix or local root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().map(|ext| ext.to_ascii_lowercase()).as_deref() {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Pick the backend from `STORAGE_BACKEND` (`r2`, the default, or `local`).
pub async fn media_store_from_env() -> StorageResult<Arc<dyn MediaStore>> {
    let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "r2".to_string());
    match backend.to_ascii_lowercase().as_str() {
        "r2" => Ok(Arc::new(R2Client::from_env().await?)),
        "local" => Ok(Arc::new(LocalMediaStore::from_env()?)),
        other => Err(StorageError::config_error(format!("unknown STORAGE_BACKEND '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_key() {
        assert_eq!(video_key("u1", "v1"), "videos/u1/v1.mp4");
        assert!(validate_key(&video_key("u1", "v1")).is_ok());
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        for key in ["", "/abs.mp4", "a/../b.mp4", "a//b.mp4", "./a.mp4", "a\\b.mp4"] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("videos/u/v.MP4"), "video/mp4");
        assert_eq!(content_type_for("a/b.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
