//! Cloudflare R2 (S3 API) backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::{content_type_for, validate_key, MediaStore};

/// Longest presign S3 allows.
const MAX_PRESIGN: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone)]
pub struct R2Config {
    /// S3 API endpoint
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Usually "auto"
    pub region: String,
    /// Public bucket or CDN origin; presigned URLs are used when unset
    pub public_base_url: Option<String>,
}

impl R2Config {
    pub fn from_env() -> StorageResult<Self> {
        let required = |key: &str| {
            std::env::var(key).map_err(|_| StorageError::config_error(format!("{} not set", key)))
        };
        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("R2_PUBLIC_BASE_URL")
                .ok()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        })
    }
}

#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl R2Client {
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(&config.access_key_id, &config.secret_access_key, None, None, "r2");

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
        })
    }

    pub async fn from_env() -> StorageResult<Self> {
        Self::new(R2Config::from_env()?).await
    }

    pub async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        debug!("Uploading {} to {}", path.display(), key);
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        Ok(())
    }

    pub async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in.min(MAX_PRESIGN))
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::PresignFailed(e.to_string()))?;
        Ok(request.uri().to_string())
    }

    /// URL readers should use for `key`.
    pub async fn url_for(&self, key: &str) -> StorageResult<String> {
        match &self.public_base_url {
            Some(base) => Ok(format!("{}/{}", base, key)),
            None => self.presign_get(key, MAX_PRESIGN).await,
        }
    }
}

#[async_trait]
impl MediaStore for R2Client {
    async fn publish(&self, local: &Path, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        self.upload_file(local, key, content_type_for(key)).await?;
        let url = self.url_for(key).await?;
        info!(key, "Published {} to R2", local.display());
        Ok(url)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn set_required() {
        std::env::set_var("R2_ENDPOINT_URL", "https://acct.r2.cloudflarestorage.com");
        std::env::set_var("R2_ACCESS_KEY_ID", "id");
        std::env::set_var("R2_SECRET_ACCESS_KEY", "secret");
        std::env::set_var("R2_BUCKET_NAME", "reels");
    }

    #[test]
    #[serial]
    fn test_config_public_base_url_trimmed() {
        set_required();
        std::env::set_var("R2_PUBLIC_BASE_URL", "https://cdn.example.com/");
        let config = R2Config::from_env().unwrap();
        assert_eq!(config.public_base_url.as_deref(), Some("https://cdn.example.com"));
        assert_eq!(config.region, "auto");
        std::env::remove_var("R2_PUBLIC_BASE_URL");
    }

    #[test]
    #[serial]
    fn test_config_missing_bucket() {
        set_required();
        std::env::remove_var("R2_BUCKET_NAME");
        let err = R2Config::from_env().unwrap_err();
        assert!(err.to_string().contains("R2_BUCKET_NAME"));
    }

    #[tokio::test]
    async fn test_public_url_without_presign() {
        let client = R2Client::new(R2Config {
            endpoint_url: "https://acct.r2.cloudflarestorage.com".into(),
            access_key_id: "id".into(),
            secret_access_key: "secret".into(),
            bucket_name: "reels".into(),
            region: "auto".into(),
            public_base_url: Some("https://cdn.example.com".into()),
        })
        .await
        .unwrap();
        assert_eq!(
            client.url_for("videos/u/v.mp4").await.unwrap(),
            "https://cdn.example.com/videos/u/v.mp4"
        );
    }
}
