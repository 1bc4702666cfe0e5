//! Fetching generated media into a job's work directory.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};

/// Stream `url` into `dest`, creating parent directories.
pub async fn download_to(client: &Client, url: &str, dest: &Path) -> ProviderResult<u64> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message: format!("download of {} failed", url),
        });
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(ProviderError::invalid_response(format!("{} returned an empty body", url)));
    }
    debug!(bytes = written, "Downloaded {} to {}", url, dest.display());
    Ok(written)
}

/// Resolve an asset reference to a local file. URLs are downloaded into
/// `dest_dir`; anything else is treated as a local path that must exist.
pub async fn fetch_asset(client: &Client, source: &str, dest_dir: &Path) -> ProviderResult<PathBuf> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let name = source
            .split(['?', '#'])
            .next()
            .and_then(|s| s.rsplit('/').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("asset");
        let dest = dest_dir.join(name);
        download_to(client, source, &dest).await?;
        return Ok(dest);
    }

    let path = PathBuf::from(source);
    if tokio::fs::metadata(&path).await.is_err() {
        return Err(ProviderError::config(format!("asset not found: {}", source)));
    }
    Ok(path)
}
