//! Filesystem helpers for work directories and cross-device moves.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// EXDEV on Linux and macOS.
const EXDEV: i32 = 18;

/// Move `src` to `dst`, creating the destination directory.
///
/// Tries a rename first. Across filesystems it copies to a sibling temp file,
/// renames that into place, and removes the source.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.exists() {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!("Cross-device move {} -> {}", src.display(), dst.display());
            let staging = dst.with_extension("partial");
            if let Err(e) = fs::copy(src, &staging).await {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&staging, dst).await {
                let _ = fs::remove_file(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = fs::remove_file(src).await {
                warn!("Failed to remove {} after copy: {}", src.display(), e);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a directory tree, logging instead of failing.
pub async fn remove_dir_quietly(dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    match fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
    }
}
