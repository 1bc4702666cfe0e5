//! Persistence seams used by the worker, scheduler and poster.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use reel_models::{
    Automation, GenerationUpdate, Platform, PlatformCredentials, PlatformEntry, PostOutcome, Scene, VideoId,
    VideoRecord, VideoStatus,
};

use crate::error::FirestoreResult;

/// Platform entries of a video plus the version they were read at.
#[derive(Debug, Clone, Default)]
pub struct PlatformSnapshot {
    pub entries: Vec<PlatformEntry>,
    /// Opaque document version; pass back to guard the next write.
    pub version: Option<String>,
}

#[async_trait]
pub trait AutomationStore: Send + Sync {
    async fn list_enabled_automations(&self) -> FirestoreResult<Vec<Automation>>;

    async fn get_automation(&self, id: &str) -> FirestoreResult<Option<Automation>>;

    /// Stamp `last_run_at`.
    async fn record_run(&self, id: &str, at: DateTime<Utc>) -> FirestoreResult<()>;
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn create_video(&self, video: &VideoRecord) -> FirestoreResult<()>;

    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>>;

    async fn save_script(&self, id: &VideoId, title: &str, script: &str, scenes: &[Scene]) -> FirestoreResult<()>;

    /// Write status and stage together.
    async fn update_generation(&self, id: &VideoId, update: &GenerationUpdate) -> FirestoreResult<()>;

    async fn set_status(&self, id: &VideoId, status: VideoStatus) -> FirestoreResult<()>;

    /// Whether the series has a `QUEUED` or `GENERATING` video.
    async fn has_unfinished_in_series(&self, user_id: &str, series_id: &str) -> FirestoreResult<bool>;

    /// Normalized platform entries and the document version.
    async fn platform_snapshot(&self, id: &VideoId) -> FirestoreResult<PlatformSnapshot>;

    /// Replace the platform entries if the document is still at `version`.
    /// Fails with `PreconditionFailed` when another writer got there first.
    /// Stored slots for platforms this build does not know are kept.
    async fn write_platform_entries(
        &self,
        id: &VideoId,
        entries: &[PlatformEntry],
        version: Option<&str>,
    ) -> FirestoreResult<()>;

    /// Most recent successful post by this user to `platform`.
    async fn last_successful_post(&self, user_id: &str, platform: Platform) -> FirestoreResult<Option<DateTime<Utc>>>;

    /// `READY` or `POSTED` videos, newest first.
    async fn list_postable(&self, limit: u32) -> FirestoreResult<Vec<VideoRecord>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn credentials(&self, user_id: &str, platform: Platform) -> FirestoreResult<Option<PlatformCredentials>>;
}

/// Latest post time to `platform` across `videos`. Entries without a
/// timestamp (legacy records) count from the video's last update.
pub fn latest_post_at<'a>(videos: impl IntoIterator<Item = &'a VideoRecord>, platform: Platform) -> Option<DateTime<Utc>> {
    videos
        .into_iter()
        .flat_map(|video| {
            video
                .posted_platforms
                .iter()
                .filter(move |e| e.platform == platform)
                .filter_map(move |e| match e.outcome {
                    PostOutcome::Posted { posted_at, .. } => Some(posted_at.unwrap_or(video.updated_at)),
                    _ => None,
                })
        })
        .max()
}
