//! In-memory stores for tests and local runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use reel_models::{
    Automation, GenerationUpdate, Platform, PlatformCredentials, PlatformEntry, Scene, VideoId, VideoRecord,
    VideoStatus,
};

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{latest_post_at, AccountStore, AutomationStore, PlatformSnapshot, VideoStore};

struct StoredVideo {
    record: VideoRecord,
    version: u64,
}

/// Implements every store trait over process memory. Each video write bumps
/// its version, mirroring Firestore's `updateTime`.
#[derive(Default)]
pub struct InMemoryStore {
    automations: Mutex<HashMap<String, Automation>>,
    videos: Mutex<HashMap<String, StoredVideo>>,
    accounts: Mutex<HashMap<(String, Platform), PlatformCredentials>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_automation(&self, automation: Automation) {
        lock(&self.automations).insert(automation.id.clone(), automation);
    }

    pub fn automation(&self, id: &str) -> Option<Automation> {
        lock(&self.automations).get(id).cloned()
    }

    /// Insert or replace a video, platform entries included.
    pub fn put_video(&self, video: VideoRecord) {
        let mut videos = lock(&self.videos);
        let version = videos.get(video.id.as_str()).map_or(1, |v| v.version + 1);
        videos.insert(video.id.to_string(), StoredVideo { record: video, version });
    }

    pub fn video(&self, id: &str) -> Option<VideoRecord> {
        lock(&self.videos).get(id).map(|v| v.record.clone())
    }

    pub fn videos(&self) -> Vec<VideoRecord> {
        lock(&self.videos).values().map(|v| v.record.clone()).collect()
    }

    pub fn put_credentials(&self, user_id: &str, credentials: PlatformCredentials) {
        lock(&self.accounts).insert((user_id.to_string(), credentials.platform), credentials);
    }

    fn modify_video<F>(&self, id: &VideoId, f: F) -> FirestoreResult<()>
    where
        F: FnOnce(&mut VideoRecord),
    {
        let mut videos = lock(&self.videos);
        let stored = videos
            .get_mut(id.as_str())
            .ok_or_else(|| FirestoreError::not_found(format!("videos/{}", id)))?;
        f(&mut stored.record);
        stored.record.updated_at = Utc::now();
        stored.version += 1;
        Ok(())
    }
}

#[async_trait]
impl AutomationStore for InMemoryStore {
    async fn list_enabled_automations(&self) -> FirestoreResult<Vec<Automation>> {
        Ok(lock(&self.automations).values().filter(|a| a.enabled).cloned().collect())
    }

    async fn get_automation(&self, id: &str) -> FirestoreResult<Option<Automation>> {
        Ok(self.automation(id))
    }

    async fn record_run(&self, id: &str, at: DateTime<Utc>) -> FirestoreResult<()> {
        let mut automations = lock(&self.automations);
        let automation = automations
            .get_mut(id)
            .ok_or_else(|| FirestoreError::not_found(format!("automations/{}", id)))?;
        automation.last_run_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl VideoStore for InMemoryStore {
    async fn create_video(&self, video: &VideoRecord) -> FirestoreResult<()> {
        let mut videos = lock(&self.videos);
        if videos.contains_key(video.id.as_str()) {
            return Err(FirestoreError::AlreadyExists(format!("videos/{}", video.id)));
        }
        videos.insert(
            video.id.to_string(),
            StoredVideo {
                record: video.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
        Ok(self.video(id.as_str()))
    }

    async fn save_script(&self, id: &VideoId, title: &str, script: &str, scenes: &[Scene]) -> FirestoreResult<()> {
        self.modify_video(id, |video| {
            video.title = title.to_string();
            video.script = script.to_string();
            video.scenes = scenes.to_vec();
        })
    }

    async fn update_generation(&self, id: &VideoId, update: &GenerationUpdate) -> FirestoreResult<()> {
        self.modify_video(id, |video| video.apply(update, Utc::now()))
    }

    async fn set_status(&self, id: &VideoId, status: VideoStatus) -> FirestoreResult<()> {
        self.modify_video(id, |video| video.status = status)
    }

    async fn has_unfinished_in_series(&self, user_id: &str, series_id: &str) -> FirestoreResult<bool> {
        Ok(lock(&self.videos).values().any(|v| {
            v.record.user_id == user_id && v.record.series_id == series_id && v.record.status.is_unfinished()
        }))
    }

    async fn platform_snapshot(&self, id: &VideoId) -> FirestoreResult<PlatformSnapshot> {
        let videos = lock(&self.videos);
        let stored = videos
            .get(id.as_str())
            .ok_or_else(|| FirestoreError::not_found(format!("videos/{}", id)))?;
        Ok(PlatformSnapshot {
            entries: stored.record.posted_platforms.clone(),
            version: Some(stored.version.to_string()),
        })
    }

    async fn write_platform_entries(
        &self,
        id: &VideoId,
        entries: &[PlatformEntry],
        version: Option<&str>,
    ) -> FirestoreResult<()> {
        let mut videos = lock(&self.videos);
        let stored = videos
            .get_mut(id.as_str())
            .ok_or_else(|| FirestoreError::not_found(format!("videos/{}", id)))?;
        if let Some(expected) = version {
            if expected != stored.version.to_string() {
                return Err(FirestoreError::PreconditionFailed(format!(
                    "videos/{} is at version {}, expected {}",
                    id, stored.version, expected
                )));
            }
        }
        stored.record.posted_platforms = entries.to_vec();
        stored.record.updated_at = Utc::now();
        stored.version += 1;
        Ok(())
    }

    async fn last_successful_post(&self, user_id: &str, platform: Platform) -> FirestoreResult<Option<DateTime<Utc>>> {
        let videos = lock(&self.videos);
        Ok(latest_post_at(
            videos.values().map(|v| &v.record).filter(|v| v.user_id == user_id),
            platform,
        ))
    }

    async fn list_postable(&self, limit: u32) -> FirestoreResult<Vec<VideoRecord>> {
        let mut postable: Vec<VideoRecord> = lock(&self.videos)
            .values()
            .filter(|v| matches!(v.record.status, VideoStatus::Ready | VideoStatus::Posted))
            .map(|v| v.record.clone())
            .collect();
        postable.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        postable.truncate(limit as usize);
        Ok(postable)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn credentials(&self, user_id: &str, platform: Platform) -> FirestoreResult<Option<PlatformCredentials>> {
        Ok(lock(&self.accounts).get(&(user_id.to_string(), platform)).cloned())
    }
}
