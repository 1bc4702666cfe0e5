//! Claim, publish and record, per platform.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use reel_firestore::{AccountStore, VideoStore};
use reel_models::{
    claim_decision, ClaimDecision, Platform, PlatformCredentials, PlatformEntry, VideoId, VideoRecord, VideoStatus,
};

use crate::config::PosterConfig;
use crate::error::{FailureKind, PosterError, PosterResult};
use crate::publisher::{PlatformPublisher, PostMetadata, UploadResult};

/// Result of posting one video to one platform.
#[derive(Debug, Clone, PartialEq)]
pub enum PostAttempt {
    Posted {
        post_id: Option<String>,
        url: Option<String>,
    },
    AlreadyPosted,
    /// Another poster holds a fresh claim
    InProgress,
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl PostAttempt {
    fn label(&self) -> &'static str {
        match self {
            PostAttempt::Posted { .. } => "posted",
            PostAttempt::AlreadyPosted => "already_posted",
            PostAttempt::InProgress => "in_progress",
            PostAttempt::Failed { .. } => "failed",
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub videos: usize,
    pub posted: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SweepReport {
    fn tally(&mut self, attempt: &PostAttempt) {
        match attempt {
            PostAttempt::Posted { .. } => self.posted += 1,
            PostAttempt::Failed { .. } => self.failed += 1,
            PostAttempt::AlreadyPosted | PostAttempt::InProgress => self.skipped += 1,
        }
    }
}

pub struct Poster {
    videos: Arc<dyn VideoStore>,
    accounts: Arc<dyn AccountStore>,
    publisher: Arc<dyn PlatformPublisher>,
    config: PosterConfig,
}

impl Poster {
    pub fn new(
        videos: Arc<dyn VideoStore>,
        accounts: Arc<dyn AccountStore>,
        publisher: Arc<dyn PlatformPublisher>,
        config: PosterConfig,
    ) -> Self {
        Self {
            videos,
            accounts,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &PosterConfig {
        &self.config
    }

    /// Publish every finished video with platforms left to attempt.
    ///
    /// Platforms with a `Failed` entry are left for [`Poster::post_now`],
    /// except cooldown failures whose wait has passed.
    pub async fn sweep(&self) -> PosterResult<SweepReport> {
        let now = Utc::now();
        let videos = self.videos.list_postable(self.config.sweep_limit).await?;
        let mut report = SweepReport::default();

        for video in &videos {
            if video.video_url.is_none() {
                continue;
            }
            let pending = video.pending_platforms(now, self.config.stale_after);
            if pending.is_empty() {
                continue;
            }
            report.videos += 1;
            for (_, attempt) in self.post_video(video, &pending).await {
                report.tally(&attempt);
            }
        }

        if report.videos > 0 {
            info!(?report, "Posting sweep finished");
        }
        Ok(report)
    }

    /// Manual trigger: attempt every target platform of one video.
    pub async fn post_now(&self, video_id: &VideoId) -> PosterResult<Vec<(Platform, PostAttempt)>> {
        let video = self
            .videos
            .get_video(video_id)
            .await?
            .ok_or_else(|| PosterError::VideoNotFound(video_id.to_string()))?;

        if !matches!(video.status, VideoStatus::Ready | VideoStatus::Posted) || video.video_url.is_none() {
            return Err(PosterError::MissingMedia(format!(
                "video {} is {}",
                video_id,
                video.status.as_str()
            )));
        }
        Ok(self.post_video(&video, &video.target_platforms).await)
    }

    /// Attempt the given platforms concurrently.
    pub async fn post_video(&self, video: &VideoRecord, platforms: &[Platform]) -> Vec<(Platform, PostAttempt)> {
        let attempts = platforms.iter().map(|&platform| async move {
            let attempt = match self.post_to_platform(video, platform).await {
                Ok(attempt) => attempt,
                Err(e) => {
                    // Store errors leave the claim to go stale and be retried
                    warn!(video_id = %video.id, platform = %platform, "Posting aborted: {}", e);
                    PostAttempt::Failed {
                        kind: FailureKind::classify(&e),
                        message: e.to_string(),
                    }
                }
            };
            metrics::counter!(
                "reel_posts_total",
                "platform" => platform.as_str(),
                "outcome" => attempt.label()
            )
            .increment(1);
            (platform, attempt)
        });
        join_all(attempts).await
    }

    /// Claim, publish and record one platform.
    pub async fn post_to_platform(&self, video: &VideoRecord, platform: Platform) -> PosterResult<PostAttempt> {
        let now = Utc::now();
        match self.claim(&video.id, platform, now).await? {
            ClaimDecision::Claim => {}
            ClaimDecision::AlreadyPosted => return Ok(PostAttempt::AlreadyPosted),
            ClaimDecision::InProgress => {
                debug!(video_id = %video.id, platform = %platform, "Platform claimed elsewhere");
                return Ok(PostAttempt::InProgress);
            }
        }

        match self.publish(video, platform, now).await {
            Ok((result, credentials)) => {
                let entry = PlatformEntry::posted(platform, result.post_id.clone(), result.url.clone(), Utc::now());
                if let Err(e) = self.record(&video.id, entry, self.config.posted_write_attempts).await {
                    // The claim stays `Uploading` and will go stale, so the next sweep posts again
                    error!(
                        video_id = %video.id,
                        platform = %platform,
                        post_id = ?result.post_id,
                        url = ?result.url,
                        "Published but not recorded, a duplicate post will follow: {}", e
                    );
                    metrics::counter!("reel_posts_unrecorded_total", "platform" => platform.as_str()).increment(1);
                    return Err(e);
                }
                if video.status != VideoStatus::Posted {
                    self.videos.set_status(&video.id, VideoStatus::Posted).await?;
                }
                info!(video_id = %video.id, platform = %platform, post_id = ?result.post_id, "Posted");
                self.spawn_first_comment(credentials, result.post_id.clone());
                Ok(PostAttempt::Posted {
                    post_id: result.post_id,
                    url: result.url,
                })
            }
            Err(e) => {
                let kind = FailureKind::classify(&e);
                let message = kind.render(&e);
                warn!(video_id = %video.id, platform = %platform, kind = kind.as_str(), "Post failed: {}", message);
                let failed_at = Utc::now();
                let entry = match e {
                    PosterError::Cooldown { minutes } => PlatformEntry::deferred(
                        platform,
                        message.clone(),
                        failed_at,
                        failed_at + chrono::Duration::minutes(minutes),
                    ),
                    _ => PlatformEntry::failed(platform, message.clone(), failed_at),
                };
                self.record(&video.id, entry, self.config.write_attempts).await?;
                Ok(PostAttempt::Failed { kind, message })
            }
        }
    }

    /// Take the platform slot with a version-guarded write.
    ///
    /// Any write to the document bumps its version, so sibling platforms and
    /// status changes also make a claim re-read. After `write_attempts` lost
    /// races the platform is reported `InProgress` and left for a later sweep.
    async fn claim(&self, id: &VideoId, platform: Platform, now: DateTime<Utc>) -> PosterResult<ClaimDecision> {
        for attempt in 1..=self.config.write_attempts {
            let snapshot = self.videos.platform_snapshot(id).await?;
            let decision = claim_decision(&snapshot.entries, platform, now, self.config.stale_after);
            if decision != ClaimDecision::Claim {
                return Ok(decision);
            }

            let mut entries = snapshot.entries;
            PlatformEntry::upsert(&mut entries, PlatformEntry::uploading(platform, now));
            match self
                .videos
                .write_platform_entries(id, &entries, snapshot.version.as_deref())
                .await
            {
                Ok(()) => return Ok(ClaimDecision::Claim),
                Err(e) if e.is_precondition_failed() => {
                    debug!(video_id = %id, platform = %platform, attempt, "Claim raced, re-reading");
                    self.write_backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(ClaimDecision::InProgress)
    }

    /// Replace this platform's entry. A `Posted` entry is never replaced.
    async fn record(&self, id: &VideoId, entry: PlatformEntry, attempts: u32) -> PosterResult<()> {
        for attempt in 1..=attempts {
            let snapshot = self.videos.platform_snapshot(id).await?;
            if snapshot
                .entries
                .iter()
                .any(|e| e.platform == entry.platform && e.is_posted())
            {
                return Ok(());
            }

            let mut entries = snapshot.entries;
            PlatformEntry::upsert(&mut entries, entry.clone());
            match self
                .videos
                .write_platform_entries(id, &entries, snapshot.version.as_deref())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_precondition_failed() => self.write_backoff(attempt).await,
                Err(e) => return Err(e.into()),
            }
        }
        Err(PosterError::WriteConflict(format!("videos/{}", id)))
    }

    async fn write_backoff(&self, attempt: u32) {
        tokio::time::sleep(self.config.write_backoff * attempt).await;
    }

    async fn publish(
        &self,
        video: &VideoRecord,
        platform: Platform,
        now: DateTime<Utc>,
    ) -> PosterResult<(UploadResult, PlatformCredentials)> {
        self.check_cooldown(&video.user_id, platform, now).await?;

        let credentials = self
            .accounts
            .credentials(&video.user_id, platform)
            .await?
            .ok_or(PosterError::MissingCredentials(platform))?;
        if credentials.is_expired(now) {
            return Err(PosterError::TokenExpired(platform));
        }

        let video_url = video
            .video_url
            .as_deref()
            .ok_or_else(|| PosterError::MissingMedia(video.id.to_string()))?;
        let metadata = PostMetadata::for_video(video);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.publisher.upload(&credentials, video_url, &metadata).await {
                Ok(result) => return Ok((result, credentials)),
                Err(e) => {
                    let kind = FailureKind::classify(&e);
                    if attempt >= self.config.max_attempts || !kind.is_retryable() {
                        return Err(e);
                    }
                    warn!(
                        video_id = %video.id,
                        platform = %platform,
                        attempt,
                        "Upload failed, retrying in {:?}: {}",
                        self.config.retry_delay,
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    async fn check_cooldown(&self, user_id: &str, platform: Platform, now: DateTime<Utc>) -> PosterResult<()> {
        let gap = self.config.min_gap(platform);
        if gap <= chrono::Duration::zero() {
            return Ok(());
        }
        let Some(last) = self.videos.last_successful_post(user_id, platform).await? else {
            return Ok(());
        };

        let elapsed = now - last;
        if elapsed < gap {
            let remaining = gap - elapsed;
            let minutes = (remaining.num_seconds() + 59) / 60;
            return Err(PosterError::Cooldown { minutes });
        }
        Ok(())
    }

    fn spawn_first_comment(&self, credentials: PlatformCredentials, post_id: Option<String>) {
        let (Some(text), Some(post_id)) = (self.config.first_comment.clone(), post_id) else {
            return;
        };
        let publisher = Arc::clone(&self.publisher);
        let delay = self.config.comment_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match publisher.post_comment(&credentials, &post_id, &text).await {
                Ok(_) => debug!(platform = %credentials.platform, post_id = %post_id, "First comment posted"),
                Err(e) => warn!(platform = %credentials.platform, post_id = %post_id, "First comment failed: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use reel_firestore::{FirestoreError, FirestoreResult, InMemoryStore, PlatformSnapshot};
    use reel_models::{GenerationUpdate, PostOutcome, Scene};

    use crate::publisher::CommentResult;

    /// Pops scripted responses; succeeds once the script runs out.
    #[derive(Default)]
    struct ScriptedPublisher {
        responses: Mutex<VecDeque<PosterResult<UploadResult>>>,
        uploads: Mutex<Vec<(Platform, String)>>,
        comments: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedPublisher {
        fn failing_with(errors: Vec<PosterError>) -> Self {
            Self {
                responses: Mutex::new(errors.into_iter().map(Err).collect()),
                ..Self::default()
            }
        }

        fn upload_count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PlatformPublisher for ScriptedPublisher {
        async fn upload(
            &self,
            credentials: &PlatformCredentials,
            video_url: &str,
            _metadata: &PostMetadata,
        ) -> PosterResult<UploadResult> {
            self.uploads
                .lock()
                .unwrap()
                .push((credentials.platform, video_url.to_string()));
            let scripted = self.responses.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(UploadResult {
                    post_id: Some(format!("{}-post", credentials.platform)),
                    url: Some(format!("https://{}.test/p", credentials.platform)),
                })
            })
        }

        async fn post_comment(
            &self,
            _credentials: &PlatformCredentials,
            post_id: &str,
            text: &str,
        ) -> PosterResult<CommentResult> {
            self.comments
                .lock()
                .unwrap()
                .push((post_id.to_string(), text.to_string()));
            Ok(CommentResult { comment_id: None })
        }
    }

    fn config() -> PosterConfig {
        PosterConfig {
            retry_delay: Duration::from_millis(1),
            comment_delay: Duration::from_millis(1),
            write_backoff: Duration::from_millis(1),
            ..PosterConfig::default()
        }
    }

    fn credentials(platform: Platform) -> PlatformCredentials {
        PlatformCredentials {
            platform,
            account_id: "acct".into(),
            access_token: "tok".into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    fn ready_video(id: &str, platforms: Vec<Platform>) -> VideoRecord {
        let mut video = VideoRecord::new(VideoId::from(id), "user-1", "series-1")
            .with_content("Title", "Desc", vec!["#shorts".into()])
            .with_platforms(platforms);
        video.apply(
            &GenerationUpdate::Ready {
                video_url: format!("https://cdn.test/{}.mp4", id),
                duration_ms: 30_000,
            },
            Utc::now(),
        );
        video
    }

    fn setup(publisher: ScriptedPublisher, config: PosterConfig) -> (Arc<InMemoryStore>, Arc<ScriptedPublisher>, Poster) {
        let store = Arc::new(InMemoryStore::new());
        for platform in Platform::ALL {
            store.put_credentials("user-1", credentials(platform));
        }
        let publisher = Arc::new(publisher);
        let poster = Poster::new(store.clone(), store.clone(), publisher.clone(), config);
        (store, publisher, poster)
    }

    fn entry(store: &InMemoryStore, id: &str, platform: Platform) -> Option<PlatformEntry> {
        store
            .video(id)
            .unwrap()
            .posted_platforms
            .into_iter()
            .find(|e| e.platform == platform)
    }

    #[tokio::test]
    async fn test_posts_all_platforms_and_flips_status() {
        let (store, publisher, poster) = setup(ScriptedPublisher::default(), config());
        let video = ready_video("v1", vec![Platform::Youtube, Platform::Tiktok]);
        store.put_video(video.clone());

        let results = poster.post_video(&video, &video.target_platforms).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, a)| matches!(a, PostAttempt::Posted { .. })));
        assert_eq!(publisher.upload_count(), 2);

        let stored = store.video("v1").unwrap();
        assert_eq!(stored.status, VideoStatus::Posted);
        assert!(entry(&store, "v1", Platform::Youtube).unwrap().is_posted());
        assert!(entry(&store, "v1", Platform::Tiktok).unwrap().is_posted());
    }

    #[tokio::test]
    async fn test_posted_entry_is_never_overwritten() {
        let (store, publisher, poster) = setup(ScriptedPublisher::default(), config());
        let mut video = ready_video("v1", vec![Platform::Youtube]);
        video.posted_platforms = vec![PlatformEntry::posted(
            Platform::Youtube,
            Some("old".into()),
            None,
            Utc::now() - chrono::Duration::days(1),
        )];
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Youtube).await.unwrap();
        assert_eq!(attempt, PostAttempt::AlreadyPosted);
        assert_eq!(publisher.upload_count(), 0);
        match entry(&store, "v1", Platform::Youtube).unwrap().outcome {
            PostOutcome::Posted { post_id, .. } => assert_eq!(post_id.as_deref(), Some("old")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fresh_claim_reports_in_progress() {
        let (store, publisher, poster) = setup(ScriptedPublisher::default(), config());
        let mut video = ready_video("v1", vec![Platform::Tiktok]);
        video.posted_platforms = vec![PlatformEntry::uploading(
            Platform::Tiktok,
            Utc::now() - chrono::Duration::minutes(2),
        )];
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Tiktok).await.unwrap();
        assert_eq!(attempt, PostAttempt::InProgress);
        assert_eq!(publisher.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_claim_is_taken_over() {
        let (store, _publisher, poster) = setup(ScriptedPublisher::default(), config());
        let mut video = ready_video("v1", vec![Platform::Tiktok]);
        video.posted_platforms = vec![PlatformEntry::uploading(
            Platform::Tiktok,
            Utc::now() - chrono::Duration::minutes(15),
        )];
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Tiktok).await.unwrap();
        assert!(matches!(attempt, PostAttempt::Posted { .. }));
    }

    #[tokio::test]
    async fn test_cooldown_blocks_and_is_recorded() {
        let (store, publisher, poster) = setup(ScriptedPublisher::default(), config());
        let mut earlier = ready_video("earlier", vec![Platform::Youtube]);
        earlier.posted_platforms = vec![PlatformEntry::posted(
            Platform::Youtube,
            None,
            None,
            Utc::now() - chrono::Duration::minutes(20),
        )];
        store.put_video(earlier);
        let video = ready_video("v2", vec![Platform::Youtube]);
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Youtube).await.unwrap();
        let PostAttempt::Failed { kind, message } = attempt else {
            panic!("expected cooldown failure");
        };
        assert_eq!(kind, FailureKind::Cooldown);
        assert_eq!(message, "Cooldown active: wait 40 minutes");
        assert_eq!(publisher.upload_count(), 0);
        let PostOutcome::Failed {
            retry_after: Some(retry_after),
            ..
        } = entry(&store, "v2", Platform::Youtube).unwrap().outcome
        else {
            panic!("expected a deferred failure");
        };
        let wait = retry_after - Utc::now();
        assert!(wait > chrono::Duration::minutes(39) && wait <= chrono::Duration::minutes(40));
    }

    #[tokio::test]
    async fn test_sweep_retries_cooldown_once_due() {
        let (store, publisher, poster) = setup(ScriptedPublisher::default(), config());
        let now = Utc::now();
        let mut waiting = ready_video("waiting", vec![Platform::Tiktok]);
        waiting.posted_platforms = vec![PlatformEntry::deferred(
            Platform::Tiktok,
            "Cooldown active: wait 5 minutes",
            now - chrono::Duration::minutes(10),
            now - chrono::Duration::minutes(5),
        )];
        store.put_video(waiting);
        let mut cooling = ready_video("cooling", vec![Platform::Youtube]);
        cooling.posted_platforms = vec![PlatformEntry::deferred(
            Platform::Youtube,
            "Cooldown active: wait 30 minutes",
            now,
            now + chrono::Duration::minutes(30),
        )];
        store.put_video(cooling);

        let report = poster.sweep().await.unwrap();
        assert_eq!(report.videos, 1);
        assert_eq!(report.posted, 1);
        assert_eq!(publisher.upload_count(), 1);
        assert!(entry(&store, "waiting", Platform::Tiktok).unwrap().is_posted());
        assert!(!entry(&store, "cooling", Platform::Youtube).unwrap().is_posted());
    }

    /// Loses the version race for the first `posted_conflicts` writes that
    /// record a finished upload, as when sibling platforms keep writing.
    struct ContendedVideos {
        inner: Arc<InMemoryStore>,
        posted_conflicts: AtomicU32,
    }

    #[async_trait]
    impl VideoStore for ContendedVideos {
        async fn create_video(&self, video: &VideoRecord) -> FirestoreResult<()> {
            self.inner.create_video(video).await
        }

        async fn get_video(&self, id: &VideoId) -> FirestoreResult<Option<VideoRecord>> {
            self.inner.get_video(id).await
        }

        async fn save_script(&self, id: &VideoId, title: &str, script: &str, scenes: &[Scene]) -> FirestoreResult<()> {
            self.inner.save_script(id, title, script, scenes).await
        }

        async fn update_generation(&self, id: &VideoId, update: &GenerationUpdate) -> FirestoreResult<()> {
            self.inner.update_generation(id, update).await
        }

        async fn set_status(&self, id: &VideoId, status: VideoStatus) -> FirestoreResult<()> {
            self.inner.set_status(id, status).await
        }

        async fn has_unfinished_in_series(&self, user_id: &str, series_id: &str) -> FirestoreResult<bool> {
            self.inner.has_unfinished_in_series(user_id, series_id).await
        }

        async fn platform_snapshot(&self, id: &VideoId) -> FirestoreResult<PlatformSnapshot> {
            self.inner.platform_snapshot(id).await
        }

        async fn write_platform_entries(
            &self,
            id: &VideoId,
            entries: &[PlatformEntry],
            version: Option<&str>,
        ) -> FirestoreResult<()> {
            let records_post = entries.iter().any(PlatformEntry::is_posted);
            let lost = records_post
                && self
                    .posted_conflicts
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if lost {
                return Err(FirestoreError::PreconditionFailed(format!("videos/{}", id)));
            }
            self.inner.write_platform_entries(id, entries, version).await
        }

        async fn last_successful_post(
            &self,
            user_id: &str,
            platform: Platform,
        ) -> FirestoreResult<Option<DateTime<Utc>>> {
            self.inner.last_successful_post(user_id, platform).await
        }

        async fn list_postable(&self, limit: u32) -> FirestoreResult<Vec<VideoRecord>> {
            self.inner.list_postable(limit).await
        }
    }

    fn contended(conflicts: u32) -> (Arc<InMemoryStore>, Arc<ScriptedPublisher>, Poster) {
        let store = Arc::new(InMemoryStore::new());
        store.put_credentials("user-1", credentials(Platform::Youtube));
        let videos = Arc::new(ContendedVideos {
            inner: store.clone(),
            posted_conflicts: AtomicU32::new(conflicts),
        });
        let publisher = Arc::new(ScriptedPublisher::default());
        let poster = Poster::new(videos, store.clone(), publisher.clone(), config());
        (store, publisher, poster)
    }

    #[tokio::test]
    async fn test_finished_upload_outlasts_write_races() {
        // More lost races than an ordinary claim would tolerate
        let (store, publisher, poster) = contended(config().write_attempts + 1);
        let video = ready_video("v1", vec![Platform::Youtube]);
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Youtube).await.unwrap();
        assert!(matches!(attempt, PostAttempt::Posted { .. }));
        assert_eq!(publisher.upload_count(), 1);
        assert!(entry(&store, "v1", Platform::Youtube).unwrap().is_posted());
        assert_eq!(store.video("v1").unwrap().status, VideoStatus::Posted);
    }

    #[tokio::test]
    async fn test_unrecorded_upload_is_an_error() {
        let (store, _publisher, poster) = contended(u32::MAX);
        let video = ready_video("v1", vec![Platform::Youtube]);
        store.put_video(video.clone());

        let err = poster.post_to_platform(&video, Platform::Youtube).await.unwrap_err();
        assert!(matches!(err, PosterError::WriteConflict(_)));
        assert!(matches!(
            entry(&store, "v1", Platform::Youtube).unwrap().outcome,
            PostOutcome::Uploading { .. }
        ));
    }

    #[tokio::test]
    async fn test_transient_errors_retry_then_succeed() {
        let publisher = ScriptedPublisher::failing_with(vec![
            PosterError::platform(Platform::Youtube, 503, "backend busy"),
            PosterError::platform(Platform::Youtube, 502, "bad gateway"),
        ]);
        let (store, publisher, poster) = setup(publisher, config());
        let video = ready_video("v1", vec![Platform::Youtube]);
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Youtube).await.unwrap();
        assert!(matches!(attempt, PostAttempt::Posted { .. }));
        assert_eq!(publisher.upload_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_failure() {
        let publisher = ScriptedPublisher::failing_with(vec![
            PosterError::platform(Platform::Youtube, 503, "busy"),
            PosterError::platform(Platform::Youtube, 503, "busy"),
            PosterError::platform(Platform::Youtube, 503, "still busy"),
        ]);
        let (store, publisher, poster) = setup(publisher, config());
        let video = ready_video("v1", vec![Platform::Youtube]);
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Youtube).await.unwrap();
        let PostAttempt::Failed { kind, message } = attempt else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::Transient);
        assert!(message.starts_with("Upload failed:"));
        assert!(message.contains("still busy"));
        assert_eq!(publisher.upload_count(), 3);
        assert_eq!(store.video("v1").unwrap().status, VideoStatus::Ready);
    }

    #[tokio::test]
    async fn test_reconnect_error_is_not_retried() {
        let publisher =
            ScriptedPublisher::failing_with(vec![PosterError::platform(Platform::Instagram, 401, "token expired")]);
        let (store, publisher, poster) = setup(publisher, config());
        let video = ready_video("v1", vec![Platform::Instagram]);
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Instagram).await.unwrap();
        assert!(matches!(
            attempt,
            PostAttempt::Failed {
                kind: FailureKind::Reconnect,
                ..
            }
        ));
        assert_eq!(publisher.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let store = Arc::new(InMemoryStore::new());
        let poster = Poster::new(store.clone(), store.clone(), Arc::new(ScriptedPublisher::default()), config());
        let video = ready_video("v1", vec![Platform::Facebook]);
        store.put_video(video.clone());

        let attempt = poster.post_to_platform(&video, Platform::Facebook).await.unwrap();
        let PostAttempt::Failed { kind, message } = attempt else {
            panic!("expected failure");
        };
        assert_eq!(kind, FailureKind::Reconnect);
        assert!(message.contains("No connected facebook account"));
    }

    #[tokio::test]
    async fn test_one_platform_failing_does_not_block_others() {
        let publisher =
            ScriptedPublisher::failing_with(vec![PosterError::platform(Platform::Youtube, 422, "policy violation")]);
        let (store, _publisher, poster) = setup(publisher, config());
        let video = ready_video("v1", vec![Platform::Youtube, Platform::Tiktok]);
        store.put_video(video.clone());

        let results = poster.post_video(&video, &video.target_platforms).await;
        let failed = results.iter().filter(|(_, a)| matches!(a, PostAttempt::Failed { .. })).count();
        let posted = results.iter().filter(|(_, a)| matches!(a, PostAttempt::Posted { .. })).count();
        assert_eq!((failed, posted), (1, 1));
        assert_eq!(store.video("v1").unwrap().status, VideoStatus::Posted);
    }

    #[tokio::test]
    async fn test_sweep_skips_failed_and_posted() {
        let (store, publisher, poster) = setup(ScriptedPublisher::default(), config());
        store.put_video(ready_video("fresh", vec![Platform::Youtube]));
        let mut failed = ready_video("failed", vec![Platform::Tiktok]);
        failed.posted_platforms = vec![PlatformEntry::failed(Platform::Tiktok, "boom", Utc::now())];
        store.put_video(failed);
        store.put_video(VideoRecord::new(VideoId::from("queued"), "user-1", "series-2"));

        let report = poster.sweep().await.unwrap();
        assert_eq!(report.videos, 1);
        assert_eq!(report.posted, 1);
        assert_eq!(publisher.upload_count(), 1);

        let again = poster.sweep().await.unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn test_post_now_retries_failed_platform() {
        let (store, _publisher, poster) = setup(ScriptedPublisher::default(), config());
        let mut video = ready_video("v1", vec![Platform::Tiktok]);
        video.posted_platforms = vec![PlatformEntry::failed(Platform::Tiktok, "boom", Utc::now())];
        store.put_video(video);

        let results = poster.post_now(&VideoId::from("v1")).await.unwrap();
        assert!(matches!(results[0].1, PostAttempt::Posted { .. }));

        let err = poster.post_now(&VideoId::from("missing")).await.unwrap_err();
        assert!(matches!(err, PosterError::VideoNotFound(_)));
    }

    #[tokio::test]
    async fn test_first_comment_is_posted() {
        let config = PosterConfig {
            first_comment: Some("Part 2 tomorrow".into()),
            ..config()
        };
        let (store, publisher, poster) = setup(ScriptedPublisher::default(), config);
        let video = ready_video("v1", vec![Platform::Youtube]);
        store.put_video(video.clone());

        poster.post_to_platform(&video, Platform::Youtube).await.unwrap();
        for _ in 0..100 {
            if !publisher.comments.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let comments = publisher.comments.lock().unwrap();
        assert_eq!(comments.as_slice(), &[("youtube-post".to_string(), "Part 2 tomorrow".to_string())]);
    }
}
