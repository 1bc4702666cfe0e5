//! Timer registry and fire handling.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use reel_firestore::{AutomationStore, VideoStore};
use reel_models::utils::MAX_ERROR_MESSAGE_LEN;
use reel_models::{truncate_message, Automation, GenerationJob, GenerationUpdate, VideoId, VideoRecord};
use reel_providers::{ScriptInput, ScriptProvider};
use reel_queue::JobSink;

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::next_fire::compute_next_fire_time;

/// What a fired timer led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// A video was created and its job enqueued.
    Enqueued(VideoId),
    /// The series still has a video in flight; nothing was created.
    SkippedOverlap,
    /// The automation is gone or disabled; its timer was dropped.
    Dropped,
}

/// Timers changed by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub armed: usize,
    pub unchanged: usize,
    pub cancelled: usize,
    /// Enabled but not armed (invalid times or beyond the horizon)
    pub deferred: usize,
}

struct ArmedTimer {
    fire_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// One timer per enabled automation, owned by this process.
///
/// The registry starts empty; the first [`Scheduler::sync_schedules`]
/// rebuilds it from the store.
pub struct Scheduler {
    automations: Arc<dyn AutomationStore>,
    videos: Arc<dyn VideoStore>,
    scripts: Arc<dyn ScriptProvider>,
    sink: Arc<dyn JobSink>,
    config: SchedulerConfig,
    timers: Mutex<HashMap<String, ArmedTimer>>,
    dispatch_tx: mpsc::UnboundedSender<String>,
    dispatch_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    pub fn new(
        automations: Arc<dyn AutomationStore>,
        videos: Arc<dyn VideoStore>,
        scripts: Arc<dyn ScriptProvider>,
        sink: Arc<dyn JobSink>,
        config: SchedulerConfig,
    ) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        Self {
            automations,
            videos,
            scripts,
            sink,
            config,
            timers: Mutex::new(HashMap::new()),
            dispatch_tx,
            dispatch_rx: Mutex::new(Some(dispatch_rx)),
        }
    }

    /// Sync at boot and every `sync_interval`, and run fired automations
    /// until shutdown. Handlers for different automations run concurrently.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        let mut dispatch = lock(&self.dispatch_rx)
            .take()
            .ok_or(SchedulerError::AlreadyRunning)?;
        let mut sync = tokio::time::interval(self.config.sync_interval);

        info!("Scheduler started, syncing every {:?}", self.config.sync_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = sync.tick() => {
                    match self.sync_schedules(Utc::now()).await {
                        Ok(report) => debug!(?report, "Schedules synced"),
                        Err(e) => warn!("Schedule sync failed: {}", e),
                    }
                }
                Some(id) = dispatch.recv() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = scheduler.on_fire(&id).await {
                            error!(automation_id = %id, "Automation run failed: {}", e);
                        }
                    });
                }
            }
        }

        self.cancel_all();
        info!("Scheduler stopped");
        Ok(())
    }

    /// Cancel any timer for this automation and arm the next one.
    /// Returns the armed fire time, if any.
    pub fn schedule(&self, automation: &Automation, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cancel(&automation.id);
        let fire_at = self.next_fire_for(automation, now)?;
        self.arm(&automation.id, fire_at, now).then_some(fire_at)
    }

    /// Drop the timer for `id`. Returns whether one was armed.
    pub fn cancel(&self, id: &str) -> bool {
        match lock(&self.timers).remove(id) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, timer) in lock(&self.timers).drain() {
            timer.handle.abort();
        }
    }

    /// When the timer for `id` will fire.
    pub fn armed_at(&self, id: &str) -> Option<DateTime<Utc>> {
        lock(&self.timers).get(id).map(|t| t.fire_at)
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.timers).len()
    }

    /// Reconcile timers with the enabled automations in the store.
    pub async fn sync_schedules(&self, now: DateTime<Utc>) -> SchedulerResult<SyncReport> {
        let automations = self.automations.list_enabled_automations().await?;
        let enabled: HashSet<&str> = automations.iter().map(|a| a.id.as_str()).collect();
        let mut report = SyncReport::default();

        let stale: Vec<String> = lock(&self.timers)
            .keys()
            .filter(|id| !enabled.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            if self.cancel(&id) {
                info!(automation_id = %id, "Automation no longer enabled, timer cancelled");
                report.cancelled += 1;
            }
        }

        for automation in &automations {
            let Some(fire_at) = self.next_fire_for(automation, now) else {
                self.cancel(&automation.id);
                report.deferred += 1;
                continue;
            };

            let close_enough = self
                .armed_at(&automation.id)
                .is_some_and(|armed| (armed - fire_at).abs() <= self.config.rearm_tolerance);
            if close_enough {
                report.unchanged += 1;
                continue;
            }

            self.cancel(&automation.id);
            if self.arm(&automation.id, fire_at, now) {
                report.armed += 1;
            } else {
                report.deferred += 1;
            }
        }

        metrics::gauge!("reel_scheduler_armed_timers").set(self.armed_count() as f64);
        Ok(report)
    }

    /// Run one automation now.
    ///
    /// Script, video or enqueue failures are returned after the automation
    /// has been rescheduled; nothing is retried this cycle. Store failures
    /// before the run is recorded re-arm the timer after `fire_retry_delay`.
    pub async fn on_fire(&self, id: &str) -> SchedulerResult<FireOutcome> {
        let now = Utc::now();
        self.forget_fired(id, now);

        let automation = match self.automations.get_automation(id).await {
            Ok(Some(a)) if a.enabled => a,
            Ok(_) => {
                self.cancel(id);
                info!(automation_id = %id, "Automation missing or disabled, timer dropped");
                record_fire("dropped");
                return Ok(FireOutcome::Dropped);
            }
            Err(e) => return Err(self.retry_fire(id, now, e.into())),
        };

        let busy = match self
            .videos
            .has_unfinished_in_series(&automation.user_id, &automation.series_id)
            .await
        {
            Ok(busy) => busy,
            Err(e) => return Err(self.retry_fire(id, now, e.into())),
        };
        if busy {
            info!(
                automation_id = %id,
                series_id = %automation.series_id,
                "Series already has a video in progress, skipping this run"
            );
            self.schedule(&automation, now);
            record_fire("skipped");
            return Ok(FireOutcome::SkippedOverlap);
        }

        if let Err(e) = self.automations.record_run(id, now).await {
            return Err(self.retry_fire(id, now, e.into()));
        }
        let automation = Automation {
            last_run_at: Some(now),
            ..automation
        };

        let result = self.create_and_enqueue(&automation).await;
        self.schedule(&automation, now);
        match &result {
            Ok(video_id) => {
                info!(automation_id = %id, video_id = %video_id, "Automation run enqueued");
                record_fire("enqueued");
            }
            Err(_) => record_fire("failed"),
        }
        result.map(FireOutcome::Enqueued)
    }

    /// Arm a short retry for a fire that failed before anything was written.
    fn retry_fire(&self, id: &str, now: DateTime<Utc>, err: SchedulerError) -> SchedulerError {
        let retry_at = now + self.config.fire_retry_delay;
        if self.arm(id, retry_at, now) {
            warn!(automation_id = %id, %retry_at, "Automation run failed before starting, retrying: {}", err);
        }
        record_fire("failed");
        err
    }

    async fn create_and_enqueue(&self, automation: &Automation) -> SchedulerResult<VideoId> {
        let script = self
            .scripts
            .generate_script(&ScriptInput::for_automation(automation))
            .await?;
        let narration = script.narration();

        let video_id = VideoId::new();
        let video = VideoRecord::new(video_id.clone(), automation.user_id.clone(), automation.series_id.clone())
            .with_automation(automation.id.clone())
            .with_content(script.title.clone(), script.description.clone(), script.hashtags.clone())
            .with_script(narration.clone(), script.scenes.clone())
            .with_duration(automation.duration_seconds)
            .with_platforms(automation.target_platforms.clone());
        self.videos.create_video(&video).await?;

        let job = GenerationJob::for_automation(video_id.clone(), automation).with_script(
            script.title,
            narration,
            script.scenes,
        );
        if let Err(e) = self.sink.enqueue(&job).await {
            let update = GenerationUpdate::Failed {
                error: truncate_message(&format!("Failed to enqueue: {}", e), MAX_ERROR_MESSAGE_LEN),
            };
            if let Err(write_err) = self.videos.update_generation(&video_id, &update).await {
                error!(video_id = %video_id, "Failed to mark unqueued video FAILED: {}", write_err);
            }
            return Err(e.into());
        }
        Ok(video_id)
    }

    fn next_fire_for(&self, automation: &Automation, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !automation.enabled {
            return None;
        }
        match automation.schedulable_times() {
            Ok(times) => Some(compute_next_fire_time(
                &times,
                &automation.timezone,
                automation.frequency,
                automation.last_run_at,
                now,
            )),
            Err(e) => {
                warn!(
                    automation_id = %automation.id,
                    post_times = %automation.post_times,
                    "Not scheduling automation: {}", e
                );
                None
            }
        }
    }

    /// Start a one-shot timer that sends `id` to the dispatch loop.
    /// Returns `false` when `fire_at` is beyond the arming horizon.
    pub(crate) fn arm(&self, id: &str, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if fire_at - now > self.config.arm_horizon {
            debug!(automation_id = %id, %fire_at, "Fire time beyond horizon, left for a later sync");
            return false;
        }

        let delay = (fire_at - now).to_std().unwrap_or_default();
        let tx = self.dispatch_tx.clone();
        let timer_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(timer_id);
        });

        if let Some(old) = lock(&self.timers).insert(id.to_string(), ArmedTimer { fire_at, handle }) {
            old.handle.abort();
        }
        debug!(automation_id = %id, %fire_at, "Timer armed");
        true
    }

    /// Remove the registry entry of a timer that has gone off.
    fn forget_fired(&self, id: &str, now: DateTime<Utc>) {
        let mut timers = lock(&self.timers);
        if timers.get(id).is_some_and(|t| t.fire_at <= now) {
            timers.remove(id);
        }
    }

    #[cfg(test)]
    pub(crate) fn take_dispatch(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        lock(&self.dispatch_rx).take()
    }
}

fn record_fire(outcome: &'static str) {
    metrics::counter!("reel_scheduler_fires_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::Duration;

    use reel_firestore::{FirestoreError, FirestoreResult, InMemoryStore};
    use reel_models::{Platform, Scene, VideoStatus};
    use reel_providers::{GeneratedScript, ProviderError, ProviderResult};
    use reel_queue::{EnqueueOutcome, MemoryJobSink, QueueError, QueueResult};

    struct FakeScripts {
        fail: AtomicBool,
    }

    #[async_trait]
    impl ScriptProvider for FakeScripts {
        async fn generate_script(&self, input: &ScriptInput) -> ProviderResult<GeneratedScript> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProviderError::Api {
                    status: 503,
                    message: "llm overloaded".into(),
                });
            }
            Ok(GeneratedScript {
                title: format!("A {} story", input.niche),
                description: "desc".into(),
                hashtags: vec!["#shorts".into()],
                scenes: vec![
                    Scene {
                        text: "Wait.".into(),
                        visual_description: "hallway".into(),
                    },
                    Scene {
                        text: "Something moved in the dark.".into(),
                        visual_description: "shadow".into(),
                    },
                ],
            })
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl JobSink for BrokenSink {
        async fn enqueue(&self, _job: &GenerationJob) -> QueueResult<EnqueueOutcome> {
            Err(QueueError::enqueue_failed("redis down"))
        }

        async fn remove(&self, _id: &str) -> QueueResult<bool> {
            Ok(false)
        }
    }

    /// Automation store whose reads or run stamps fail on demand.
    struct FlakyAutomations {
        inner: Arc<InMemoryStore>,
        fail_reads: AtomicBool,
        fail_runs: AtomicBool,
    }

    #[async_trait]
    impl AutomationStore for FlakyAutomations {
        async fn list_enabled_automations(&self) -> FirestoreResult<Vec<Automation>> {
            self.inner.list_enabled_automations().await
        }

        async fn get_automation(&self, id: &str) -> FirestoreResult<Option<Automation>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(FirestoreError::RequestFailed {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            self.inner.get_automation(id).await
        }

        async fn record_run(&self, id: &str, at: DateTime<Utc>) -> FirestoreResult<()> {
            if self.fail_runs.load(Ordering::SeqCst) {
                return Err(FirestoreError::RateLimited(1_000));
            }
            self.inner.record_run(id, at).await
        }
    }

    fn automation(id: &str, series: &str) -> Automation {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "user_id": "user-1",
            "series_id": series,
            "niche": "horror",
            "voice_id": "narrator",
            "duration_seconds": 45,
            "target_platforms": ["youtube", "tiktok"],
            "enabled": true,
            "frequency": "daily",
            "post_times": "09:00, 21:00",
            "timezone": "Asia/Kolkata",
        }))
        .unwrap()
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        sink: Arc<MemoryJobSink>,
        scripts: Arc<FakeScripts>,
        scheduler: Scheduler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(MemoryJobSink::new());
        let scripts = Arc::new(FakeScripts {
            fail: AtomicBool::new(false),
        });
        let scheduler = Scheduler::new(
            store.clone(),
            store.clone(),
            scripts.clone(),
            sink.clone(),
            SchedulerConfig::default(),
        );
        Fixture {
            store,
            sink,
            scripts,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_on_fire_creates_video_and_job() {
        let f = fixture();
        f.store.put_automation(automation("auto-1", "series-1"));

        let outcome = f.scheduler.on_fire("auto-1").await.unwrap();
        let FireOutcome::Enqueued(video_id) = outcome else {
            panic!("expected enqueue, got {:?}", outcome);
        };

        let video = f.store.video(video_id.as_str()).unwrap();
        assert_eq!(video.status, VideoStatus::Queued);
        assert_eq!(video.title, "A horror story");
        assert_eq!(video.script, "Wait. Something moved in the dark.");
        assert_eq!(video.target_platforms, vec![Platform::Youtube, Platform::Tiktok]);
        assert_eq!(video.automation_id.as_deref(), Some("auto-1"));

        let jobs = f.sink.accepted();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].video_id, video_id);
        assert_eq!(jobs[0].scenes.len(), 2);
        assert_eq!(jobs[0].voice_id, "narrator");

        let last_run = f.store.automation("auto-1").unwrap().last_run_at.unwrap();
        let rearmed = f.scheduler.armed_at("auto-1").unwrap();
        assert!(rearmed >= last_run + Duration::hours(20));
    }

    #[tokio::test]
    async fn test_overlap_guard_skips_and_reschedules() {
        let f = fixture();
        f.store.put_automation(automation("auto-1", "series-1"));
        f.store
            .put_video(VideoRecord::new(VideoId::from("busy"), "user-1", "series-1"));

        let outcome = f.scheduler.on_fire("auto-1").await.unwrap();
        assert_eq!(outcome, FireOutcome::SkippedOverlap);
        assert!(f.sink.accepted().is_empty());
        assert_eq!(f.store.videos().len(), 1);
        assert!(f.store.automation("auto-1").unwrap().last_run_at.is_none());
        assert!(f.scheduler.armed_at("auto-1").is_some());
    }

    #[tokio::test]
    async fn test_overlap_guard_covers_whole_series() {
        let f = fixture();
        f.store.put_automation(automation("auto-1", "series-1"));
        let mut other = VideoRecord::new(VideoId::from("other"), "user-1", "series-1").with_automation("auto-2");
        other.apply(
            &GenerationUpdate::Stage(reel_models::GenerationStage::Images),
            Utc::now(),
        );
        f.store.put_video(other);

        assert_eq!(f.scheduler.on_fire("auto-1").await.unwrap(), FireOutcome::SkippedOverlap);
    }

    #[tokio::test]
    async fn test_disabled_automation_drops_timer() {
        let f = fixture();
        let mut a = automation("auto-1", "series-1");
        f.scheduler.schedule(&a, Utc::now()).unwrap();
        a.enabled = false;
        f.store.put_automation(a);

        assert_eq!(f.scheduler.on_fire("auto-1").await.unwrap(), FireOutcome::Dropped);
        assert!(f.scheduler.armed_at("auto-1").is_none());
        assert_eq!(f.scheduler.on_fire("missing").await.unwrap(), FireOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_script_failure_creates_nothing_and_reschedules() {
        let f = fixture();
        f.store.put_automation(automation("auto-1", "series-1"));
        f.scripts.fail.store(true, Ordering::SeqCst);

        let err = f.scheduler.on_fire("auto-1").await.unwrap_err();
        assert!(matches!(err, SchedulerError::Provider(_)));
        assert!(f.store.videos().is_empty());
        assert!(f.sink.accepted().is_empty());
        assert!(f.store.automation("auto-1").unwrap().last_run_at.is_some());
        assert!(f.scheduler.armed_at("auto-1").is_some());
    }

    #[tokio::test]
    async fn test_enqueue_failure_marks_video_failed() {
        let store = Arc::new(InMemoryStore::new());
        store.put_automation(automation("auto-1", "series-1"));
        let scheduler = Scheduler::new(
            store.clone(),
            store.clone(),
            Arc::new(FakeScripts {
                fail: AtomicBool::new(false),
            }),
            Arc::new(BrokenSink),
            SchedulerConfig::default(),
        );

        assert!(matches!(
            scheduler.on_fire("auto-1").await.unwrap_err(),
            SchedulerError::Queue(_)
        ));
        let videos = store.videos();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].status, VideoStatus::Failed);
        assert!(videos[0].error_message.as_deref().unwrap().contains("redis down"));

        // The failed video no longer blocks the series
        assert!(!store.has_unfinished_in_series("user-1", "series-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_errors_keep_a_timer_armed() {
        let store = Arc::new(InMemoryStore::new());
        store.put_automation(automation("auto-1", "series-1"));
        let automations = Arc::new(FlakyAutomations {
            inner: store.clone(),
            fail_reads: AtomicBool::new(true),
            fail_runs: AtomicBool::new(false),
        });
        let sink = Arc::new(MemoryJobSink::new());
        let scheduler = Scheduler::new(
            automations.clone(),
            store.clone(),
            Arc::new(FakeScripts {
                fail: AtomicBool::new(false),
            }),
            sink.clone(),
            SchedulerConfig::default(),
        );

        let before = Utc::now();
        let err = scheduler.on_fire("auto-1").await.unwrap_err();
        assert!(matches!(err, SchedulerError::Firestore(_)));
        let retry_at = scheduler.armed_at("auto-1").expect("timer re-armed after read failure");
        assert!(retry_at >= before + Duration::minutes(2));
        assert!(retry_at <= Utc::now() + Duration::minutes(2));

        automations.fail_reads.store(false, Ordering::SeqCst);
        automations.fail_runs.store(true, Ordering::SeqCst);
        scheduler.cancel("auto-1");
        assert!(scheduler.on_fire("auto-1").await.is_err());
        assert!(scheduler.armed_at("auto-1").is_some());
        assert!(store.videos().is_empty());
        assert!(sink.accepted().is_empty());

        automations.fail_runs.store(false, Ordering::SeqCst);
        assert!(matches!(
            scheduler.on_fire("auto-1").await.unwrap(),
            FireOutcome::Enqueued(_)
        ));
    }

    #[tokio::test]
    async fn test_sync_arms_cancels_and_keeps() {
        let f = fixture();
        f.store.put_automation(automation("auto-1", "series-1"));
        f.store.put_automation(automation("auto-2", "series-2"));
        let mut disabled = automation("auto-3", "series-3");
        disabled.enabled = false;
        f.store.put_automation(disabled);

        let now = Utc::now();
        let report = f.scheduler.sync_schedules(now).await.unwrap();
        assert_eq!(report.armed, 2);
        assert_eq!(f.scheduler.armed_count(), 2);

        let report = f.scheduler.sync_schedules(now + Duration::seconds(5)).await.unwrap();
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.armed, 0);

        let mut a2 = f.store.automation("auto-2").unwrap();
        a2.enabled = false;
        f.store.put_automation(a2);
        let report = f.scheduler.sync_schedules(now).await.unwrap();
        assert_eq!(report.cancelled, 1);
        assert!(f.scheduler.armed_at("auto-2").is_none());
        assert!(f.scheduler.armed_at("auto-1").is_some());
    }

    #[tokio::test]
    async fn test_sync_defers_invalid_post_times() {
        let f = fixture();
        let mut a = automation("auto-1", "series-1");
        a.post_times = "25:99".into();
        f.store.put_automation(a);

        let report = f.scheduler.sync_schedules(Utc::now()).await.unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(f.scheduler.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_defers_automation_failing_validation() {
        let f = fixture();
        let mut a = automation("auto-1", "series-1");
        a.duration_seconds = 5;
        f.store.put_automation(a);
        f.store.put_automation(automation("auto-2", "series-2"));

        let report = f.scheduler.sync_schedules(Utc::now()).await.unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(report.armed, 1);
        assert!(f.scheduler.armed_at("auto-1").is_none());
    }

    #[tokio::test]
    async fn test_arm_respects_horizon() {
        let f = fixture();
        let now = Utc::now();
        assert!(!f.scheduler.arm("far", now + Duration::days(9), now));
        assert!(f.scheduler.armed_at("far").is_none());
        assert!(f.scheduler.arm("near", now + Duration::days(7), now));
    }

    #[tokio::test]
    async fn test_expired_timer_dispatches_id() {
        let f = fixture();
        let mut dispatch = f.scheduler.take_dispatch().unwrap();
        let now = Utc::now();
        assert!(f.scheduler.arm("auto-1", now + Duration::milliseconds(20), now));

        let id = tokio::time::timeout(StdDuration::from_secs(2), dispatch.recv())
            .await
            .unwrap();
        assert_eq!(id.as_deref(), Some("auto-1"));
    }

    #[tokio::test]
    async fn test_schedule_replaces_existing_timer() {
        let f = fixture();
        let a = automation("auto-1", "series-1");
        let now = Utc::now();
        let first = f.scheduler.schedule(&a, now).unwrap();
        let second = f.scheduler.schedule(&a, now).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.scheduler.armed_count(), 1);
    }
}
