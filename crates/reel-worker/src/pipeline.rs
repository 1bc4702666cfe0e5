//! The generation state machine.
//!
//! `SCRIPT → TTS → IMAGES → ASSEMBLY → UPLOADING → READY`, each stage
//! persisted before it starts. Any error marks the video `FAILED` and is
//! returned so the queue can back off and retry from `SCRIPT`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, Instrument};

use reel_firestore::VideoStore;
use reel_media::{remove_dir_quietly, AssembledVideo, AssemblyRequest, TimedScene, VideoAssembler};
use reel_models::utils::MAX_ERROR_MESSAGE_LEN;
use reel_models::{truncate_message, GenerationJob, GenerationStage, GenerationUpdate};
use reel_providers::{fetch_asset, ImageProvider, ImageRequest, ImageSet, SpeechOutput, SpeechProvider, SpeechRequest};
use reel_storage::{video_key, MediaStore};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub video_url: String,
    pub duration_ms: u64,
}

/// Runs one [`GenerationJob`] end to end.
pub struct GenerationPipeline {
    videos: Arc<dyn VideoStore>,
    speech: Arc<dyn SpeechProvider>,
    images: Arc<dyn ImageProvider>,
    assembler: Arc<dyn VideoAssembler>,
    media: Arc<dyn MediaStore>,
    http: reqwest::Client,
    work_root: PathBuf,
}

impl GenerationPipeline {
    pub fn new(
        videos: Arc<dyn VideoStore>,
        speech: Arc<dyn SpeechProvider>,
        images: Arc<dyn ImageProvider>,
        assembler: Arc<dyn VideoAssembler>,
        media: Arc<dyn MediaStore>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            videos,
            speech,
            images,
            assembler,
            media,
            http: reqwest::Client::new(),
            work_root: work_root.into(),
        }
    }

    /// Client used to fetch remote music tracks.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Per-job scratch directory. Removed when the run ends.
    pub fn work_dir_for(&self, job: &GenerationJob) -> PathBuf {
        self.work_root.join(job.video_id.as_str())
    }

    /// Run every stage. On failure the video is marked `FAILED` with a
    /// truncated message and the error is returned.
    pub async fn run(&self, job: &GenerationJob, attempt: u32) -> WorkerResult<GenerationOutcome> {
        let logger = JobLogger::new(&job.video_id, attempt);
        let work_dir = self.work_dir_for(job);
        let started = Instant::now();

        let result = async {
            logger.log_start(&format!("{} scenes", job.scenes.len()));
            tokio::fs::create_dir_all(&work_dir).await?;
            self.run_stages(job, &work_dir, &logger).await
        }
        .instrument(logger.create_span())
        .await;

        remove_dir_quietly(&work_dir).await;

        match result {
            Ok(outcome) => {
                metrics::counter!("reel_generations_total", "outcome" => "ready").increment(1);
                metrics::histogram!("reel_generation_duration_seconds").record(started.elapsed().as_secs_f64());
                logger.log_completion(&outcome.video_url);
                Ok(outcome)
            }
            Err(e) => {
                metrics::counter!("reel_generations_total", "outcome" => "failed").increment(1);
                let message = truncate_message(&e.user_message(), MAX_ERROR_MESSAGE_LEN);
                logger.log_error(&message);
                let update = GenerationUpdate::Failed { error: message };
                if let Err(write_err) = self.videos.update_generation(&job.video_id, &update).await {
                    error!(video_id = %job.video_id, "Failed to mark video FAILED: {}", write_err);
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &GenerationJob,
        work_dir: &Path,
        logger: &JobLogger,
    ) -> WorkerResult<GenerationOutcome> {
        let stage = self.enter(job, logger, GenerationStage::Script).await?;
        self.script(job).await?;
        finish(stage);

        let stage = self.enter(job, logger, GenerationStage::Tts).await?;
        let speech = self.speech(job, work_dir).await?;
        finish(stage);

        let stage = self.enter(job, logger, GenerationStage::Images).await?;
        let images = self.images(job, work_dir).await?;
        finish(stage);

        let result = self.assemble_and_publish(job, work_dir, &speech, &images, logger).await;
        release_images(&images, work_dir).await;
        result
    }

    async fn assemble_and_publish(
        &self,
        job: &GenerationJob,
        work_dir: &Path,
        speech: &SpeechOutput,
        images: &ImageSet,
        logger: &JobLogger,
    ) -> WorkerResult<GenerationOutcome> {
        let stage = self.enter(job, logger, GenerationStage::Assembly).await?;
        let assembled = self.assemble(job, work_dir, speech, images, logger).await?;
        finish(stage);

        let stage = self.enter(job, logger, GenerationStage::Uploading).await?;
        let key = video_key(&job.user_id, job.video_id.as_str());
        let video_url = self.media.publish(&assembled.path, &key).await?;
        finish(stage);

        let outcome = GenerationOutcome {
            video_url,
            duration_ms: speech.duration_ms,
        };
        self.videos
            .update_generation(
                &job.video_id,
                &GenerationUpdate::Ready {
                    video_url: outcome.video_url.clone(),
                    duration_ms: outcome.duration_ms,
                },
            )
            .await?;
        Ok(outcome)
    }

    async fn enter(&self, job: &GenerationJob, logger: &JobLogger, stage: GenerationStage) -> WorkerResult<(GenerationStage, Instant)> {
        logger.log_stage(stage);
        self.videos
            .update_generation(&job.video_id, &GenerationUpdate::Stage(stage))
            .await?;
        Ok((stage, Instant::now()))
    }

    async fn script(&self, job: &GenerationJob) -> WorkerResult<()> {
        if job.scenes.is_empty() {
            return Err(WorkerError::job_failed("job has no scenes"));
        }
        self.videos
            .save_script(&job.video_id, &job.title, &job.script, &job.scenes)
            .await?;
        Ok(())
    }

    async fn speech(&self, job: &GenerationJob, work_dir: &Path) -> WorkerResult<SpeechOutput> {
        let request = SpeechRequest {
            script: job.script.clone(),
            scenes: job.scenes.clone(),
            voice_id: job.voice_id.clone(),
            language: job.language.clone(),
            provider: job.tts_provider.clone(),
            work_dir: work_dir.to_path_buf(),
        };
        let output = self.speech.generate_speech(&request).await?;

        if output.scene_timings.len() != job.scenes.len() {
            return Err(WorkerError::stage_mismatch(format!(
                "{} scene timings for {} scenes",
                output.scene_timings.len(),
                job.scenes.len()
            )));
        }
        Ok(output)
    }

    async fn images(&self, job: &GenerationJob, work_dir: &Path) -> WorkerResult<ImageSet> {
        let prompts = job
            .scenes
            .iter()
            .map(|scene| {
                if scene.visual_description.trim().is_empty() {
                    scene.text.clone()
                } else {
                    scene.visual_description.clone()
                }
            })
            .collect();
        let request = ImageRequest {
            prompts,
            style_prompt: job.art_style_prompt.clone(),
            negative_prompt: job.negative_prompt.clone(),
            provider: job.image_provider.clone(),
            work_dir: work_dir.to_path_buf(),
        };
        let set = self.images.generate_images(&request).await?;

        if let Err(e) = check_images(&set, job.scenes.len()).await {
            release_images(&set, work_dir).await;
            return Err(e);
        }
        Ok(set)
    }

    async fn assemble(
        &self,
        job: &GenerationJob,
        work_dir: &Path,
        speech: &SpeechOutput,
        images: &ImageSet,
        logger: &JobLogger,
    ) -> WorkerResult<AssembledVideo> {
        let music_path = match job.music_path.as_deref() {
            Some(source) => match fetch_asset(&self.http, source, &work_dir.join("music")).await {
                Ok(path) => Some(path),
                Err(e) => {
                    logger.log_warning(&format!("music unavailable, narration only: {}", e));
                    None
                }
            },
            None => None,
        };

        let scenes = job
            .scenes
            .iter()
            .zip(&images.image_paths)
            .zip(&speech.scene_timings)
            .map(|((scene, image), timing)| TimedScene {
                text: scene.text.clone(),
                image_path: image.clone(),
                start_ms: timing.start_ms,
                end_ms: timing.end_ms,
            })
            .collect();

        let request = AssemblyRequest {
            scenes,
            narration_path: speech.audio_path.clone(),
            narration_ms: speech.duration_ms,
            music_path,
            niche: job.niche.clone(),
            tone: job.tone.clone(),
            work_dir: work_dir.to_path_buf(),
            output_path: work_dir.join("output.mp4"),
        };
        let assembled = self.assembler.assemble(&request).await?;
        logger.log_progress(&format!(
            "assembled {} ms, {} captions, music {}",
            assembled.duration_ms,
            assembled.caption_count,
            if assembled.music_used { "on" } else { "off" }
        ));
        Ok(assembled)
    }
}

async fn check_images(set: &ImageSet, scene_count: usize) -> WorkerResult<()> {
    if set.image_paths.len() != scene_count {
        return Err(WorkerError::stage_mismatch(format!(
            "{} images for {} scenes",
            set.image_paths.len(),
            scene_count
        )));
    }
    for (i, path) in set.image_paths.iter().enumerate() {
        if tokio::fs::metadata(path).await.is_err() {
            return Err(WorkerError::job_failed(format!(
                "image for scene {} missing at {}",
                i + 1,
                path.display()
            )));
        }
    }
    Ok(())
}

/// Remove a provider scratch directory that lives outside the job's own.
async fn release_images(set: &ImageSet, work_dir: &Path) {
    if !set.tmp_dir.starts_with(work_dir) {
        remove_dir_quietly(&set.tmp_dir).await;
    }
}

fn finish((stage, started): (GenerationStage, Instant)) {
    metrics::histogram!("reel_stage_duration_seconds", "stage" => stage.as_str())
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use reel_firestore::InMemoryStore;
    use reel_media::MediaResult;
    use reel_models::{Scene, VideoId, VideoRecord, VideoStatus};
    use reel_providers::{ProviderError, ProviderResult, SceneTiming};
    use reel_storage::StorageResult;

    /// Writes a narration file and records the video's stage at call time.
    pub(crate) struct FakeSpeech {
        pub store: Arc<InMemoryStore>,
        pub seen_stage: Mutex<Option<GenerationStage>>,
        pub drop_timing: bool,
    }

    #[async_trait]
    impl SpeechProvider for FakeSpeech {
        async fn generate_speech(&self, request: &SpeechRequest) -> ProviderResult<SpeechOutput> {
            let video_id = request.work_dir.file_name().unwrap().to_string_lossy().to_string();
            *self.seen_stage.lock().unwrap() = self.store.video(&video_id).and_then(|v| v.generation_stage);

            let audio_path = request.work_dir.join("narration.mp3");
            tokio::fs::write(&audio_path, b"mp3").await?;
            let mut scene_timings: Vec<SceneTiming> = (0..request.scenes.len() as u64)
                .map(|i| SceneTiming {
                    start_ms: i * 1000,
                    end_ms: (i + 1) * 1000,
                })
                .collect();
            if self.drop_timing {
                scene_timings.pop();
            }
            Ok(SpeechOutput {
                audio_path,
                duration_ms: request.scenes.len() as u64 * 1000,
                scene_timings,
            })
        }
    }

    /// Writes one image per prompt, or fewer when `short_by` is set.
    /// Images land in `out_dir` when given, else under the job directory.
    pub(crate) struct FakeImages {
        pub short_by: usize,
        pub calls: AtomicUsize,
        pub out_dir: Option<PathBuf>,
    }

    #[async_trait]
    impl ImageProvider for FakeImages {
        async fn generate_images(&self, request: &ImageRequest) -> ProviderResult<ImageSet> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let dir = self.out_dir.clone().unwrap_or_else(|| request.work_dir.join("images"));
            tokio::fs::create_dir_all(&dir).await?;
            let count = request.prompts.len().saturating_sub(self.short_by);
            let mut image_paths = Vec::new();
            for i in 0..count {
                let path = dir.join(format!("scene_{:02}.png", i));
                tokio::fs::write(&path, b"png").await?;
                image_paths.push(path);
            }
            Ok(ImageSet {
                image_paths,
                tmp_dir: dir,
            })
        }
    }

    pub(crate) struct FakeAssembler {
        pub requests: Mutex<Vec<AssemblyRequest>>,
    }

    #[async_trait]
    impl VideoAssembler for FakeAssembler {
        async fn assemble(&self, request: &AssemblyRequest) -> MediaResult<AssembledVideo> {
            tokio::fs::write(&request.output_path, b"mp4").await?;
            self.requests.lock().unwrap().push(request.clone());
            Ok(AssembledVideo {
                path: request.output_path.clone(),
                duration_ms: request.narration_ms,
                caption_count: request.scenes.len(),
                music_used: request.music_path.is_some(),
            })
        }
    }

    pub(crate) struct FakeMedia {
        pub published: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaStore for FakeMedia {
        async fn publish(&self, local: &Path, key: &str) -> StorageResult<String> {
            assert!(local.exists(), "published file must exist");
            self.published.lock().unwrap().push(key.to_string());
            Ok(format!("https://cdn.test/{}", key))
        }

        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
    }

    pub(crate) struct Harness {
        pub store: Arc<InMemoryStore>,
        pub speech: Arc<FakeSpeech>,
        pub images: Arc<FakeImages>,
        pub assembler: Arc<FakeAssembler>,
        pub media: Arc<FakeMedia>,
        pub work_root: TempDir,
    }

    impl Harness {
        pub fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            Self {
                speech: Arc::new(FakeSpeech {
                    store: store.clone(),
                    seen_stage: Mutex::new(None),
                    drop_timing: false,
                }),
                store,
                images: Arc::new(FakeImages {
                    short_by: 0,
                    calls: AtomicUsize::new(0),
                    out_dir: None,
                }),
                assembler: Arc::new(FakeAssembler {
                    requests: Mutex::new(Vec::new()),
                }),
                media: Arc::new(FakeMedia {
                    published: Mutex::new(Vec::new()),
                }),
                work_root: TempDir::new().unwrap(),
            }
        }

        pub fn pipeline(&self) -> GenerationPipeline {
            GenerationPipeline::new(
                self.store.clone(),
                self.speech.clone(),
                self.images.clone(),
                self.assembler.clone(),
                self.media.clone(),
                self.work_root.path(),
            )
        }
    }

    pub(crate) fn scenes() -> Vec<Scene> {
        vec![
            Scene {
                text: "Wait.".into(),
                visual_description: "a dark hallway".into(),
            },
            Scene {
                text: "Something moved in the dark.".into(),
                visual_description: "".into(),
            },
            Scene {
                text: "It was the cat.".into(),
                visual_description: "a black cat".into(),
            },
        ]
    }

    pub(crate) fn queued_job(store: &InMemoryStore, id: &str) -> GenerationJob {
        store.put_video(VideoRecord::new(VideoId::from(id), "user-1", "series-1"));
        GenerationJob::new(VideoId::from(id), "user-1", "series-1")
            .with_script("The Hallway", "Wait. Something moved in the dark. It was the cat.", scenes())
            .with_voice("narrator", "en")
            .with_mood("horror stories", "suspenseful")
    }

    #[tokio::test]
    async fn test_run_reaches_ready() {
        let h = Harness::new();
        let job = queued_job(&h.store, "vid-1");

        let outcome = h.pipeline().run(&job, 1).await.unwrap();
        assert_eq!(outcome.video_url, "https://cdn.test/videos/user-1/vid-1.mp4");
        assert_eq!(outcome.duration_ms, 3000);

        let video = h.store.video("vid-1").unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.generation_stage, None);
        assert_eq!(video.video_url.as_deref(), Some(outcome.video_url.as_str()));
        assert_eq!(video.duration_ms, Some(3000));
        assert_eq!(video.title, "The Hallway");
        assert_eq!(video.scenes.len(), 3);
        assert!(video.stage_is_consistent());

        assert_eq!(*h.speech.seen_stage.lock().unwrap(), Some(GenerationStage::Tts));
        assert!(!h.pipeline().work_dir_for(&job).exists());
    }

    #[tokio::test]
    async fn test_assembly_request_pairs_scenes_with_images_and_timings() {
        let h = Harness::new();
        let job = queued_job(&h.store, "vid-2");
        h.pipeline().run(&job, 1).await.unwrap();

        let requests = h.assembler.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.scenes.len(), 3);
        assert_eq!(request.scenes[1].text, "Something moved in the dark.");
        assert_eq!((request.scenes[1].start_ms, request.scenes[1].end_ms), (1000, 2000));
        assert!(request.scenes[2].image_path.ends_with("scene_02.png"));
        assert_eq!(request.narration_ms, 3000);
        assert_eq!(request.niche, "horror stories");
        assert!(request.music_path.is_none());
    }

    #[tokio::test]
    async fn test_missing_image_fails_video() {
        let mut h = Harness::new();
        h.images = Arc::new(FakeImages {
            short_by: 1,
            calls: AtomicUsize::new(0),
            out_dir: None,
        });
        let job = queued_job(&h.store, "vid-3");

        let err = h.pipeline().run(&job, 1).await.unwrap_err();
        assert!(matches!(err, WorkerError::StageMismatch(_)));

        let video = h.store.video("vid-3").unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert_eq!(video.generation_stage, None);
        assert!(video.error_message.unwrap().contains("2 images for 3 scenes"));
        assert!(h.assembler.requests.lock().unwrap().is_empty());
        assert!(!h.pipeline().work_dir_for(&job).exists());
    }

    #[tokio::test]
    async fn test_timing_count_mismatch_fails_before_images() {
        let mut h = Harness::new();
        h.speech = Arc::new(FakeSpeech {
            store: h.store.clone(),
            seen_stage: Mutex::new(None),
            drop_timing: true,
        });
        let job = queued_job(&h.store, "vid-4");

        assert!(h.pipeline().run(&job, 1).await.is_err());
        assert_eq!(h.images.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.video("vid-4").unwrap().status, VideoStatus::Failed);
    }

    #[tokio::test]
    async fn test_outside_image_dir_is_removed_on_every_path() {
        let scratch = TempDir::new().unwrap();
        let mut h = Harness::new();

        let rejected = scratch.path().join("rejected");
        h.images = Arc::new(FakeImages {
            short_by: 1,
            calls: AtomicUsize::new(0),
            out_dir: Some(rejected.clone()),
        });
        let job = queued_job(&h.store, "vid-6");
        assert!(h.pipeline().run(&job, 1).await.is_err());
        assert!(!rejected.exists());

        let used = scratch.path().join("used");
        h.images = Arc::new(FakeImages {
            short_by: 0,
            calls: AtomicUsize::new(0),
            out_dir: Some(used.clone()),
        });
        let job = queued_job(&h.store, "vid-7");
        h.pipeline().run(&job, 1).await.unwrap();
        assert!(!used.exists());
    }

    #[tokio::test]
    async fn test_rerun_after_failure_ends_ready() {
        let mut h = Harness::new();
        h.images = Arc::new(FakeImages {
            short_by: 1,
            calls: AtomicUsize::new(0),
            out_dir: None,
        });
        let job = queued_job(&h.store, "vid-5");
        assert!(h.pipeline().run(&job, 1).await.is_err());

        h.images = Arc::new(FakeImages {
            short_by: 0,
            calls: AtomicUsize::new(0),
            out_dir: None,
        });
        h.pipeline().run(&job, 2).await.unwrap();

        let video = h.store.video("vid-5").unwrap();
        assert_eq!(video.status, VideoStatus::Ready);
        assert_eq!(video.error_message, None);
        assert_eq!(h.media.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_script_fails() {
        let h = Harness::new();
        let mut job = queued_job(&h.store, "vid-6");
        job.scenes.clear();

        let err = h.pipeline().run(&job, 1).await.unwrap_err();
        assert!(err.to_string().contains("no scenes"));
        assert_eq!(h.store.video("vid-6").unwrap().status, VideoStatus::Failed);
    }

    #[tokio::test]
    async fn test_unreachable_music_falls_back_to_narration() {
        let h = Harness::new();
        let job = queued_job(&h.store, "vid-7").with_music(Some("/nonexistent/track.mp3".into()));

        h.pipeline().run(&job, 1).await.unwrap();
        let requests = h.assembler.requests.lock().unwrap();
        assert!(requests[0].music_path.is_none());
    }

    #[test]
    fn test_provider_error_is_wrapped() {
        let err: WorkerError = ProviderError::invalid_response("no audio").into();
        assert!(err.user_message().contains("no audio"));
    }
}
