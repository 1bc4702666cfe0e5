//! Manual retry of a video from the dashboard.

use reel_firestore::{AutomationStore, VideoStore};
use reel_models::{GenerationJob, VideoId, VideoRecord, VideoStatus};
use reel_queue::{EnqueueOutcome, JobSink};
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Rebuild the job for a stored video. Automation settings are used when
/// the automation still exists; otherwise the job runs with defaults.
pub fn job_from_video(video: &VideoRecord, automation: Option<&reel_models::Automation>) -> GenerationJob {
    let job = match automation {
        Some(automation) => GenerationJob::for_automation(video.id.clone(), automation),
        None => GenerationJob::new(video.id.clone(), video.user_id.clone(), video.series_id.clone()),
    };
    let job = GenerationJob {
        user_id: video.user_id.clone(),
        series_id: video.series_id.clone(),
        automation_id: video.automation_id.clone(),
        ..job
    };
    let job = job.with_script(video.title.clone(), video.script.clone(), video.scenes.clone());
    if video.duration_seconds > 0 {
        job.with_duration(video.duration_seconds)
    } else {
        job
    }
}

/// Put a video back on the queue from `SCRIPT`.
///
/// Any old queue record is dropped first so a failed job does not block
/// the new one. Videos that are generating right now are refused.
pub async fn retry_video(
    videos: &dyn VideoStore,
    automations: &dyn AutomationStore,
    sink: &dyn JobSink,
    video_id: &VideoId,
) -> WorkerResult<EnqueueOutcome> {
    let video = videos
        .get_video(video_id)
        .await?
        .ok_or_else(|| WorkerError::VideoNotFound(video_id.to_string()))?;

    if video.status == VideoStatus::Generating {
        return Err(WorkerError::job_failed(format!("video {} is generating", video_id)));
    }
    if video.scenes.is_empty() {
        return Err(WorkerError::job_failed(format!("video {} has no script to retry", video_id)));
    }

    let automation = match video.automation_id.as_deref() {
        Some(id) => automations.get_automation(id).await?,
        None => None,
    };
    let job = job_from_video(&video, automation.as_ref());

    sink.remove(video_id.as_str()).await?;
    videos.set_status(video_id, VideoStatus::Queued).await?;
    let outcome = sink.enqueue(&job).await?;

    info!(video_id = %video_id, added = outcome.was_added(), "Manual retry enqueued");
    Ok(outcome)
}
