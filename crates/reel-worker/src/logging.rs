//! Structured job logging.

use tracing::{error, info, warn, Span};

use reel_models::{GenerationStage, VideoId};

/// Consistent lifecycle lines for one generation job.
#[derive(Debug, Clone)]
pub struct JobLogger {
    video_id: String,
    attempt: u32,
}

impl JobLogger {
    pub fn new(video_id: &VideoId, attempt: u32) -> Self {
        Self {
            video_id: video_id.to_string(),
            attempt,
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(video_id = %self.video_id, attempt = self.attempt, "Job started: {}", message);
    }

    pub fn log_stage(&self, stage: GenerationStage) {
        info!(
            video_id = %self.video_id,
            attempt = self.attempt,
            stage = stage.as_str(),
            "Entering stage {}", stage.as_str()
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(video_id = %self.video_id, attempt = self.attempt, "Job progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(video_id = %self.video_id, attempt = self.attempt, "Job warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(video_id = %self.video_id, attempt = self.attempt, "Job error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(video_id = %self.video_id, attempt = self.attempt, "Job completed: {}", message);
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Span covering the whole job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("generation", video_id = %self.video_id, attempt = self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let logger = JobLogger::new(&VideoId::from("vid-42"), 2);
        assert_eq!(logger.video_id(), "vid-42");
        assert_eq!(logger.attempt(), 2);
    }
}
