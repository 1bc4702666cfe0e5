//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Stage output mismatch: {0}")]
    StageMismatch(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] reel_storage::StorageError),

    #[error("Firestore error: {0}")]
    Firestore(#[from] reel_firestore::FirestoreError),

    #[error("Media error: {0}")]
    Media(#[from] reel_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("Provider error: {0}")]
    Provider(#[from] reel_providers::ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn stage_mismatch(msg: impl Into<String>) -> Self {
        Self::StageMismatch(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Text stored on the video. Media errors carry only the relevant
    /// ffmpeg stderr lines.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::Media(e) => e.detail(),
            other => other.to_string(),
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Provider(e) => e.is_retryable(),
            WorkerError::Firestore(e) => e.is_retryable(),
            WorkerError::Storage(_) | WorkerError::Queue(_) | WorkerError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let transient = WorkerError::from(reel_providers::ProviderError::Api {
            status: 503,
            message: "busy".into(),
        });
        assert!(transient.is_retryable());

        let rejected = WorkerError::from(reel_providers::ProviderError::Api {
            status: 400,
            message: "bad prompt".into(),
        });
        assert!(!rejected.is_retryable());
        assert!(!WorkerError::stage_mismatch("2 images for 3 scenes").is_retryable());
    }

    #[test]
    fn test_user_message() {
        let err = WorkerError::stage_mismatch("2 timings for 3 scenes");
        assert_eq!(err.user_message(), "Stage output mismatch: 2 timings for 3 scenes");
    }
}
