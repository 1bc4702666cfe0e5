//! Scheduler error types.

use thiserror::Error;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid automation {id}: {message}")]
    InvalidAutomation { id: String, message: String },

    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Firestore error: {0}")]
    Firestore(#[from] reel_firestore::FirestoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("Script generation failed: {0}")]
    Provider(#[from] reel_providers::ProviderError),
}

impl SchedulerError {
    pub fn invalid_automation(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidAutomation {
            id: id.into(),
            message: message.into(),
        }
    }
}
