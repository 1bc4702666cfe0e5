//! Model parsing errors.

use thiserror::Error;

/// Result type for model parsing.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised when turning stored strings into typed model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid fire time '{0}': expected HH:MM")]
    InvalidFireTime(String),

    #[error("No fire times configured")]
    NoFireTimes,

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Unknown video status: {0}")]
    UnknownStatus(String),

    #[error("Unknown generation stage: {0}")]
    UnknownStage(String),

    #[error("Unknown frequency: {0}")]
    UnknownFrequency(String),

    #[error("Invalid automation: {0}")]
    InvalidAutomation(String),
}
