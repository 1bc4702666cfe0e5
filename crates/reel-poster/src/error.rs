//! Poster error types and failure classification.

use thiserror::Error;

use reel_models::utils::MAX_ERROR_MESSAGE_LEN;
use reel_models::{truncate_message, Platform};

pub type PosterResult<T> = Result<T, PosterError>;

#[derive(Debug, Error)]
pub enum PosterError {
    #[error("{platform} returned {status}: {message}")]
    Platform {
        platform: Platform,
        status: u16,
        message: String,
    },

    #[error("No connected {0} account")]
    MissingCredentials(Platform),

    #[error("{0} access token expired")]
    TokenExpired(Platform),

    #[error("Cooldown active: wait {minutes} minutes")]
    Cooldown { minutes: i64 },

    #[error("Video has no published media: {0}")]
    MissingMedia(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Invalid publisher response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lost too many write races on {0}")]
    WriteConflict(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Firestore error: {0}")]
    Firestore(#[from] reel_firestore::FirestoreError),
}

impl PosterError {
    pub fn platform(platform: Platform, status: u16, message: impl Into<String>) -> Self {
        Self::Platform {
            platform,
            status,
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}

/// Why a publish attempt failed, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Token expired or revoked, or no account connected
    Reconnect,
    RateLimited,
    /// The platform refused the content itself
    Rejected,
    Cooldown,
    Transient,
}

const RECONNECT_HINTS: &[&str] = &[
    "invalid_grant",
    "token expired",
    "expired token",
    "invalid token",
    "invalid_token",
    "unauthorized",
    "revoked",
    "reauth",
];
const RATE_LIMIT_HINTS: &[&str] = &["rate limit", "rate_limit", "quota", "too many"];
const REJECTED_HINTS: &[&str] = &[
    "policy",
    "violat",
    "unsupported",
    "invalid format",
    "duration",
    "copyright",
    "spam",
    "rejected",
];

impl FailureKind {
    pub fn classify(error: &PosterError) -> Self {
        match error {
            PosterError::MissingCredentials(_) | PosterError::TokenExpired(_) => FailureKind::Reconnect,
            PosterError::Cooldown { .. } => FailureKind::Cooldown,
            PosterError::MissingMedia(_) => FailureKind::Rejected,
            PosterError::Platform { status, message, .. } => Self::classify_response(*status, message),
            _ => FailureKind::Transient,
        }
    }

    fn classify_response(status: u16, message: &str) -> Self {
        let lower = message.to_lowercase();
        let hit = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));

        if status == 401 || hit(RECONNECT_HINTS) {
            FailureKind::Reconnect
        } else if status == 429 || hit(RATE_LIMIT_HINTS) {
            FailureKind::RateLimited
        } else if matches!(status, 400 | 403 | 413 | 415 | 422) || hit(REJECTED_HINTS) {
            FailureKind::Rejected
        } else {
            FailureKind::Transient
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Reconnect => "reconnect",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Rejected => "rejected",
            FailureKind::Cooldown => "cooldown",
            FailureKind::Transient => "transient",
        }
    }

    /// Another attempt in this run could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient | FailureKind::RateLimited)
    }

    /// Message stored on the platform entry.
    pub fn render(&self, error: &PosterError) -> String {
        let message = match self {
            FailureKind::Cooldown => error.to_string(),
            FailureKind::Reconnect => format!("Reconnect your account: {}", error),
            FailureKind::RateLimited => format!("Rate limited, try again later: {}", error),
            FailureKind::Rejected => format!("Rejected by platform: {}", error),
            FailureKind::Transient => format!("Upload failed: {}", error),
        };
        truncate_message(&message, MAX_ERROR_MESSAGE_LEN)
    }
}
