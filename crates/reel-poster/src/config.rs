//! Poster configuration.

use std::collections::HashMap;
use std::time::Duration;

use reel_models::Platform;

/// Poster configuration.
#[derive(Debug, Clone)]
pub struct PosterConfig {
    /// Upload attempts per platform
    pub max_attempts: u32,
    /// Fixed delay between upload attempts
    pub retry_delay: Duration,
    /// An `Uploading` claim older than this may be taken over
    pub stale_after: chrono::Duration,
    /// Minimum time between two successful posts of one user to a platform
    pub min_gaps: HashMap<Platform, chrono::Duration>,
    /// Posted as the first comment after a successful upload
    pub first_comment: Option<String>,
    pub comment_delay: Duration,
    /// Videos examined per sweep
    pub sweep_limit: u32,
    /// Re-reads when a platform entry write loses a race
    pub write_attempts: u32,
    /// Re-reads for recording a finished upload; losing it means a repost
    pub posted_write_attempts: u32,
    /// Base pause between re-reads, multiplied by the attempt number
    pub write_backoff: Duration,
}

impl Default for PosterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(30),
            stale_after: chrono::Duration::minutes(10),
            min_gaps: Platform::ALL
                .iter()
                .map(|p| (*p, chrono::Duration::minutes(default_gap_minutes(*p))))
                .collect(),
            first_comment: None,
            comment_delay: Duration::from_secs(10),
            sweep_limit: 50,
            write_attempts: 5,
            posted_write_attempts: 20,
            write_backoff: Duration::from_millis(100),
        }
    }
}

fn default_gap_minutes(platform: Platform) -> i64 {
    match platform {
        Platform::Youtube => 60,
        Platform::Tiktok => 120,
        Platform::Instagram => 60,
        Platform::Facebook => 30,
    }
}

impl PosterConfig {
    /// Create config from environment variables.
    ///
    /// Per-platform gaps come from `POSTER_MIN_GAP_<PLATFORM>_MINUTES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let min_gaps = Platform::ALL
            .iter()
            .map(|p| {
                let var = format!("POSTER_MIN_GAP_{}_MINUTES", p.as_str().to_ascii_uppercase());
                let minutes = std::env::var(var)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| default_gap_minutes(*p));
                (*p, chrono::Duration::minutes(minutes))
            })
            .collect();

        Self {
            max_attempts: std::env::var("POSTER_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            retry_delay: Duration::from_secs(
                std::env::var("POSTER_RETRY_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            stale_after: chrono::Duration::minutes(
                std::env::var("POSTER_STALE_UPLOAD_MINUTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            min_gaps,
            first_comment: std::env::var("POSTER_FIRST_COMMENT").ok().filter(|s| !s.trim().is_empty()),
            ..defaults
        }
    }

    /// Zero when no gap is configured.
    pub fn min_gap(&self, platform: Platform) -> chrono::Duration {
        self.min_gaps.get(&platform).copied().unwrap_or_else(chrono::Duration::zero)
    }
}
